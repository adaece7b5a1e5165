//! JavaScript evaluated in the page by the Chrome host

/// Indented box tree of the rendered document, one line per element or text run.
pub const LAYOUT_DUMP_SCRIPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scripts/layout_dump.js"
));

/// `[width, height]` of the laid-out document.
pub const CONTENT_SIZE_SCRIPT: &str = r#"(() => {
  const root = document.documentElement;
  const body = document.body;
  const width = Math.max(root ? root.scrollWidth : 0, body ? body.scrollWidth : 0);
  const height = Math.max(root ? root.scrollHeight : 0, body ? body.scrollHeight : 0);
  return [width, height];
})()"#;

pub const INNER_TEXT_SCRIPT: &str = r#"(() => {
  if (document.body) return document.body.innerText;
  return document.documentElement ? document.documentElement.innerText : "";
})()"#;

/// Script that appends `css` as a `<style>` element once the document exists.
pub fn user_style_script(css: &str) -> String {
    // JSON string literals are valid JavaScript string literals.
    let literal = serde_json::Value::String(css.to_string()).to_string();
    format!(
        r#"(() => {{
  const install = () => {{
    const style = document.createElement("style");
    style.setAttribute("data-page-capture", "user-style");
    style.textContent = {literal};
    (document.head || document.documentElement).appendChild(style);
  }};
  if (document.documentElement) install();
  else document.addEventListener("DOMContentLoaded", install, {{ once: true }});
}})()"#
    )
}

/// Zoom the whole page with CSS `zoom`, or only its text.
///
/// Text-only zoom scales each element's computed font size once the document
/// has been parsed.
pub fn zoom_script(factor: f64, text_only: bool) -> String {
    if text_only {
        format!(
            r#"(() => {{
  const scale = () => {{
    const elements = Array.from(document.querySelectorAll("body, body *"));
    const sizes = elements.map((el) => parseFloat(getComputedStyle(el).fontSize));
    elements.forEach((el, i) => {{
      if (sizes[i] > 0) el.style.fontSize = (sizes[i] * {factor}) + "px";
    }});
  }};
  if (document.readyState === "loading") document.addEventListener("DOMContentLoaded", scale, {{ once: true }});
  else scale();
}})()"#
        )
    } else {
        user_style_script(&format!("html {{ zoom: {factor}; }}"))
    }
}

/// Defines `window[name]` as a state object that survives reloads of the
/// same origin, backed by `sessionStorage`.
pub fn script_object_script(name: &str) -> String {
    let property = serde_json::Value::String(name.to_string()).to_string();
    let key = serde_json::Value::String(format!("page-capture:{name}")).to_string();
    format!(
        r#"(() => {{
  let state = {{}};
  try {{
    state = JSON.parse(sessionStorage.getItem({key}) || "{{}}") || {{}};
  }} catch (e) {{}}
  Object.defineProperty(window, {property}, {{ value: state, writable: false, configurable: false }});
  window.addEventListener("pagehide", () => {{
    try {{
      sessionStorage.setItem({key}, JSON.stringify(state));
    }} catch (e) {{}}
  }});
}})()"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_style_is_escaped() {
        let script = user_style_script("p::before { content: \"</style>\\n\"; }");
        assert!(script.contains(r#"style.textContent = "p::before { content: \"</style>\\n\"; }";"#));
    }

    #[test]
    fn full_zoom_uses_css_zoom() {
        let script = zoom_script(1.5, false);
        assert!(script.contains("html { zoom: 1.5; }"));
        assert!(!script.contains("fontSize"));
    }

    #[test]
    fn text_zoom_scales_font_sizes() {
        let script = zoom_script(2.0, true);
        assert!(script.contains("* 2)"));
        assert!(script.contains("fontSize"));
        assert!(!script.contains("zoom:"));
    }

    #[test]
    fn script_object_is_quoted() {
        let script = script_object_script("captureState");
        assert!(script.contains(r#"Object.defineProperty(window, "captureState""#));
        assert!(script.contains(r#"sessionStorage.getItem("page-capture:captureState")"#));
    }

    #[test]
    fn layout_dump_is_an_expression() {
        assert!(LAYOUT_DUMP_SCRIPT.trim_start().starts_with("(() =>"));
        assert!(LAYOUT_DUMP_SCRIPT.contains("layer at (0,0)"));
    }
}
