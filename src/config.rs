//! Configuration management with serde serialization/deserialization
//!
//! `Config` holds the settings that can live in a JSON file; `CaptureConfig`
//! is the validated, per-run configuration built from it plus the target
//! request and output path.

use crate::{CaptureError, OutputFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, warn};
use url::Url;

/// File-level configuration for the capture tool
///
/// # Examples
///
/// ```rust
/// use page_capture::Config;
/// use std::time::Duration;
///
/// let config = Config {
///     delay: Duration::from_millis(250),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Viewport used while loading; a lower bound, not the output size
    pub min_viewport: Viewport,

    /// Extra wait after the page is ready (default: none)
    pub delay: Duration,

    /// Hard deadline for the whole capture; zero disables it (default: 90 seconds)
    pub max_wait: Duration,

    /// Page size for PDF and PostScript output (default: A4)
    pub page_size: PageSize,

    /// Engine feature switches
    pub engine: EngineSettings,

    /// Custom User-Agent string for requests (default: Chrome default)
    pub user_agent: Option<String>,

    /// Application name appended to the default User-Agent
    pub app_name: Option<String>,

    /// Application version appended after `app_name`
    pub app_version: Option<String>,

    /// Page zoom factor; `None` leaves the page unzoomed
    pub zoom_factor: Option<f64>,

    /// Proxy for all requests, e.g. `http://proxy:3128`
    pub http_proxy: Option<String>,

    /// Ignore TLS certificate errors
    pub insecure: bool,

    /// Antialiased text and image rendering
    pub smooth: bool,

    /// JPEG quality, 1-100 (default: 90)
    pub jpeg_quality: u8,

    /// Log every script alert at INFO level
    pub print_alerts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chrome_path: None,
            min_viewport: Viewport::default(),
            delay: Duration::ZERO,
            max_wait: Duration::from_millis(90_000),
            page_size: PageSize::default(),
            engine: EngineSettings::default(),
            user_agent: None,
            app_name: None,
            app_version: None,
            zoom_factor: None,
            http_proxy: None,
            insecure: false,
            smooth: false,
            jpeg_quality: 90,
            print_alerts: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.min_viewport.is_empty() {
            return Err(CaptureError::ConfigurationError(
                "Minimum viewport dimensions must be greater than 0".to_string(),
            ));
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(CaptureError::ConfigurationError(format!(
                "JPEG quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }

        if let Some(zoom) = self.zoom_factor {
            if !zoom.is_finite() || zoom <= 0.0 {
                return Err(CaptureError::ConfigurationError(format!(
                    "Zoom factor must be a positive number, got {zoom}"
                )));
            }
        }

        if let Some(proxy) = &self.http_proxy {
            Url::parse(proxy).map_err(|e| {
                CaptureError::ConfigurationError(format!("Invalid proxy {proxy}: {e}"))
            })?;
        }

        Ok(())
    }

    /// The User-Agent override to apply, if any.
    ///
    /// An explicit `user_agent` wins; otherwise `app_name`/`app_version` are
    /// appended to the engine's `default` agent.
    pub fn effective_user_agent(&self, default: &str) -> Option<String> {
        if let Some(user_agent) = &self.user_agent {
            return Some(user_agent.clone());
        }
        let product = match (&self.app_name, &self.app_version) {
            (None, None) => return None,
            (Some(name), Some(version)) => format!("{name}/{version}"),
            (Some(name), None) => name.clone(),
            (None, Some(version)) => version.clone(),
        };
        Some(format!("{} {product}", default.trim_end()))
    }

    /// Whether composing the User-Agent needs the engine's default string.
    pub fn needs_user_agent_override(&self) -> bool {
        self.user_agent.is_some() || self.app_name.is_some() || self.app_version.is_some()
    }
}

/// Width and height of a render viewport, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

/// Paper size for paginated output, in PostScript points
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    A4,
    Letter,
    Legal,
}

impl PageSize {
    /// (width, height) in points, portrait.
    pub fn points(self) -> (f64, f64) {
        match self {
            PageSize::A4 => (595.0, 842.0),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
        }
    }

    /// (width, height) in inches, as the DevTools print API expects.
    pub fn inches(self) -> (f64, f64) {
        let (w, h) = self.points();
        (w / 72.0, h / 72.0)
    }
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize::A4
    }
}

impl std::str::FromStr for PageSize {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a4" => Ok(PageSize::A4),
            "letter" => Ok(PageSize::Letter),
            "legal" => Ok(PageSize::Legal),
            other => Err(CaptureError::ConfigurationError(format!(
                "Unknown page size: {other}"
            ))),
        }
    }
}

/// Engine feature switches
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Enable JavaScript execution (default: true)
    pub javascript: bool,

    /// Enable browser plugins (default: false)
    pub plugins: bool,

    /// Run without persistent profile state (default: false)
    pub private_browsing: bool,

    /// Load images automatically (default: true)
    pub auto_load_images: bool,

    /// Allow `window.open` without a user gesture (default: false)
    pub js_can_open_windows: bool,

    /// Print CSS backgrounds into PDF output (default: false)
    pub print_backgrounds: bool,

    /// Apply the zoom factor to text only (default: false)
    pub zoom_text_only: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            javascript: true,
            plugins: false,
            private_browsing: false,
            auto_load_images: true,
            js_can_open_windows: false,
            print_backgrounds: false,
            zoom_text_only: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(HttpMethod::Get),
            "head" => Ok(HttpMethod::Head),
            "post" => Ok(HttpMethod::Post),
            "put" => Ok(HttpMethod::Put),
            "delete" => Ok(HttpMethod::Delete),
            other => Err(CaptureError::ConfigurationError(format!(
                "Unsupported HTTP method: {other}"
            ))),
        }
    }
}

/// The navigation request for the captured page
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub url: Url,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl PageRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: HttpMethod::Get,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Whether the engine's plain navigation can express this request.
    pub fn is_plain_get(&self) -> bool {
        self.method == HttpMethod::Get && self.body.is_none()
    }
}

/// Parse a `name:value` header argument.
pub fn parse_header(raw: &str) -> Result<(String, String), CaptureError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| CaptureError::InvalidHeader(raw.to_string()))?;
    let name = name.trim();
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CaptureError::InvalidHeader(raw.to_string()));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// A user style sheet applied to every document
#[derive(Debug, Clone, PartialEq)]
pub enum UserStyle {
    Path(PathBuf),
    Inline(String),
}

impl UserStyle {
    pub fn load(&self) -> Result<String, CaptureError> {
        match self {
            UserStyle::Inline(css) => Ok(css.clone()),
            UserStyle::Path(path) => read_config_file(path, "user style sheet"),
        }
    }
}

fn read_config_file(path: &Path, what: &str) -> Result<String, CaptureError> {
    std::fs::read_to_string(path).map_err(|e| {
        CaptureError::ConfigurationError(format!("Cannot read {what} {}: {e}", path.display()))
    })
}

/// Validated configuration for one capture run
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub request: PageRequest,
    pub output: PathBuf,
    pub format: OutputFormat,
    /// Enables script-signal mode: capture waits for this exact alert text
    pub expected_alert: Option<String>,
    /// CSS injected into every document
    pub user_style: Option<String>,
    /// Script evaluated in every new document before page scripts
    pub injected_script: Option<String>,
    /// Window property holding state for the injected script
    pub script_object: Option<String>,
    pub settings: Config,
}

impl CaptureConfig {
    /// Validate and assemble the run configuration.
    ///
    /// `format` is an explicit identifier; when absent the format is inferred
    /// from the suffix of `output`.
    pub fn new(
        request: PageRequest,
        output: PathBuf,
        format: Option<&str>,
        settings: Config,
    ) -> Result<Self, CaptureError> {
        if output.as_os_str().is_empty() {
            return Err(CaptureError::ConfigurationError(
                "Output path is required".to_string(),
            ));
        }
        settings.validate()?;
        let format = OutputFormat::resolve(format, &output)?;

        Ok(Self {
            request,
            output,
            format,
            expected_alert: None,
            user_style: None,
            injected_script: None,
            script_object: None,
            settings,
        })
    }

    /// An empty alert text does not gate the ready path.
    pub fn with_expected_alert(mut self, alert: Option<String>) -> Self {
        self.expected_alert = alert.filter(|text| !text.is_empty());
        self
    }

    pub fn with_script_object(mut self, name: Option<&str>) -> Result<Self, CaptureError> {
        if let Some(name) = name {
            if !is_js_identifier(name) {
                return Err(CaptureError::ConfigurationError(format!(
                    "Script object name must be a JavaScript identifier, got {name:?}"
                )));
            }
        }
        self.script_object = name.map(str::to_string);
        Ok(self)
    }

    pub fn with_user_style(mut self, style: Option<&UserStyle>) -> Result<Self, CaptureError> {
        self.user_style = style.map(UserStyle::load).transpose()?;
        Ok(self)
    }

    pub fn with_injected_script(mut self, path: Option<&Path>) -> Result<Self, CaptureError> {
        self.injected_script = path
            .map(|p| read_config_file(p, "inject script"))
            .transpose()?;
        Ok(self)
    }
}

fn is_js_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {
            chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

/// `host:port[/path]` without a scheme, which `Url::parse` reads as scheme `host`.
fn is_bare_host_port(raw: &str) -> bool {
    let Some((_, rest)) = raw.split_once(':') else {
        return false;
    };
    let port = rest.split(['/', '?', '#']).next().unwrap_or_default();
    !port.is_empty() && port.chars().all(|c| c.is_ascii_digit())
}

/// Parse the target URL; bare host names get an `http://` scheme.
pub fn parse_target_url(raw: &str) -> Result<Url, CaptureError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CaptureError::ConfigurationError("URL is required".to_string()));
    }
    if is_bare_host_port(raw) {
        return Ok(Url::parse(&format!("http://{raw}"))?);
    }
    match Url::parse(raw) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Ok(Url::parse(&format!("http://{raw}"))?)
        }
        Err(e) => Err(CaptureError::InvalidUrl(format!("{raw}: {e}"))),
    }
}

/// Per-run Chrome profile directory, removed when the run ends
pub struct BrowserProfile {
    dir: TempDir,
}

impl BrowserProfile {
    pub fn create() -> Result<Self, CaptureError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("page-capture-{}-", std::process::id()))
            .tempdir()
            .map_err(|e| {
                CaptureError::BrowserLaunchFailed(format!("Cannot create profile directory: {e}"))
            })?;
        debug!("Chrome profile at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the profile. Call only after the browser process has exited.
    pub fn remove(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove Chrome profile {}: {}", path.display(), e);
        }
    }
}

/// Generate Chrome command-line arguments for a capture run
///
/// ```rust
/// use page_capture::{get_chrome_args, CaptureConfig, Config, PageRequest};
///
/// let url = url::Url::parse("https://example.com").unwrap();
/// let config = CaptureConfig::new(
///     PageRequest::get(url),
///     "shot.png".into(),
///     None,
///     Config::default(),
/// )
/// .unwrap();
/// let args = get_chrome_args(&config);
/// assert!(args.contains(&"--headless".to_string()));
/// ```
pub fn get_chrome_args(config: &CaptureConfig) -> Vec<String> {
    let settings = &config.settings;

    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--hide-scrollbars".to_string(),
        format!(
            "--window-size={},{}",
            settings.min_viewport.width, settings.min_viewport.height
        ),
    ];

    if settings.engine.private_browsing {
        args.push("--incognito".to_string());
    }

    if settings.insecure {
        args.push("--ignore-certificate-errors".to_string());
        args.push("--allow-running-insecure-content".to_string());
    }

    if !settings.smooth {
        args.push("--disable-lcd-text".to_string());
        args.push("--disable-font-subpixel-positioning".to_string());
    }

    if !settings.engine.auto_load_images {
        args.push("--blink-settings=imagesEnabled=false".to_string());
    }

    if !settings.engine.plugins {
        args.push("--disable-plugins".to_string());
    }

    if settings.engine.js_can_open_windows {
        args.push("--disable-popup-blocking".to_string());
    }

    if let Some(proxy) = &settings.http_proxy {
        args.push(format!("--proxy-server={proxy}"));
    }

    args
}

pub fn create_browser_config(
    config: &CaptureConfig,
    profile: &BrowserProfile,
) -> Result<chromiumoxide::browser::BrowserConfig, CaptureError> {
    use chromiumoxide::browser::BrowserConfig;

    let viewport = config.settings.min_viewport;
    let mut builder = BrowserConfig::builder()
        .window_size(viewport.width, viewport.height)
        .user_data_dir(profile.path())
        .args(get_chrome_args(config));

    if let Some(chrome_path) = &config.settings.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(CaptureError::BrowserLaunchFailed)
}
