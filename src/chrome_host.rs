//! Headless Chrome page host
//!
//! Drives a single Chrome page over the DevTools protocol. Lifecycle events and
//! JavaScript dialogs are forwarded into the session's [`EventSink`] by
//! listener tasks spawned at launch; rendering primitives map onto
//! `Page.captureScreenshot`, `Page.printToPDF` and `Runtime.evaluate`.

use crate::config::{create_browser_config, BrowserProfile};
use crate::encode::paginate_postscript;
use crate::page_host::EventSink;
use crate::scripts::{
    script_object_script, user_style_script, zoom_script, CONTENT_SIZE_SCRIPT,
    INNER_TEXT_SCRIPT, LAYOUT_DUMP_SCRIPT,
};
use crate::{
    CaptureConfig, CaptureError, PageEvent, PageHost, PageRequest, PrintFormat, PrintSurface,
    RenderSurface, Viewport,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetScriptExecutionDisabledParams,
};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, ResourceType, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, DialogType,
    EventJavascriptDialogOpening, EventLifecycleEvent, HandleJavaScriptDialogParams,
    NavigateParams, PrintToPdfParams, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle names that mean the first layout has produced content.
const INITIAL_LAYOUT_EVENTS: [&str; 3] = ["DOMContentLoaded", "firstPaint", "firstContentfulPaint"];

/// Translates `Page.lifecycleEvent` names into [`PageEvent`]s.
///
/// Events arriving before the first `init` belong to `about:blank` and are
/// dropped. Each navigation reports at most one initial layout.
#[derive(Debug, Default)]
pub struct LifecycleMapper {
    navigating: bool,
    saw_layout: bool,
}

impl LifecycleMapper {
    pub fn on_event(&mut self, main_frame: bool, name: &str) -> Option<PageEvent> {
        if !main_frame {
            return None;
        }
        if name == "init" {
            self.navigating = true;
            self.saw_layout = false;
            return None;
        }
        if !self.navigating {
            return None;
        }
        if INITIAL_LAYOUT_EVENTS.contains(&name) {
            if self.saw_layout {
                return None;
            }
            self.saw_layout = true;
            return Some(PageEvent::InitialLayoutCompleted);
        }
        (name == "load").then_some(PageEvent::LoadFinished { ok: true })
    }
}

/// Events reported when navigation fails before any lifecycle event could.
pub fn navigation_failed_events() -> [PageEvent; 2] {
    [
        PageEvent::InitialLayoutCompleted,
        PageEvent::LoadFinished { ok: false },
    ]
}

pub struct ChromePageHost {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    profile: Option<BrowserProfile>,
    sink: EventSink,
    listeners: Vec<JoinHandle<()>>,
    print_alerts: bool,
}

impl ChromePageHost {
    /// Launch Chrome, open a blank page and configure it for `config`.
    pub async fn launch(config: &CaptureConfig, sink: EventSink) -> Result<Self, CaptureError> {
        let profile = BrowserProfile::create()?;
        let browser_config = create_browser_config(config, &profile)?;
        let (browser, mut handler) = match Browser::launch(browser_config).await {
            Ok(launched) => launched,
            Err(e) => {
                profile.remove();
                return Err(CaptureError::BrowserLaunchFailed(e.to_string()));
            }
        };

        // The handler stream carries all DevTools traffic and must be polled
        // for the lifetime of the browser.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Handler error: {}", e);
                }
            }
            debug!("Handler stream ended");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let mut browser = browser;
                if let Err(e) = browser.close().await {
                    debug!("Failed to close browser: {}", e);
                }
                let _ = browser.wait().await;
                handler.abort();
                profile.remove();
                return Err(CaptureError::PageError(e.to_string()));
            }
        };

        let mut host = Self {
            browser,
            handler,
            page,
            profile: Some(profile),
            sink,
            listeners: Vec::new(),
            print_alerts: config.settings.print_alerts,
        };
        if let Err(e) = host.prepare(config).await {
            host.shutdown().await;
            return Err(e);
        }
        Ok(host)
    }

    async fn prepare(&mut self, config: &CaptureConfig) -> Result<(), CaptureError> {
        self.page
            .execute(SetLifecycleEventsEnabledParams::new(true))
            .await?;

        if !config.settings.engine.javascript {
            self.page
                .execute(SetScriptExecutionDisabledParams::new(true))
                .await?;
        }
        if config.settings.needs_user_agent_override() {
            let default = self.browser.version().await?.user_agent;
            if let Some(user_agent) = config.settings.effective_user_agent(&default) {
                debug!("User-Agent: {}", user_agent);
                self.page
                    .execute(SetUserAgentOverrideParams::new(user_agent))
                    .await?;
            }
        }
        if let Some(zoom) = config.settings.zoom_factor {
            self.add_document_script(zoom_script(zoom, config.settings.engine.zoom_text_only))
                .await?;
        }
        if let Some(css) = &config.user_style {
            self.add_document_script(user_style_script(css)).await?;
        }
        // The state object must exist before the injected script runs.
        if let Some(name) = &config.script_object {
            self.add_document_script(script_object_script(name)).await?;
        }
        if let Some(script) = &config.injected_script {
            self.add_document_script(script.clone()).await?;
        }

        self.spawn_lifecycle_listener().await?;
        self.spawn_dialog_listener().await?;
        self.spawn_console_listener().await?;
        Ok(())
    }

    async fn add_document_script(&self, source: String) -> Result<(), CaptureError> {
        self.page
            .evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await?;
        Ok(())
    }

    async fn spawn_lifecycle_listener(&mut self) -> Result<(), CaptureError> {
        let mut events = self.page.event_listener::<EventLifecycleEvent>().await?;
        let main_frame = self.page.mainframe().await?;
        let sink = self.sink.clone();

        self.listeners.push(tokio::spawn(async move {
            let mut mapper = LifecycleMapper::default();
            while let Some(event) = events.next().await {
                let is_main = main_frame.as_ref().map_or(true, |frame| *frame == event.frame_id);
                if let Some(page_event) = mapper.on_event(is_main, &event.name) {
                    if !sink.send(page_event) {
                        break;
                    }
                }
            }
        }));
        Ok(())
    }

    async fn spawn_dialog_listener(&mut self) -> Result<(), CaptureError> {
        let mut dialogs = self
            .page
            .event_listener::<EventJavascriptDialogOpening>()
            .await?;
        let page = self.page.clone();
        let sink = self.sink.clone();

        self.listeners.push(tokio::spawn(async move {
            while let Some(dialog) = dialogs.next().await {
                let prompt_text = match dialog.r#type {
                    DialogType::Alert => {
                        if !sink.script_alert(dialog.message.clone()) {
                            debug!("[alert] {} (after capture)", dialog.message);
                        }
                        None
                    }
                    DialogType::Prompt => {
                        debug!("[prompt] {}", dialog.message);
                        Some(dialog.default_prompt.clone().unwrap_or_default())
                    }
                    DialogType::Confirm => {
                        debug!("[confirm] {}", dialog.message);
                        None
                    }
                    DialogType::Beforeunload => None,
                };
                let params = HandleJavaScriptDialogParams {
                    accept: true,
                    prompt_text,
                };
                if let Err(e) = page.execute(params).await {
                    warn!("Failed to dismiss dialog: {}", e);
                }
            }
        }));
        Ok(())
    }

    async fn spawn_console_listener(&mut self) -> Result<(), CaptureError> {
        let mut messages = self.page.event_listener::<EventConsoleApiCalled>().await?;
        let print = self.print_alerts;
        let sink = self.sink.clone();

        self.listeners.push(tokio::spawn(async move {
            while let Some(message) = messages.next().await {
                if sink.is_closed() {
                    break;
                }
                let text = message
                    .args
                    .iter()
                    .map(|arg| match (&arg.value, &arg.description) {
                        (Some(serde_json::Value::String(s)), _) => s.clone(),
                        (Some(value), _) => value.to_string(),
                        (None, Some(description)) => description.clone(),
                        (None, None) => String::new(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                if print {
                    info!("[console] {}", text);
                } else {
                    debug!("[console] {}", text);
                }
            }
        }));
        Ok(())
    }

    /// Rewrite the method and body of the top-level document request.
    async fn intercept_document(&mut self, request: &PageRequest) -> Result<(), CaptureError> {
        let mut paused = self.page.event_listener::<EventRequestPaused>().await?;
        let pattern = RequestPattern {
            url_pattern: Some(request.url.to_string()),
            resource_type: Some(ResourceType::Document),
            request_stage: Some(RequestStage::Request),
        };
        self.page
            .execute(FetchEnableParams {
                patterns: Some(vec![pattern]),
                handle_auth_requests: None,
            })
            .await?;

        let page = self.page.clone();
        let target = request.url.to_string();
        let method = request.method.as_str();
        let body = request.body.as_ref().map(|body| BASE64.encode(body));

        self.listeners.push(tokio::spawn(async move {
            let mut rewritten = false;
            while let Some(event) = paused.next().await {
                let mut builder = ContinueRequestParams::builder().request_id(event.request_id.clone());
                if !rewritten && event.request.url == target {
                    rewritten = true;
                    builder = builder.method(method);
                    if let Some(body) = &body {
                        builder = builder.post_data(body.clone());
                    }
                }
                match builder.build() {
                    Ok(params) => {
                        if let Err(e) = page.execute(params).await {
                            warn!("Failed to continue intercepted request: {}", e);
                        }
                    }
                    Err(e) => error!("Invalid continue request: {}", e),
                }
            }
        }));
        Ok(())
    }

    async fn evaluate_string(&self, script: &str) -> Result<String, CaptureError> {
        let result = self.page.evaluate(script).await?;
        Ok(result.into_value::<String>()?)
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, CaptureError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| CaptureError::PageError(e.to_string()))
    }
}

#[async_trait]
impl PageHost for ChromePageHost {
    async fn load(&mut self, request: &PageRequest) -> Result<(), CaptureError> {
        if !request.headers.is_empty() {
            let headers: serde_json::Map<String, serde_json::Value> = request
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
                .collect();
            self.page
                .execute(SetExtraHttpHeadersParams::new(Headers::new(
                    serde_json::Value::Object(headers),
                )))
                .await?;
        }
        if !request.is_plain_get() {
            self.intercept_document(request).await?;
        }

        // Navigation is reported through lifecycle events; the command itself
        // only settles once the response has committed or failed.
        let page = self.page.clone();
        let sink = self.sink.clone();
        let url = request.url.to_string();
        self.listeners.push(tokio::spawn(async move {
            let failure = match page.execute(NavigateParams::new(url.clone())).await {
                Ok(response) => response.result.error_text.clone(),
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = failure {
                warn!("Navigation to {} failed: {}", url, reason);
                for event in navigation_failed_events() {
                    sink.send(event);
                }
            }
        }));
        Ok(())
    }

    async fn set_viewport_size(&mut self, size: Viewport) -> Result<(), CaptureError> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(size.width)
            .height(size.height)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(CaptureError::PageError)?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn content_size(&mut self) -> Result<Viewport, CaptureError> {
        let result = self.page.evaluate(CONTENT_SIZE_SCRIPT).await?;
        let [width, height] = result.into_value::<[f64; 2]>()?;
        Ok(Viewport::new(width.max(0.0).ceil() as u32, height.max(0.0).ceil() as u32))
    }

    async fn render_into(&mut self, surface: &mut RenderSurface) -> Result<(), CaptureError> {
        let png = self.screenshot_png().await?;
        match surface {
            RenderSurface::Raster(image) => {
                let shot = image::load_from_memory(&png)?.to_rgba8();
                image::imageops::replace(image, &shot, 0, 0);
            }
            RenderSurface::Vector(canvas) => canvas.draw_png(&png),
        }
        Ok(())
    }

    async fn paginate_into(&mut self, surface: &mut PrintSurface) -> Result<(), CaptureError> {
        match surface.format {
            PrintFormat::Pdf => {
                let (width, height) = surface.page_size.inches();
                let params = PrintToPdfParams {
                    paper_width: Some(width),
                    paper_height: Some(height),
                    print_background: Some(surface.print_backgrounds),
                    ..Default::default()
                };
                let pdf = self.page.pdf(params).await?;
                surface.set_document(pdf);
            }
            PrintFormat::PostScript => {
                let png = self.screenshot_png().await?;
                let image = image::load_from_memory(&png)?.to_rgba8();
                surface.set_document(paginate_postscript(&image, surface.page_size));
            }
        }
        Ok(())
    }

    async fn extract_text(&mut self) -> Result<String, CaptureError> {
        self.evaluate_string(INNER_TEXT_SCRIPT).await
    }

    async fn extract_html(&mut self) -> Result<String, CaptureError> {
        Ok(self.page.content().await?)
    }

    async fn extract_layout_dump(&mut self) -> Result<String, CaptureError> {
        self.evaluate_string(LAYOUT_DUMP_SCRIPT).await
    }

    async fn shutdown(&mut self) {
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        self.handler.abort();
        if let Some(profile) = self.profile.take() {
            profile.remove();
        }
    }
}
