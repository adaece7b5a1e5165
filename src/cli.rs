use crate::utils::{describe_header, format_bytes, format_duration};
use crate::{
    page_events, parse_header, parse_target_url, CaptureConfig, CaptureError, CaptureOutcome,
    CaptureSession, ChromePageHost, Config, HttpMethod, PageRequest, PageSize, UserStyle,
    Viewport, FORMAT_TABLE,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "page-capture")]
#[command(about = "Capture a web page as an image, document or text snapshot")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Chrome executable path")]
    pub chrome_path: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a page and write one snapshot of it
    Capture(CaptureArgs),

    /// List the supported output formats
    Formats,

    /// Validate configuration
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct CaptureArgs {
    #[arg(long, help = "The URL to capture (http:// is assumed for bare hosts)")]
    pub url: String,

    #[arg(long, help = "The target file (.png|.pdf|.svg|.txt|...)")]
    pub out: PathBuf,

    #[arg(long, help = "Output format identifier; inferred from --out when omitted")]
    pub out_format: Option<String>,

    #[arg(long, help = "Minimal viewport width")]
    pub min_width: Option<u32>,

    #[arg(long, help = "Minimal viewport height")]
    pub min_height: Option<u32>,

    #[arg(long, help = "Don't wait more than this many ms (0 = no limit)")]
    pub max_wait: Option<u64>,

    #[arg(long, help = "After the page is ready, wait this many ms")]
    pub delay: Option<u64>,

    #[arg(long = "header", value_name = "NAME:VALUE", help = "Request header; repeatable")]
    pub headers: Vec<String>,

    #[arg(long, help = "Request method (get, head, post, put, delete)")]
    pub method: Option<HttpMethod>,

    #[arg(long, conflicts_with = "body_base64", help = "Unencoded request body")]
    pub body_string: Option<String>,

    #[arg(long, help = "Base64-encoded request body")]
    pub body_base64: Option<String>,

    #[arg(long, help = "Override the User-Agent header")]
    pub user_agent: Option<String>,

    #[arg(long, help = "Application name appended to the default User-Agent")]
    pub app_name: Option<String>,

    #[arg(long, help = "Application version appended to the default User-Agent")]
    pub app_version: Option<String>,

    #[arg(long, help = "Page zoom factor (default: no zooming)")]
    pub zoom_factor: Option<f64>,

    #[arg(long, value_name = "on|off", value_parser = parse_switch, help = "Zoom only the text")]
    pub zoom_text_only: Option<bool>,

    #[arg(long, value_name = "on|off", value_parser = parse_switch, help = "JavaScript execution")]
    pub javascript: Option<bool>,

    #[arg(long, value_name = "on|off", value_parser = parse_switch, help = "Browser plugins")]
    pub plugins: Option<bool>,

    #[arg(long, value_name = "on|off", value_parser = parse_switch, help = "Private browsing")]
    pub private_browsing: Option<bool>,

    #[arg(long, value_name = "on|off", value_parser = parse_switch, help = "Automatic image loading")]
    pub auto_load_images: Option<bool>,

    #[arg(long, value_name = "on|off", value_parser = parse_switch, help = "Script can open windows")]
    pub js_can_open_windows: Option<bool>,

    #[arg(long, value_name = "on|off", value_parser = parse_switch, help = "Print CSS backgrounds")]
    pub print_backgrounds: Option<bool>,

    #[arg(long, help = "Proxy for all requests, e.g. http://proxy:3128")]
    pub http_proxy: Option<String>,

    #[arg(long, help = "Ignore TLS certificate errors")]
    pub insecure: bool,

    #[arg(long, help = "Antialiased rendering")]
    pub smooth: bool,

    #[arg(long, help = "Capture as soon as the page calls alert() with this text")]
    pub expect_alert: Option<String>,

    #[arg(long, help = "Log every script alert")]
    pub print_alerts: bool,

    #[arg(long, help = "JavaScript file evaluated in every document before page scripts")]
    pub inject_script: Option<PathBuf>,

    #[arg(long, help = "Window property holding state for the injected script")]
    pub script_object: Option<String>,

    #[arg(long, conflicts_with = "user_style_string", help = "User style sheet file")]
    pub user_style_path: Option<PathBuf>,

    #[arg(long, help = "User style sheet as a string")]
    pub user_style_string: Option<String>,

    #[arg(long, help = "Paper size for pdf and ps output (a4, letter, legal)")]
    pub page_size: Option<PageSize>,

    #[arg(long, help = "JPEG quality, 1-100")]
    pub jpeg_quality: Option<u8>,
}

/// Parse `on`/`off` style switches.
fn parse_switch(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected on or off, got {other}")),
    }
}

pub struct CliRunner {
    pub config: Config,
}

impl CliRunner {
    pub fn new(mut config: Config, args: &Cli) -> Self {
        if let Some(chrome_path) = &args.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }
        Self { config }
    }

    /// Run `command`; a capture in progress is abandoned on `shutdown`.
    pub async fn run(
        &self,
        command: Commands,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), CaptureError> {
        match command {
            Commands::Capture(args) => self.run_capture(args, shutdown).await.map(|_| ()),
            Commands::Formats => {
                self.list_formats();
                Ok(())
            }
            Commands::Validate { config } => self.validate_config(config).await,
        }
    }

    pub async fn run_capture(
        &self,
        args: CaptureArgs,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<CaptureOutcome, CaptureError> {
        let config = self.build_capture_config(&args)?;
        let url = config.request.url.clone();
        info!("Capturing {} as {}", url, config.format);

        let (sink, events) = page_events();
        let host = ChromePageHost::launch(&config, sink).await?;
        let outcome = CaptureSession::new(config, host, events)
            .with_shutdown(shutdown)
            .run()
            .await?;

        println!("Page captured successfully:");
        println!("  URL: {url}");
        println!("  Output: {}", outcome.snapshot.path.display());
        println!("  Format: {}", outcome.snapshot.format);
        println!("  Size: {}", format_bytes(outcome.snapshot.bytes));
        println!(
            "  Viewport: {}x{}",
            outcome.snapshot.viewport.width, outcome.snapshot.viewport.height
        );
        println!("  Elapsed: {}", format_duration(outcome.elapsed));
        println!("  Captured at: {}", outcome.captured_at.to_rfc3339());
        println!("  Trigger: {}", outcome.trigger);
        if outcome.load_ok == Some(false) {
            println!("  Note: the page reported a failed load");
        }

        Ok(outcome)
    }

    /// Merge capture flags over the file configuration and validate the result.
    pub fn build_capture_config(&self, args: &CaptureArgs) -> Result<CaptureConfig, CaptureError> {
        let mut settings = self.config.clone();
        let base = settings.min_viewport;
        settings.min_viewport = Viewport::new(
            args.min_width.unwrap_or(base.width),
            args.min_height.unwrap_or(base.height),
        );
        if let Some(ms) = args.max_wait {
            settings.max_wait = Duration::from_millis(ms);
        }
        if let Some(ms) = args.delay {
            settings.delay = Duration::from_millis(ms);
        }
        if let Some(page_size) = args.page_size {
            settings.page_size = page_size;
        }
        if let Some(quality) = args.jpeg_quality {
            settings.jpeg_quality = quality;
        }
        if let Some(user_agent) = &args.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(app_name) = &args.app_name {
            settings.app_name = Some(app_name.clone());
        }
        if let Some(app_version) = &args.app_version {
            settings.app_version = Some(app_version.clone());
        }
        if let Some(zoom) = args.zoom_factor {
            settings.zoom_factor = Some(zoom);
        }
        if let Some(proxy) = &args.http_proxy {
            settings.http_proxy = Some(proxy.clone());
        }
        settings.insecure |= args.insecure;
        settings.smooth |= args.smooth;
        settings.print_alerts |= args.print_alerts;

        let engine = &mut settings.engine;
        for (flag, value) in [
            (args.javascript, &mut engine.javascript),
            (args.plugins, &mut engine.plugins),
            (args.private_browsing, &mut engine.private_browsing),
            (args.auto_load_images, &mut engine.auto_load_images),
            (args.js_can_open_windows, &mut engine.js_can_open_windows),
            (args.print_backgrounds, &mut engine.print_backgrounds),
            (args.zoom_text_only, &mut engine.zoom_text_only),
        ] {
            if let Some(flag) = flag {
                *value = flag;
            }
        }

        let request = self.build_request(args)?;
        let user_style = match (&args.user_style_path, &args.user_style_string) {
            (Some(path), _) => Some(UserStyle::Path(path.clone())),
            (None, Some(css)) => Some(UserStyle::Inline(css.clone())),
            (None, None) => None,
        };

        CaptureConfig::new(request, args.out.clone(), args.out_format.as_deref(), settings)?
            .with_expected_alert(args.expect_alert.clone())
            .with_user_style(user_style.as_ref())?
            .with_injected_script(args.inject_script.as_deref())?
            .with_script_object(args.script_object.as_deref())
    }

    fn build_request(&self, args: &CaptureArgs) -> Result<PageRequest, CaptureError> {
        let mut request = PageRequest::get(parse_target_url(&args.url)?);
        if let Some(method) = args.method {
            request.method = method;
        }
        for raw in &args.headers {
            let (name, value) = parse_header(raw)?;
            debug!("Request header {}", describe_header(&name, &value));
            request.headers.push((name, value));
        }
        request.body = match (&args.body_string, &args.body_base64) {
            (Some(body), _) => Some(body.clone().into_bytes()),
            (None, Some(encoded)) => Some(BASE64.decode(encoded.trim()).map_err(|e| {
                CaptureError::ConfigurationError(format!("Invalid base64 body: {e}"))
            })?),
            (None, None) => None,
        };
        Ok(request)
    }

    pub fn list_formats(&self) {
        println!("Supported output formats:");
        for entry in FORMAT_TABLE {
            println!(
                "  {:<8} {:<7} {:?}",
                entry.identifier,
                entry.extension,
                entry.format.kind()
            );
        }
    }

    pub async fn validate_config(&self, config_path: PathBuf) -> Result<(), CaptureError> {
        println!("Validating configuration: {}", config_path.display());

        let config_content = fs::read_to_string(&config_path).await.map_err(|e| {
            CaptureError::ConfigurationError(format!(
                "Cannot read {}: {e}",
                config_path.display()
            ))
        })?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| CaptureError::ConfigurationError(e.to_string()))?;
        config.validate()?;

        println!("Configuration is valid:");
        println!(
            "  Min viewport: {}x{}",
            config.min_viewport.width, config.min_viewport.height
        );
        println!("  Delay: {:?}", config.delay);
        println!("  Max wait: {:?}", config.max_wait);
        println!("  Page size: {:?}", config.page_size);
        println!("  JavaScript: {}", config.engine.javascript);
        println!("  JPEG quality: {}", config.jpeg_quality);

        Ok(())
    }
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| e as Box<dyn std::error::Error>)?;

    Ok(())
}
