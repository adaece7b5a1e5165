use anyhow::Context;
use clap::Parser;
use page_capture::{setup_logging, Cli, CliRunner, Config};
use tokio::signal;
use tracing::{error, info, warn};

/// Exit status when configuration is rejected before any capture starts.
const EXIT_CONFIGURATION: i32 = 2;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let args = Cli::parse();

    if let Err(e) = setup_logging(args.verbose) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!("Starting page-capture v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&args).await {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(EXIT_CONFIGURATION);
        }
    };

    let runner = CliRunner::new(config, &args);

    // Setup graceful shutdown; the session shuts Chrome down before returning.
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let shutdown_handler = setup_shutdown_handler(shutdown_tx);

    let result = runner.run(args.command, shutdown_rx).await;
    shutdown_handler.abort();

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let config = if let Some(config_path) = &args.config {
        let config_content = tokio::fs::read_to_string(config_path)
            .await
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        serde_json::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?
    } else {
        Config::default()
    };

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_shutdown_handler(
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let (mut sigint, mut sigterm) = match (
            signal::unix::signal(signal::unix::SignalKind::interrupt()),
            signal::unix::signal(signal::unix::SignalKind::terminate()),
        ) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }

        let _ = shutdown_tx.send(());
    })
}
