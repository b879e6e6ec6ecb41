//! sub-manager: application entry point.
//!
//! Initializes tracing, loads configuration from a TOML file, starts the HTTP
//! listener with its health routes, registers with the discovery registry and
//! serves until SIGTERM/SIGINT, then drains and deregisters.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sub_manager::config::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use sub_manager::http::ShutdownSignal;
use sub_manager::{Bootstrap, StartupError};

/// sub-manager: discovery-registered service with health probes
#[derive(Parser, Debug)]
#[command(name = "sub-manager", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "sub_manager=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_tracing(filter: &str, json: bool) {
    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(filter));

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Log filter priority: CLI > env > default
    let log_filter = args
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    // Config is read first so its log format applies; errors are logged once tracing is up
    let loaded = AppConfig::load(&args.config);
    init_tracing(
        &log_filter,
        loaded.as_ref().map(|c| c.logging.is_json()).unwrap_or(false),
    );

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, path = %args.config, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        service = %config.service.name,
        host = %config.http.host,
        port = config.http.port,
        registry = config.registry.as_ref().map(|r| r.url.as_str()).unwrap_or("none"),
        "Loaded configuration"
    );

    // Installed before startup so a stop during registration still deregisters
    let mut signal = ShutdownSignal::install();

    let service = match Bootstrap::new(config) {
        Ok(bootstrap) => bootstrap.start_until(signal.recv()).await,
        Err(e) => Err(e),
    };

    let service = match service {
        Ok(service) => service,
        Err(StartupError::Interrupted) => {
            tracing::info!("Startup interrupted, exiting");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    match service.run_until(signal.recv()).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Server error during shutdown");
            ExitCode::FAILURE
        }
    }
}
