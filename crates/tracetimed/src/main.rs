//! tracetimed - The tracetime background service
//!
//! Entry point: parses arguments, sets up logging, loads configuration and
//! runs the service until a termination signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracetime_config::load_config_or_default;
use tracetime_tracker::GitLabClient;
use tracetime_util::{
    default_config_path, SystemClock, TRACETIME_CONFIG_ENV, TRACETIME_DATA_DIR_ENV,
    TRACETIME_SOCKET_ENV,
};
use tracetimed::Service;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// tracetimed - Durable time tracking for issue tracker work
#[derive(Parser, Debug)]
#[command(name = "tracetimed")]
#[command(about = "Durable session timer service for issue time tracking", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/tracetime/config.toml)
    #[arg(short, long, env = TRACETIME_CONFIG_ENV, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override
    #[arg(short, long, env = TRACETIME_SOCKET_ENV)]
    socket: Option<PathBuf>,

    /// Data directory override
    #[arg(short, long, env = TRACETIME_DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "tracetimed starting");

    if tracetime_util::is_mock_time_active() {
        warn!(
            now = %tracetime_util::format_datetime_full(&tracetime_util::now()),
            "Mock time is active"
        );
    }

    let mut config = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    info!(
        config_path = %args.config.display(),
        socket_path = %config.socket_path.display(),
        data_dir = %config.data_dir.display(),
        checkpoint_secs = config.checkpoint_interval.as_secs(),
        "Configuration loaded"
    );

    let tracker = Arc::new(
        GitLabClient::new(config.tracker_timeout).context("Failed to create tracker client")?,
    );

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            _ = sighup.recv() => info!("Received SIGHUP, shutting down gracefully"),
        }
    };

    let service = Service::new(&config, tracker, Arc::new(SystemClock)).await?;
    service.run(shutdown).await
}
