use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use stock_watcher::config::{self, AppConfig, WatchMode};
use stock_watcher::utils::logging::{self, LoggingOptions};
use stock_watcher::StockWatcher;

#[derive(Debug, Parser)]
#[command(name = "stock-watcher", version, about = "Watches product pages and pushes an alert when they come back in stock")]
struct Args {
    /// Extra TOML configuration file, layered over config/default and config/local
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Read environment variables from this file instead of the nearest .env
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// Also append log lines to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Override the configured polling mode
    #[arg(long, value_enum)]
    mode: Option<WatchMode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Before logging, so RUST_LOG from the env file takes effect
    match &args.env_file {
        Some(path) => config::load_env_from(path).context("Failed to load env file")?,
        None => {
            config::load_env_file();
        }
    }

    let _log_guard = logging::init(&LoggingOptions {
        log_file: args.log_file.clone(),
        directive: None,
    })
    .context("Failed to initialise logging")?;

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(mode) = args.mode {
        config.watcher.mode = mode;
    }

    info!("Starting stock watcher v{}", env!("CARGO_PKG_VERSION"));
    let mut watcher = StockWatcher::from_config(&config).context("Failed to build watcher")?;

    if config.notifications.test_push_on_start {
        watcher.send_startup_test().await;
    }

    if args.once {
        let report = watcher.run_cycle().await?;
        info!("Single cycle finished: {:?}", report);
        return Ok(());
    }

    watcher.run(shutdown_signal()).await?;
    info!("Stock watcher stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
