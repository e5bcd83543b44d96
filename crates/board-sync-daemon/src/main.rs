//! board-sync-daemon: Headless whiteboard replica.
//!
//! Keeps a private board file in step with a shared board file using the same
//! board-sync-core the whiteboard UI uses.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use board_sync_core::Synchronizer;
use board_sync_daemon::{Config, Daemon, FileStore};

#[derive(Parser, Debug)]
#[command(name = "board-sync-daemon")]
#[command(about = "Whiteboard shared-document sync daemon")]
struct Args {
    /// Path to the private board file
    #[arg(short, long, env = "BOARD_SYNC_LOCAL")]
    local: String,

    /// Path to the shared board file
    #[arg(short, long, env = "BOARD_SYNC_SHARED")]
    shared: String,

    /// JSON file with sync tuning (debounce, poll interval, retry, diagnostics)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the poll interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Override the debounce window in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Reconcile once and exit instead of polling
    #[arg(long)]
    once: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,board_sync_daemon=debug,board_sync_core=debug"
    } else {
        "info,board_sync_daemon=info,board_sync_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(&args.local, &args.shared, args.config.as_deref())?
        .with_poll_interval(args.poll_interval_ms.map(Duration::from_millis))
        .with_debounce(args.debounce_ms.map(Duration::from_millis));

    info!("Starting board-sync-daemon");
    info!("Local board: {:?}", config.local_path);
    info!("Shared board: {:?}", config.shared_path);

    let local = Arc::new(FileStore::new(config.local_path.clone()));
    let shared = Arc::new(FileStore::new(config.shared_path.clone()));
    let daemon = Daemon::new(Synchronizer::new(local, shared, config.sync.clone()));

    let warnings = daemon
        .reconcile()
        .await
        .context("Initial reconciliation failed")?;
    for warning in &warnings {
        warn!("{}", warning);
    }

    if args.once {
        info!("Reconciled once, exiting");
        return Ok(());
    }

    info!(
        "Daemon running, polling every {:?}. Press Ctrl+C to stop.",
        config.sync.poll_interval
    );

    daemon
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("Failed to flush pending saves")?;

    info!("Shutting down");
    Ok(())
}
