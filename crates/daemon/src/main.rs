//! listsync daemon entry point.
//!
//! Loads configuration, initializes tracing, starts the reconciliation
//! scheduler, and handles graceful shutdown.

mod scheduler;
mod signals;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use listsync_core::config::AppConfig;
use listsync_core::directory::HttpDirectory;
use listsync_core::orchestrator::Orchestrator;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// listsync mailing list reconciliation daemon.
#[derive(Parser, Debug)]
#[command(
    name = "listsync-daemon",
    version,
    about = "Keeps remote mailing list memberships converged with the directory"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load and resolve configuration
    let mut config =
        AppConfig::load_from_file(&args.config).context("failed to load configuration file")?;
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables in config")?;
    config
        .validate()
        .context("configuration validation failed")?;

    // Initialize tracing
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    // Startup banner
    info!("========================================");
    info!("  listsync Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file   : {}", args.config.display());
    info!("Directory     : {}", config.directory.api_url);
    info!("Servers       : {}", config.servers.len());
    info!("Org lists     : {}", config.organization_lists.len());
    info!("Poll interval : {}s", config.daemon.poll_interval_secs);
    info!("Log level     : {}", log_level);
    info!("========================================");

    // Initialize directory client
    let directory = HttpDirectory::new(
        &config.directory.api_url,
        config.directory.token.clone(),
        config.daemon.http_timeout(),
    );
    info!("Directory client initialized");

    // Initialize orchestrator
    let poll_interval = std::time::Duration::from_secs(config.daemon.poll_interval_secs);
    let orchestrator = Arc::new(Orchestrator::new(config, directory));
    info!("Orchestrator initialized");

    // Create a shutdown notify for cooperative cancellation
    let shutdown = Arc::new(tokio::sync::Notify::new());
    let scheduler_shutdown = shutdown.clone();

    // Create and start the scheduler
    let sched = scheduler::Scheduler::new(orchestrator, poll_interval);

    let scheduler_handle = tokio::spawn(async move {
        sched.run(scheduler_shutdown).await;
    });

    // Wait for shutdown signal
    signals::wait_for_shutdown().await;

    info!("Shutdown signal received, stopping...");

    // Signal cooperative shutdown to the scheduler
    shutdown.notify_waiters();

    // Wait for the scheduler to finish its current cycle (up to 10s)
    match tokio::time::timeout(std::time::Duration::from_secs(10), scheduler_handle).await {
        Ok(Ok(())) => info!("scheduler stopped gracefully"),
        Ok(Err(e)) => warn!("scheduler task error: {}", e),
        Err(_) => warn!("scheduler did not stop within 10s, forcing shutdown"),
    }

    info!("listsync daemon stopped.");
    Ok(())
}
