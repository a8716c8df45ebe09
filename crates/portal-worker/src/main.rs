//! Portal Worker - periodic cleanup and consultation reminders.
//!
//! Each tick purges expired codes, sessions and rate-limit windows, trims old
//! notifications and audit entries, and queues reminders for consultations
//! that start soon.

mod db;
mod jobs;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use portal::config::PortalConfig;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

/// Portal Worker - runs scheduled cleanup against the portal database.
#[derive(Parser)]
#[command(name = "portal-worker")]
#[command(about = "Runs scheduled cleanup jobs against the portal database")]
struct Args {
    /// Path to SQLite database (defaults to `server.database` from the config)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Path to the portal configuration file
    #[arg(long, default_value = "portal.toml")]
    config: PathBuf,

    /// Seconds between ticks (defaults to `cleanup.interval_secs`)
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,
}

fn load_config(path: &Path) -> anyhow::Result<PortalConfig> {
    if path.exists() {
        PortalConfig::from_path(path).with_context(|| format!("Failed to load {path:?}"))
    } else {
        tracing::info!("No config at {:?}, using defaults", path);
        Ok(PortalConfig::default())
    }
}

fn tick(db: &db::DbPool, config: &PortalConfig) -> anyhow::Result<()> {
    let mut conn = db::lock(db)?;
    let report = jobs::run_all(&mut conn, &config.cleanup, Utc::now())?;
    tracing::info!(
        magic_codes = report.magic_codes,
        sessions = report.sessions,
        rate_limits = report.rate_limits,
        notifications = report.notifications,
        audit_logs = report.audit_logs,
        reminders = report.reminders,
        total = report.total(),
        "Cleanup tick finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let config = load_config(&args.config)?;
    let db_path = args.db.unwrap_or_else(|| config.server.database.clone());
    let interval = Duration::from_secs(args.interval.unwrap_or(config.cleanup.interval_secs));

    tracing::info!("Starting portal-worker");
    tracing::info!("Database: {:?}", db_path);
    tracing::info!("Interval: {}s", interval.as_secs());

    let db = db::connect(&db_path).context("Failed to open database")?;

    if args.once {
        return tick(&db, &config);
    }

    // Shutdown flag
    let shutdown = Arc::new(AtomicBool::new(false));
    let wake = Arc::new(Notify::new());
    {
        let shutdown = shutdown.clone();
        let wake = wake.clone();
        tokio::spawn(async move {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl+c: {}", e);
                return;
            }
            tracing::info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
            wake.notify_one();
        });
    }

    while !shutdown.load(Ordering::SeqCst) {
        if let Err(e) = tick(&db, &config) {
            tracing::error!("Cleanup tick failed: {:#}", e);
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = wake.notified() => {}
        }
    }

    tracing::info!("Worker shutdown complete");
    Ok(())
}
