//! Portal Server
//!
//! Serves the JSON API, the server-rendered pages and live notifications
//! over WebSocket.

use anyhow::Context;
use portal::config::PortalConfig;
use portal::integrations::Integrations;
use portal_server::{app, db, AppState};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = PortalConfig::load().context("Failed to load portal.toml")?;

    if let Some(dir) = config.server.database.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).context("Failed to create data directory")?;
        }
    }
    let db = db::init_db(&config.server.database).context("Failed to initialize database")?;

    let integrations =
        Integrations::from_config(&config.integrations, &config.magic_link.from_address)
            .context("Failed to build integration clients")?;

    let bind = config.server.bind.clone();
    let state = AppState::new(db, Arc::new(config), integrations);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {bind}"))?;
    tracing::info!("Server running on http://{}", bind);

    axum::serve(listener, app(state)).await.context("Server error")?;
    Ok(())
}
