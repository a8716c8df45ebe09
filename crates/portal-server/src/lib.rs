//! Telehealth Portal Server Library
//!
//! Axum application for the portal: the JSON API, server-rendered pages,
//! live notifications over WebSocket and the SQLite repositories behind them.

pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod pages;
pub mod repo;
pub mod templates;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_support;

use axum::routing::get;
use axum::Router;
use db::DbPool;
use portal::config::PortalConfig;
use portal::integrations::Integrations;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DbPool,
    /// WebSocket broadcast channel for live notifications.
    pub ws_broadcast: ws::WsBroadcast,
    /// Portal configuration.
    pub config: Arc<PortalConfig>,
    /// Outbound service clients.
    pub integrations: Integrations,
}

impl AppState {
    pub fn new(db: DbPool, config: Arc<PortalConfig>, integrations: Integrations) -> Self {
        Self {
            db,
            ws_broadcast: ws::create_broadcast(),
            config,
            integrations,
        }
    }
}

/// Health check endpoint.
///
/// Returns "ok" to indicate the server is running.
async fn health() -> &'static str {
    "ok"
}

/// Build the complete application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = api::routes().layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::rate_limit_layer,
    ));

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .merge(pages::routes())
        .nest("/api", api)
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::timing_layer))
        .layer(cors)
        .fallback_service(ServeDir::new("static"))
}
