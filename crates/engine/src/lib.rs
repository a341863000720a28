//! Partyline relay server.
//!
//! A WebSocket relay that groups connections into rooms (one host, any
//! number of players) and forwards opaque game messages between them.
//!
//! ## Structure
//!
//! - `api/` - connection registry and the WebSocket entry point
//! - `settings` - environment configuration

pub mod api;
pub mod settings;

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use api::websocket::WsState;
pub use settings::{RelaySettings, SettingsError};

/// Build the relay router: `/ws` for clients and `/health` for probes.
pub fn router(state: Arc<WsState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(api::websocket::ws_handler).with_state(state))
        .layer(TraceLayer::new_for_http())
}

/// Serve the relay on an already bound listener until the server stops.
pub async fn serve(listener: TcpListener, state: Arc<WsState>) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

async fn health() -> &'static str {
    "OK"
}

/// CORS for browser clients, from `CORS_ALLOWED_ORIGINS`.
pub fn build_cors_layer(allowed_origins: Option<&str>) -> Option<CorsLayer> {
    let allowed_origins = allowed_origins?;
    let cors = CorsLayer::new().allow_methods([Method::GET, Method::OPTIONS]);

    if allowed_origins == "*" {
        return Some(cors.allow_origin(Any));
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect();

    if origins.is_empty() {
        return None;
    }
    Some(cors.allow_origin(origins))
}
