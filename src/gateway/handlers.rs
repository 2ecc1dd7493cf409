//! Gateway Handlers

use super::pages::{status_page, HOME_PAGE};
use super::types::HealthStatus;
use crate::connection::ConnectionManager;
use crate::metrics::Metrics;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub connections: Arc<ConnectionManager>,
    pub metrics: Arc<Metrics>,
    pub start_time: Instant,
    pub listen_port: u16,
    /// Pre-rendered base64 share link, present when the share page is enabled
    pub share_link: Option<Arc<str>>,
}

/// Upgrade to WebSocket and hand the socket to the connection manager
pub async fn tunnel_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let connections = Arc::clone(&state.connections);

    ws.on_failed_upgrade(move |e| {
        debug!("Tunnel upgrade from {} failed: {}", peer_addr, e);
    })
    .on_upgrade(move |socket| async move {
        connections.handle_socket(socket, peer_addr).await;
    })
}

pub async fn home_page() -> Html<&'static str> {
    Html(HOME_PAGE)
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let stats = state.connections.get_connection_stats();

    Json(HealthStatus {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_connections: stats.active_connections,
        active_sessions: stats.active_sessions,
        total_connections: stats.total_connections_served,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus text exposition
pub async fn export_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}

pub async fn share_page(State(state): State<AppState>) -> Response {
    match &state.share_link {
        Some(link) => Html(status_page(state.listen_port, link)).into_response(),
        None => not_found().await.into_response(),
    }
}

pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}
