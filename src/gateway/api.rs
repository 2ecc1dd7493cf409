//! Gateway Routes

use super::handlers::*;
use crate::config::Config;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Gateway router
pub struct GatewayApi;

impl GatewayApi {
    /// Create the gateway router: tunnel endpoint, pages and monitoring
    pub fn create_router(state: AppState, config: &Config) -> Router {
        let mut router = Router::new()
            .route("/", get(home_page))
            .route("/health", get(health_check))
            .route(&config.server.ws_path, get(tunnel_upgrade));

        if config.monitoring.metrics_enabled {
            router = router.route("/metrics", get(export_metrics));
        }

        if config.share.enabled {
            router = router.route(&config.share.path, get(share_page));
        }

        router
            .fallback(not_found)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}
