//! Gateway Server

use super::{api::GatewayApi, handlers::AppState, share::encoded_share_link};
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::metrics::Metrics;
use crate::Result;
use anyhow::Context;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// HTTP front: serves the tunnel endpoint and the auxiliary pages
pub struct GatewayServer {
    listener: TcpListener,
    router: Router,
    connections: Arc<ConnectionManager>,
    shutdown_timeout: Duration,
}

impl GatewayServer {
    /// Bind the listener and assemble the router
    pub async fn bind(config: &Config, metrics: Arc<Metrics>) -> Result<Self> {
        let identity = Arc::new(config.identity()?);
        let connections = Arc::new(ConnectionManager::new(config, identity, Arc::clone(&metrics)));

        let listener = TcpListener::bind(config.server.bind_addr)
            .await
            .with_context(|| format!("Failed to bind gateway to {}", config.server.bind_addr))?;
        let local_addr = listener.local_addr()
            .context("Failed to read bound gateway address")?;

        let share_link: Option<Arc<str>> = if config.share.enabled {
            Some(Arc::from(encoded_share_link(config)?))
        } else {
            None
        };

        let state = AppState {
            connections: Arc::clone(&connections),
            metrics,
            start_time: Instant::now(),
            listen_port: local_addr.port(),
            share_link,
        };

        info!("Gateway listening on {} (tunnel path {})", local_addr, config.server.ws_path);

        Ok(Self {
            listener,
            router: GatewayApi::create_router(state, config),
            connections,
            shutdown_timeout: config.server.shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn connections(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.connections)
    }

    /// Serve until `shutdown` resolves, then close the live tunnels
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let connections = Arc::clone(&self.connections);
        let signal = async move {
            shutdown.await;
            info!("Gateway stopping: no new connections accepted");
            connections.initiate_shutdown();
        };

        axum::serve(
            self.listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .context("Gateway server error")?;

        if let Err(e) = self
            .connections
            .wait_for_connections_to_close(self.shutdown_timeout)
            .await
        {
            warn!("Gateway stopped with tunnels still open: {}", e);
        }

        info!("Gateway stopped");
        Ok(())
    }
}
