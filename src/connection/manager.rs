//! Connection Manager Implementation

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{HandshakeError, TunnelError};
use crate::metrics::Metrics;
use crate::protocol::{HandshakeDecoder, HandshakeRequest, Identity};
use crate::relay::RelayEngine;
use crate::Result;

/// Snapshot of connection counters
#[derive(Debug, Clone)]
pub struct ManagerStats {
    pub active_connections: usize,
    pub active_sessions: usize,
    pub total_connections_served: u64,
}

/// Owns every upgraded tunnel socket from the first message to teardown
pub struct ConnectionManager {
    decoder: HandshakeDecoder,
    relay_engine: RelayEngine,
    metrics: Arc<Metrics>,
    handshake_timeout: Duration,
    active_connections: AtomicUsize,
    shutdown_flag: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ConnectionManager {
    /// Create a new ConnectionManager
    pub fn new(config: &Config, identity: Arc<Identity>, metrics: Arc<Metrics>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            decoder: HandshakeDecoder::new(identity),
            relay_engine: RelayEngine::from_config(config, Arc::clone(&metrics)),
            metrics,
            handshake_timeout: config.server.handshake_timeout,
            active_connections: AtomicUsize::new(0),
            shutdown_flag: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Handle one upgraded socket for its whole lifetime.
    ///
    /// Handshake failures close the socket without an acknowledgement or any
    /// error payload.
    #[instrument(skip(self, socket), fields(peer = %peer_addr))]
    pub async fn handle_socket(&self, mut socket: WebSocket, peer_addr: SocketAddr) {
        let mut shutdown_rx = match self.shutdown_receiver() {
            Some(rx) => rx,
            None => {
                debug!("Rejecting tunnel from {} due to shutdown", peer_addr);
                return;
            }
        };

        self.metrics.connection_opened();
        let _active = ActiveConnection::enter(&self.active_connections);
        let start_time = Instant::now();

        tokio::select! {
            _ = async {
                let request = match self.accept_handshake(&mut socket).await {
                    Ok(request) => request,
                    Err(e) => {
                        self.metrics.handshake_rejected(rejection_reason(&e));
                        debug!(error = %e, "Dropping connection without acknowledgement");
                        return;
                    }
                };
                self.relay_engine.run(socket, request, peer_addr).await;
            } => {}
            _ = shutdown_rx.recv() => {
                info!("Tunnel from {} received shutdown signal, closing", peer_addr);
            }
        }

        debug!("Tunnel from {} closed after {:?}", peer_addr, start_time.elapsed());
    }

    /// Subscribe to shutdown, or `None` if it has already started.
    ///
    /// Subscribing before reading the flag means a shutdown racing with a new
    /// tunnel is either seen here or delivered on the receiver.
    fn shutdown_receiver(&self) -> Option<broadcast::Receiver<()>> {
        let rx = self.shutdown_tx.subscribe();
        if self.is_shutting_down() {
            None
        } else {
            Some(rx)
        }
    }

    /// Wait for the first data message and decode it
    async fn accept_handshake(&self, socket: &mut WebSocket) -> std::result::Result<HandshakeRequest, TunnelError> {
        let first = timeout(self.handshake_timeout, first_data_message(socket))
            .await
            .map_err(|_| TunnelError::HandshakeTimeout(self.handshake_timeout))??;

        Ok(self.decoder.decode(first)?)
    }

    /// Get the number of sockets currently owned by the manager
    pub fn get_active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn get_connection_stats(&self) -> ManagerStats {
        ManagerStats {
            active_connections: self.get_active_connections(),
            active_sessions: self.relay_engine.active_session_count(),
            total_connections_served: self.metrics.get_total_connections(),
        }
    }

    /// Tell every live tunnel to close and refuse new ones
    pub fn initiate_shutdown(&self) {
        info!("Initiating connection manager shutdown");
        self.shutdown_flag.store(true, Ordering::Release);

        if let Err(e) = self.shutdown_tx.send(()) {
            debug!("No active tunnels to notify of shutdown: {}", e);
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::Acquire)
    }

    /// Wait until all tunnels have closed or `limit` elapses
    pub async fn wait_for_connections_to_close(&self, limit: Duration) -> Result<()> {
        let start_time = Instant::now();
        let mut last_count = self.get_active_connections();

        while last_count > 0 && start_time.elapsed() < limit {
            tokio::time::sleep(Duration::from_millis(100)).await;

            let current_count = self.get_active_connections();
            if current_count != last_count {
                debug!("Active tunnels: {} -> {}", last_count, current_count);
                last_count = current_count;
            }
        }

        if last_count == 0 {
            info!("All tunnels closed in {:?}", start_time.elapsed());
            Ok(())
        } else {
            warn!("Shutdown timeout reached with {} tunnels still active", last_count);
            Err(anyhow::anyhow!("{} tunnels still active after {:?}", last_count, limit))
        }
    }
}

/// First binary or text payload; control frames before it are skipped
async fn first_data_message(socket: &mut WebSocket) -> std::result::Result<Bytes, TunnelError> {
    loop {
        match socket.recv().await {
            Some(Ok(Message::Binary(data))) => return Ok(Bytes::from(data)),
            Some(Ok(Message::Text(_))) => {
                return Err(HandshakeError::Malformed("handshake must be a binary message".to_string()).into());
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => {
                return Err(HandshakeError::Malformed("connection closed before handshake".to_string()).into());
            }
            Some(Err(e)) => {
                return Err(TunnelError::RelayIo(std::io::Error::new(std::io::ErrorKind::Other, e)));
            }
        }
    }
}

fn rejection_reason(error: &TunnelError) -> &'static str {
    match error {
        TunnelError::Handshake(e) => e.reason(),
        TunnelError::HandshakeTimeout(_) => "timeout",
        TunnelError::OutboundConnectFailed { .. } | TunnelError::RelayIo(_) => "io",
    }
}

/// Keeps the active connection count accurate even when a tunnel is cancelled
struct ActiveConnection<'a>(&'a AtomicUsize);

impl<'a> ActiveConnection<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ActiveConnection<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
