//! Relay Engine
//!
//! Drives a tunnel from the acknowledgement to teardown: connect to the
//! decoded target, forward the handshake remainder, then splice the
//! WebSocket and the TCP stream until either side finishes.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::{ConnectionStats, RelaySession};
use crate::error::TunnelError;
use crate::metrics::Metrics;
use crate::protocol::HandshakeRequest;

const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Which leg of the splice finished first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// WebSocket to target
    Upstream,
    /// Target to WebSocket
    Downstream,
}

/// Handles data relay between tunnel clients and their targets
pub struct RelayEngine {
    connect_timeout: Option<Duration>,
    buffer_size: usize,
    metrics: Arc<Metrics>,
    active_sessions: Arc<Mutex<HashMap<String, Arc<RelaySession>>>>,
    next_session_id: AtomicU64,
}

impl RelayEngine {
    /// Create a new relay engine; connects are bounded only by the OS
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self::with_settings(None, DEFAULT_BUFFER_SIZE, metrics)
    }

    /// Create a relay engine with explicit settings; `None` leaves connects to the OS timeout
    pub fn with_settings(connect_timeout: Option<Duration>, buffer_size: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            connect_timeout,
            buffer_size,
            metrics,
            active_sessions: Arc::new(Mutex::new(HashMap::new())),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Create a new relay engine from configuration
    pub fn from_config(config: &crate::config::Config, metrics: Arc<Metrics>) -> Self {
        let connect_timeout = Some(config.server.connect_timeout).filter(|t| !t.is_zero());
        Self::with_settings(connect_timeout, config.server.buffer_size, metrics)
    }

    /// Run a tunnel for an already decoded and authenticated request.
    ///
    /// Never fails towards the caller: every error ends the session and is
    /// only visible in logs and metrics.
    #[instrument(skip(self, socket, request), fields(peer = %peer_addr, target = %request.target()))]
    pub async fn run(&self, socket: WebSocket, request: HandshakeRequest, peer_addr: SocketAddr) {
        match self.serve(socket, request, peer_addr).await {
            Ok(stats) => {
                debug!(session_id = %stats.session_id, "Tunnel session finished");
            }
            Err(e) => {
                debug!(error = %e, "Tunnel session ended with error");
            }
        }
    }

    async fn serve(
        &self,
        mut socket: WebSocket,
        request: HandshakeRequest,
        peer_addr: SocketAddr,
    ) -> Result<ConnectionStats, TunnelError> {
        // Acknowledge before any outbound I/O
        socket
            .send(Message::Binary(request.ack().to_vec()))
            .await
            .map_err(ws_io_error)?;

        let (outbound, resolved) = match self.connect_to_target(&request).await {
            Ok(connected) => connected,
            Err(e) => {
                self.metrics.outbound_connect_failed();
                return Err(e);
            }
        };

        let guard = self.start_session(peer_addr, request.target());
        let session = Arc::clone(&guard.session);
        info!(session_id = %session.session_id, resolved = %resolved, "Relaying");

        let result = self.splice(&session, socket, outbound, request.remainder).await;
        drop(guard);

        session.log_stats();
        let stats = session.to_stats();

        result.map(|closed_first| {
            debug!(session_id = %session.session_id, ?closed_first, "Splice finished");
            stats
        })
    }

    /// Establish connection to the target of a handshake
    pub async fn connect_to_target(&self, request: &HandshakeRequest) -> Result<(TcpStream, SocketAddr), TunnelError> {
        let target = request.target();
        debug!("Attempting to connect to target: {}", target);

        let socket_addrs = self.resolve_target(request).await
            .map_err(|source| TunnelError::OutboundConnectFailed { target: target.clone(), source })?;

        let mut last_error = None;
        for addr in socket_addrs {
            match with_deadline(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(stream) => {
                    debug!("Connected to target {} at {}", target, addr);
                    return Ok((stream, addr));
                }
                Err(e) => {
                    debug!("Failed to connect to {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(TunnelError::OutboundConnectFailed {
            target,
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")),
        })
    }

    /// Resolve the target to socket addresses; IP literals skip DNS
    async fn resolve_target(&self, request: &HandshakeRequest) -> io::Result<Vec<SocketAddr>> {
        if let Some(ip) = request.target_ip() {
            return Ok(vec![SocketAddr::new(ip, request.target_port)]);
        }

        let host = request.target_host.as_str();
        let addrs: Vec<SocketAddr> = lookup_host((host, request.target_port)).await?.collect();

        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("DNS resolution returned no addresses for {}", host),
            ));
        }
        debug!("Resolved {} to {} addresses", host, addrs.len());
        Ok(addrs)
    }

    /// Forward `remainder`, then copy both directions until one finishes.
    ///
    /// The first direction to finish cancels the other; both legs are closed
    /// before returning.
    async fn splice(
        &self,
        session: &RelaySession,
        socket: WebSocket,
        outbound: TcpStream,
        remainder: Bytes,
    ) -> Result<Direction, TunnelError> {
        let (mut ws_tx, mut ws_rx) = socket.split();
        let (mut tcp_rd, mut tcp_wr) = outbound.into_split();

        if !remainder.is_empty() {
            tcp_wr.write_all(&remainder).await?;
            session.add_bytes_up(remainder.len() as u64);
        }

        let buffer_size = self.buffer_size;

        let upstream = async {
            while let Some(message) = ws_rx.next().await {
                let payload = match message.map_err(ws_io_error)? {
                    Message::Binary(data) => data,
                    Message::Text(text) => text.into_bytes(),
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) => continue,
                };
                tcp_wr.write_all(&payload).await?;
                session.add_bytes_up(payload.len() as u64);
            }
            Ok::<_, io::Error>(Direction::Upstream)
        };

        let downstream = async {
            let mut buf = vec![0u8; buffer_size];
            loop {
                let n = tcp_rd.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                ws_tx.send(Message::Binary(buf[..n].to_vec())).await.map_err(ws_io_error)?;
                session.add_bytes_down(n as u64);
            }
            Ok::<_, io::Error>(Direction::Downstream)
        };

        let result = tokio::select! {
            r = upstream => r,
            r = downstream => r,
        };

        // Close both legs whichever side ended
        let _ = tcp_wr.shutdown().await;
        let _ = ws_tx.send(Message::Close(None)).await;
        let _ = ws_tx.close().await;

        Ok(result?)
    }

    /// Register a session; it stays registered and counted until the guard drops
    fn start_session(&self, peer_addr: SocketAddr, target: String) -> SessionGuard<'_> {
        let session_id = format!("tunnel_{}", self.next_session_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(RelaySession::new(session_id.clone(), peer_addr, target));
        self.sessions().insert(session_id, session.clone());
        self.metrics.session_started();
        SessionGuard { engine: self, session }
    }

    /// Remove a session from active tracking
    pub fn remove_session(&self, session_id: &str) {
        if self.sessions().remove(session_id).is_some() {
            debug!("Removed session {} from active tracking", session_id);
        }
    }

    /// Get active session count
    pub fn active_session_count(&self) -> usize {
        self.sessions().len()
    }

    /// Get statistics for all sessions currently relaying
    pub fn get_active_session_stats(&self) -> Vec<ConnectionStats> {
        self.sessions().values().map(|session| session.to_stats()).collect()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<RelaySession>>> {
        self.active_sessions.lock().unwrap_or_else(|poisoned| {
            warn!("Session registry lock was poisoned; continuing");
            PoisonError::into_inner(poisoned)
        })
    }
}

/// Unregisters a session and closes its metrics, also when the relay is cancelled
struct SessionGuard<'a> {
    engine: &'a RelayEngine,
    session: Arc<RelaySession>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.engine.remove_session(&self.session.session_id);
        self.engine.metrics.session_ended(&self.session.to_stats());
    }
}

/// Bound an I/O future by an optional deadline
async fn with_deadline<T, F>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => timeout(limit, fut).await.map_err(|_| {
            io::Error::new(io::ErrorKind::TimedOut, format!("timed out after {:?}", limit))
        })?,
        None => fut.await,
    }
}

fn ws_io_error(e: axum::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}
