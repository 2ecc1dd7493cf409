//! wsgate Library
//! 
//! Authenticated WebSocket-to-TCP tunnel gateway.
//!
//! A client opens a WebSocket, sends one binary handshake carrying its
//! identity and a target address, receives a two byte acknowledgement, and
//! from then on the socket is a raw byte pipe to that target.

pub mod config;
pub mod connection;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod protocol;
pub mod relay;
pub mod shutdown;

pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{HandshakeError, TunnelError};
pub use gateway::GatewayServer;
pub use shutdown::ShutdownCoordinator;

/// Common error type for application setup
pub type Result<T> = anyhow::Result<T>;
