//! Tunnel error taxonomy
//!
//! Every variant here is contained inside a single session: it ends that
//! session and nothing else. None of them is ever reported to the peer.

use std::io;
use thiserror::Error;

/// Failures while decoding the first message of a connection
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("malformed handshake: {0}")]
    Malformed(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("unsupported address type: {0}")]
    UnsupportedAddressType(u8),
}

impl HandshakeError {
    /// Short label used for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            HandshakeError::Malformed(_) => "malformed",
            HandshakeError::AuthenticationFailed => "auth_failed",
            HandshakeError::UnsupportedAddressType(_) => "unsupported_address_type",
        }
    }
}

/// Failures over the whole lifetime of a tunnel session
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("no handshake received within {0:?}")]
    HandshakeTimeout(std::time::Duration),

    #[error("failed to connect to {target}: {source}")]
    OutboundConnectFailed {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("relay I/O error: {0}")]
    RelayIo(#[from] io::Error),
}

/// Invalid identity configuration
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity must be 32 hex characters (dashes allowed), got {0} after removing dashes")]
    InvalidLength(usize),

    #[error("identity contains non-hex characters")]
    InvalidCharacters,

    #[error("identity is not a valid UUID: {0}")]
    Uuid(#[from] uuid::Error),
}
