//! Handshake Decoder
//!
//! Turns the first WebSocket message of a connection into a
//! [`HandshakeRequest`]. No I/O happens here.
//!
//! ```text
//! +-----+----------+------+---------+-----+------+------+---------+---------+
//! | VER | IDENTITY | OLEN | OPTIONS | RSV | PORT | ATYP | ADDRESS | PAYLOAD |
//! +-----+----------+------+---------+-----+------+------+---------+---------+
//! |  1  |    16    |  1   |  OLEN   |  1  |  2   |  1   |   var   |   var   |
//! +-----+----------+------+---------+-----+------+------+---------+---------+
//! ```

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use bytes::Bytes;

use super::cursor::ByteCursor;
use super::types::{AddressType, HandshakeRequest, Identity};
use crate::error::HandshakeError;
use crate::protocol::constants::*;

/// Authenticating decoder bound to the process identity
#[derive(Debug, Clone)]
pub struct HandshakeDecoder {
    identity: Arc<Identity>,
}

impl HandshakeDecoder {
    pub fn new(identity: Arc<Identity>) -> Self {
        Self { identity }
    }

    /// Decode and authenticate a handshake message
    pub fn decode(&self, message: Bytes) -> Result<HandshakeRequest, HandshakeError> {
        decode(message, &self.identity)
    }
}

/// Decode a handshake and check its identity against `identity`
pub fn decode(message: Bytes, identity: &Identity) -> Result<HandshakeRequest, HandshakeError> {
    decode_inner(message, Some(identity))
}

/// Decode a handshake without authenticating it
pub fn decode_unchecked(message: Bytes) -> Result<HandshakeRequest, HandshakeError> {
    decode_inner(message, None)
}

fn decode_inner(message: Bytes, identity: Option<&Identity>) -> Result<HandshakeRequest, HandshakeError> {
    if message.len() < MIN_HANDSHAKE_LEN {
        return Err(HandshakeError::Malformed(format!(
            "message is {} bytes, need at least {}",
            message.len(),
            MIN_HANDSHAKE_LEN
        )));
    }

    let mut cursor = ByteCursor::new(&message);

    let version = cursor.read_u8("version")?;
    let presented: [u8; IDENTITY_LEN] = cursor.read_array("identity")?;

    if let Some(expected) = identity {
        if !expected.matches(&presented) {
            return Err(HandshakeError::AuthenticationFailed);
        }
    }

    let options_len = cursor.read_u8("options length")? as usize;
    cursor.skip(options_len, "options")?;
    cursor.skip(RESERVED_AFTER_OPTIONS, "reserved")?;

    let target_port = cursor.read_u16_be("port")?;
    let address_type = AddressType::from_tag(cursor.read_u8("address type")?)?;
    let target_host = read_address(&mut cursor, address_type)?;

    let remainder = message.slice(cursor.position()..);

    Ok(HandshakeRequest {
        version,
        identity: presented,
        target_port,
        address_type,
        target_host,
        remainder,
    })
}

fn read_address(cursor: &mut ByteCursor<'_>, address_type: AddressType) -> Result<String, HandshakeError> {
    match address_type {
        AddressType::Ipv4 => {
            let octets: [u8; 4] = cursor.read_array("IPv4 address")?;
            Ok(Ipv4Addr::from(octets).to_string())
        }
        AddressType::Domain => {
            let len = cursor.read_u8("domain length")? as usize;
            if len == 0 {
                return Err(HandshakeError::Malformed("domain length cannot be zero".to_string()));
            }
            let raw = cursor.take(len, "domain")?;
            let domain = std::str::from_utf8(raw)
                .map_err(|e| HandshakeError::Malformed(format!("invalid UTF-8 in domain: {}", e)))?;
            Ok(domain.to_string())
        }
        AddressType::Ipv6 => {
            let octets: [u8; 16] = cursor.read_array("IPv6 address")?;
            Ok(format_ipv6_full(&Ipv6Addr::from(octets)))
        }
    }
}

/// Eight lowercase hex groups, no zero compression
fn format_ipv6_full(addr: &Ipv6Addr) -> String {
    addr.segments()
        .iter()
        .map(|segment| format!("{:x}", segment))
        .collect::<Vec<_>>()
        .join(":")
}
