//! Tunnel Protocol Types

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use bytes::Bytes;
use uuid::Uuid;

use crate::error::{HandshakeError, IdentityError};
use crate::protocol::constants::*;

/// The shared secret every client must present in its handshake
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Identity([u8; IDENTITY_LEN]);

impl Identity {
    /// Parse from 32 hex characters; dashes are ignored, case does not matter
    pub fn parse(value: &str) -> Result<Self, IdentityError> {
        let compact: String = value.trim().chars().filter(|c| *c != '-').collect();

        if compact.len() != IDENTITY_LEN * 2 {
            return Err(IdentityError::InvalidLength(compact.len()));
        }
        if !compact.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IdentityError::InvalidCharacters);
        }

        let uuid = Uuid::try_parse(&compact)?;
        Ok(Self(*uuid.as_bytes()))
    }

    pub fn from_bytes(bytes: [u8; IDENTITY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    /// Compare against a presented identity.
    ///
    /// Every byte is visited regardless of where the first difference is.
    pub fn matches(&self, presented: &[u8]) -> bool {
        if presented.len() != IDENTITY_LEN {
            return false;
        }
        self.0
            .iter()
            .zip(presented)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }

    /// Lowercase hex without separators, as used in share links
    pub fn to_compact_string(&self) -> String {
        Uuid::from_bytes(self.0).simple().to_string()
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).hyphenated())
    }
}

// Keep the secret out of debug logs
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Address encodings carried in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Ipv4,
    Domain,
    Ipv6,
}

impl AddressType {
    /// Get the wire tag for this address type
    pub fn tag(&self) -> u8 {
        match self {
            AddressType::Ipv4 => ADDR_TYPE_IPV4,
            AddressType::Domain => ADDR_TYPE_DOMAIN,
            AddressType::Ipv6 => ADDR_TYPE_IPV6,
        }
    }

    /// Create from wire tag
    pub fn from_tag(tag: u8) -> Result<Self, HandshakeError> {
        match tag {
            ADDR_TYPE_IPV4 => Ok(AddressType::Ipv4),
            ADDR_TYPE_DOMAIN => Ok(AddressType::Domain),
            ADDR_TYPE_IPV6 => Ok(AddressType::Ipv6),
            other => Err(HandshakeError::UnsupportedAddressType(other)),
        }
    }
}

/// A decoded and authenticated handshake
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeRequest {
    pub version: u8,
    pub identity: [u8; IDENTITY_LEN],
    pub target_port: u16,
    pub address_type: AddressType,
    pub target_host: String,
    /// Payload that arrived in the handshake message after the header
    pub remainder: Bytes,
}

impl HandshakeRequest {
    /// The two byte acknowledgement sent before relaying starts
    pub fn ack(&self) -> [u8; 2] {
        [self.version, ACK_STATUS_OK]
    }

    /// Literal IP of the target, if it is not a domain name
    pub fn target_ip(&self) -> Option<IpAddr> {
        match self.address_type {
            AddressType::Domain => None,
            AddressType::Ipv4 | AddressType::Ipv6 => self.target_host.parse().ok(),
        }
    }

    /// `host:port` form, bracketing IPv6 literals
    pub fn target(&self) -> String {
        match self.address_type {
            AddressType::Ipv6 => format!("[{}]:{}", self.target_host, self.target_port),
            _ => format!("{}:{}", self.target_host, self.target_port),
        }
    }

    /// Encode the request as a client would send it (client side framing).
    ///
    /// `options` fills the ignorable options region.
    pub fn encode(&self, options: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        if options.len() > u8::MAX as usize {
            return Err(HandshakeError::Malformed(format!(
                "options region too long: {}",
                options.len()
            )));
        }

        let mut out = Vec::with_capacity(64 + self.remainder.len());
        out.push(self.version);
        out.extend_from_slice(&self.identity);
        out.push(options.len() as u8);
        out.extend_from_slice(options);
        out.extend(std::iter::repeat(0u8).take(RESERVED_AFTER_OPTIONS));
        out.extend_from_slice(&self.target_port.to_be_bytes());
        out.push(self.address_type.tag());

        match self.address_type {
            AddressType::Ipv4 => {
                let ip = Ipv4Addr::from_str(&self.target_host).map_err(|e| {
                    HandshakeError::Malformed(format!("invalid IPv4 target {}: {}", self.target_host, e))
                })?;
                out.extend_from_slice(&ip.octets());
            }
            AddressType::Ipv6 => {
                let ip = Ipv6Addr::from_str(&self.target_host).map_err(|e| {
                    HandshakeError::Malformed(format!("invalid IPv6 target {}: {}", self.target_host, e))
                })?;
                out.extend_from_slice(&ip.octets());
            }
            AddressType::Domain => {
                let len = self.target_host.len();
                if len == 0 || len > u8::MAX as usize {
                    return Err(HandshakeError::Malformed(format!(
                        "domain length out of range: {}",
                        len
                    )));
                }
                out.push(len as u8);
                out.extend_from_slice(self.target_host.as_bytes());
            }
        }

        out.extend_from_slice(&self.remainder);
        Ok(out)
    }
}
