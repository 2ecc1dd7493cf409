//! Tunnel Protocol Constants

// Handshake layout
pub const IDENTITY_LEN: usize = 16;
pub const MIN_HANDSHAKE_LEN: usize = 1 + IDENTITY_LEN + 1;

// Bytes between the options region and the port field (ignored command byte)
pub const RESERVED_AFTER_OPTIONS: usize = 1;

// Address Types
pub const ADDR_TYPE_IPV4: u8 = 0x01;
pub const ADDR_TYPE_DOMAIN: u8 = 0x02;
pub const ADDR_TYPE_IPV6: u8 = 0x03;

// Acknowledgement status byte
pub const ACK_STATUS_OK: u8 = 0x00;
