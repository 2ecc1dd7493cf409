//! Tunnel Protocol Implementation
//! 
//! Decoding of the single-message handshake that opens every tunnel.

pub mod constants;
pub mod cursor;
pub mod decoder;
pub mod types;

pub use constants::*;
pub use cursor::ByteCursor;
pub use decoder::{decode, decode_unchecked, HandshakeDecoder};
pub use types::*;
