//! Data Relay Module
//! 
//! Splices an acknowledged tunnel WebSocket with its outbound TCP connection.

pub mod engine;
pub mod session;

pub use engine::{Direction, RelayEngine};
pub use session::{RelaySession, ConnectionStats};
