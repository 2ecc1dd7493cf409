//! Connection Management Module
//! 
//! Handles upgraded tunnel sockets from handshake to teardown.

pub mod manager;

pub use manager::{ConnectionManager, ManagerStats};
