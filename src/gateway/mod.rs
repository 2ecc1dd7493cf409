//! Gateway Module
//! 
//! HTTP front that accepts tunnel WebSocket upgrades and serves the
//! landing, health, metrics and share pages.

pub mod api;
pub mod handlers;
pub mod pages;
pub mod server;
pub mod share;
pub mod types;

pub use api::GatewayApi;
pub use server::GatewayServer;
pub use share::{encoded_share_link, share_link};
pub use types::*;
