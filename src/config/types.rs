//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub share: ShareConfig,
    pub monitoring: MonitoringConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Path on which tunnel WebSocket upgrades are accepted
    pub ws_path: String,
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
    /// Per-attempt outbound connect limit; zero (the default) leaves it to the OS
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    pub buffer_size: usize,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Shared secret configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub uuid: String,
}

/// Share page configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShareConfig {
    pub enabled: bool,
    pub path: String,
    /// Host clients dial (usually a CDN front)
    pub public_host: String,
    /// TLS server name and HTTP Host header clients present
    pub sni_host: String,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            ws_path: "/vl".to_string(),
            handshake_timeout: Duration::from_secs(10),
            connect_timeout: Duration::ZERO,
            buffer_size: 16 * 1024,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            uuid: "feefeb96-bfcf-4a9b-aac0-6aac771c1b98".to_string(),
        }
    }
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/x".to_string(),
            public_host: "1.seaw.cf".to_string(),
            sni_host: "deepnote.seav.eu.org".to_string(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}
