//! Configuration Manager

use super::Config;
use crate::protocol::Identity;
use crate::Result;
use anyhow::{Context, bail};
use std::net::SocketAddr;
use std::path::Path;

/// Paths served by the gateway itself that tunnel and share paths must avoid
pub const RESERVED_PATHS: [&str; 3] = ["/", "/health", "/metrics"];

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file, then let the environment override it
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let mut config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            Self::apply_env(&mut config, |key| std::env::var(key).ok())?;

            config.validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            Self::load_from_env()
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load defaults overridden by the given variable lookup
    pub fn load_with<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        Self::apply_env(&mut config, lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(config: &mut Config, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uuid) = lookup("UUID") {
            config.identity.uuid = uuid;
        }

        if let Some(bind_addr) = lookup("WSGATE_BIND_ADDR") {
            config.server.bind_addr = bind_addr.parse::<SocketAddr>()
                .with_context(|| format!("Invalid WSGATE_BIND_ADDR: {}", bind_addr))?;
        }

        // PORT wins over SERVER_PORT, both only touch the port
        if let Some((key, port)) = lookup("PORT")
            .map(|p| ("PORT", p))
            .or_else(|| lookup("SERVER_PORT").map(|p| ("SERVER_PORT", p)))
        {
            let port = port.parse::<u16>()
                .with_context(|| format!("Invalid {}: {}", key, port))?;
            config.server.bind_addr.set_port(port);
        }

        if let Some(ws_path) = lookup("WSGATE_WS_PATH") {
            config.server.ws_path = ws_path;
        }

        if let Some(timeout) = lookup("WSGATE_HANDSHAKE_TIMEOUT") {
            config.server.handshake_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid WSGATE_HANDSHAKE_TIMEOUT: {}", timeout))?;
        }

        if let Some(timeout) = lookup("WSGATE_CONNECT_TIMEOUT") {
            config.server.connect_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid WSGATE_CONNECT_TIMEOUT: {}", timeout))?;
        }

        if let Some(buffer_size) = lookup("WSGATE_BUFFER_SIZE") {
            config.server.buffer_size = buffer_size.parse::<usize>()
                .with_context(|| format!("Invalid WSGATE_BUFFER_SIZE: {}", buffer_size))?;
        }

        if let Some(public_host) = lookup("WSGATE_PUBLIC_HOST") {
            config.share.public_host = public_host;
        }

        if let Some(sni_host) = lookup("WSGATE_SNI_HOST") {
            config.share.sni_host = sni_host;
        }

        if let Some(log_level) = lookup("WSGATE_LOG_LEVEL") {
            config.monitoring.log_level = log_level;
        }

        Ok(())
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.identity()
            .with_context(|| "Identity configuration validation failed")?;

        self.validate_share_config()
            .with_context(|| "Share configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    /// Parse the configured identity
    pub fn identity(&self) -> Result<Identity> {
        Identity::parse(&self.identity.uuid)
            .with_context(|| "identity.uuid is not a valid identity")
    }

    fn validate_server_config(&self) -> Result<()> {
        validate_route("server.ws_path", &self.server.ws_path)?;

        if self.server.handshake_timeout.is_zero() {
            bail!("handshake_timeout must be greater than 0");
        }

        if self.server.buffer_size < 1024 {
            bail!("buffer_size must be at least 1024 bytes");
        }

        if self.server.buffer_size > 1048576 {
            bail!("buffer_size cannot exceed 1MB");
        }

        Ok(())
    }

    fn validate_share_config(&self) -> Result<()> {
        if !self.share.enabled {
            return Ok(());
        }

        validate_route("share.path", &self.share.path)?;

        if self.share.path == self.server.ws_path {
            bail!("share.path must differ from server.ws_path");
        }

        if self.share.public_host.is_empty() {
            bail!("share.public_host cannot be empty");
        }

        if self.share.sni_host.is_empty() {
            bail!("share.sni_host cannot be empty");
        }

        Ok(())
    }

    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!("monitoring.log_level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        uuid: Option<&str>,
        ws_path: Option<&str>,
        log_level: Option<&str>,
    ) {
        if let Some(bind_str) = bind {
            if let Ok(addr) = bind_str.parse::<SocketAddr>() {
                self.server.bind_addr = addr;
                tracing::info!("CLI override: bind address set to {}", addr);
            } else {
                tracing::warn!("Invalid bind address provided: {}", bind_str);
            }
        }

        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(uuid) = uuid {
            self.identity.uuid = uuid.to_string();
            tracing::info!("CLI override: identity replaced");
        }

        if let Some(ws_path) = ws_path {
            self.server.ws_path = ws_path.to_string();
            tracing::info!("CLI override: tunnel path set to {}", ws_path);
        }

        if let Some(log_level) = log_level {
            self.monitoring.log_level = log_level.to_string();
        }
    }
}

fn validate_route(name: &str, path: &str) -> Result<()> {
    if !path.starts_with('/') || path.len() < 2 {
        bail!("{} must start with '/' and not be the root path", name);
    }
    if RESERVED_PATHS.contains(&path) {
        bail!("{} cannot use reserved path {}", name, path);
    }
    Ok(())
}
