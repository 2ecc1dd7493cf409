//! wsgate - Authenticated WebSocket-to-TCP tunnel gateway

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsgate::{
    config::ConfigManager, gateway::encoded_share_link, metrics::Metrics, Config, GatewayServer,
    ShutdownCoordinator,
};

/// CLI arguments for wsgate
#[derive(Parser, Debug)]
#[command(name = "wsgate")]
#[command(about = "wsgate - Authenticated WebSocket-to-TCP tunnel gateway")]
#[command(version)]
#[command(long_about = "
wsgate - Authenticated WebSocket-to-TCP tunnel gateway

Configuration priority (highest to lowest):
1. Command-line arguments
2. Environment variables
3. Configuration file
4. Built-in defaults

Environment variables:
  UUID                       - Client identity (32 hex characters, dashes allowed)
  PORT / SERVER_PORT         - Listen port
  WSGATE_BIND_ADDR           - Bind address (e.g., 0.0.0.0:3000)
  WSGATE_WS_PATH             - Tunnel WebSocket path (e.g., /vl)
  WSGATE_HANDSHAKE_TIMEOUT   - Wait for the first message (e.g., 10s)
  WSGATE_CONNECT_TIMEOUT     - Outbound connect limit (e.g., 10s; default 0s leaves it to the OS)
  WSGATE_BUFFER_SIZE         - Relay buffer size in bytes
  WSGATE_PUBLIC_HOST         - Host advertised in the share link
  WSGATE_SNI_HOST            - SNI / Host header advertised in the share link
  WSGATE_LOG_LEVEL           - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "wsgate.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "Bind address (e.g., 0.0.0.0:3000)")]
    pub bind: Option<String>,

    /// Port to bind to (overrides config file)
    #[arg(short, long, help = "Port to bind to")]
    pub port: Option<u16>,

    /// Client identity (overrides config file)
    #[arg(short, long, help = "Client identity UUID")]
    pub uuid: Option<String>,

    /// Tunnel WebSocket path (overrides config file)
    #[arg(long, help = "Tunnel WebSocket path (e.g., /vl)")]
    pub ws_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,

    /// Print the base64 share link and exit
    #[arg(long, help = "Print the base64 share link and exit")]
    pub print_link: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    let log_level = if args.verbose {
        Some("debug")
    } else {
        args.log_level.as_deref()
    };

    config.merge_with_cli_args(
        args.bind.as_deref(),
        args.port,
        args.uuid.as_deref(),
        args.ws_path.as_deref(),
        log_level,
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    init_tracing(&config);

    if args.print_link {
        println!("{}", encoded_share_link(&config)?);
        return Ok(());
    }

    if args.validate_config {
        info!("Configuration is valid");
        log_summary(&config);
        return Ok(());
    }

    info!("Starting wsgate v{}", env!("CARGO_PKG_VERSION"));
    log_summary(&config);

    let metrics = Arc::new(Metrics::new());
    let shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);

    let server = GatewayServer::bind(&config, metrics).await?;
    let shutdown_signal = shutdown_coordinator.signal();

    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server.serve(shutdown_signal).await {
            error!("Server error: {:#}", e);
        }
    });

    tokio::select! {
        result = shutdown_coordinator.listen_for_signals() => {
            if let Err(e) = result {
                error!("Error setting up signal handlers: {}", e);
                shutdown_coordinator.trigger();
            }
        }
        _ = &mut server_handle => {
            warn!("Server task exited before a shutdown signal");
            return Ok(());
        }
    }

    // Give the server its own drain window plus a little slack
    let limit = shutdown_coordinator.timeout() + std::time::Duration::from_secs(5);
    match tokio::time::timeout(limit, server_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) if !e.is_cancelled() => error!("Server task failed: {}", e),
        Ok(Err(_)) => {}
        Err(_) => warn!("Server did not stop within {:?}", limit),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn log_summary(config: &Config) {
    info!("Configuration summary:");
    info!("  Bind address: {}", config.server.bind_addr);
    info!("  Tunnel path: {}", config.server.ws_path);
    info!("  Handshake timeout: {:?}", config.server.handshake_timeout);
    info!("  Connect timeout: {:?}", config.server.connect_timeout);
    info!("  Buffer size: {} bytes", config.server.buffer_size);
    info!(
        "  Share page: {}",
        if config.share.enabled {
            config.share.path.as_str()
        } else {
            "disabled"
        }
    );
    info!(
        "  Metrics: {}",
        if config.monitoring.metrics_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
}

/// Initialize tracing/logging; `RUST_LOG` takes precedence over the configured level
fn init_tracing(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.monitoring.log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();
}
