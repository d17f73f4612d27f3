//! Relaycast - relay a remote video or playlist to a DLNA renderer.
//!
//! The binary discovers a renderer whose SSDP server string contains the
//! configured label, serves the video to it over HTTP, and plays a playlist
//! through to the end. It exits when the playlist ends, the session fails, or
//! a shutdown signal arrives.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relaycast_core::{bootstrap_session, LocalIpDetector, LoggingEventEmitter, NetworkContext};
use tokio::signal;

use crate::config::CasterConfig;

/// Relaycast - relay a remote video or playlist to a DLNA renderer.
#[derive(Parser, Debug)]
#[command(name = "relaycast")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video URL or playlist reference to play.
    source: String,

    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "RELAYCAST_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "RELAYCAST_BIND_PORT")]
    port: Option<u16>,

    /// Advertise IP address (overrides config file).
    #[arg(short = 'a', long, env = "RELAYCAST_ADVERTISE_IP")]
    advertise_ip: Option<std::net::IpAddr>,

    /// Renderer label to match against the SSDP server string.
    #[arg(short = 'd', long, env = "RELAYCAST_DEVICE_LABEL")]
    device: Option<String>,

    /// Format hint passed to the resolver.
    #[arg(short = 'f', long, env = "RELAYCAST_FORMAT")]
    format: Option<String>,

    /// Give up discovery after this many seconds.
    #[arg(long, value_name = "SECS", env = "RELAYCAST_DISCOVERY_TIMEOUT")]
    discovery_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Relaycast v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        CasterConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(ip) = args.advertise_ip {
        config.advertise_ip = Some(ip);
    }
    if let Some(device) = args.device {
        config.device_label = device;
    }
    if let Some(format) = args.format {
        config.format = Some(format);
    }
    if let Some(timeout) = args.discovery_timeout {
        config.discovery_timeout = Some(timeout);
    }

    // Resolve advertise IP: use explicit config, or fall back to auto-detection
    let network = if let Some(ip) = config.advertise_ip {
        log::info!(
            "Configuration: bind_port={}, advertise_ip={}, device={:?}",
            config.bind_port,
            ip,
            config.device_label
        );
        NetworkContext::explicit(config.bind_port, ip)
    } else {
        log::info!(
            "Configuration: bind_port={}, advertise_ip=auto, device={:?}",
            config.bind_port,
            config.device_label
        );
        NetworkContext::auto_detect(config.bind_port, &LocalIpDetector).context(
            "Failed to auto-detect local IP address. \
             Please specify --advertise-ip or set RELAYCAST_ADVERTISE_IP to the IP \
             address that the renderer can reach.",
        )?
    };

    let core_config = config.to_core_config();
    let session = bootstrap_session(&core_config, network, Arc::new(LoggingEventEmitter))
        .await
        .context("Failed to bootstrap session")?;

    log::info!("Serving on {}", session.server.public_url());

    tokio::select! {
        result = session.run(&args.source) => {
            let outcome = result.context("Cast session failed")?;
            log::info!(
                "Done: {} item(s) played, {} skipped",
                outcome.items_played,
                outcome.items_skipped
            );
        }
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
            session.shutdown().await;
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
///
/// A handler that fails to install never fires; the other one still does.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
