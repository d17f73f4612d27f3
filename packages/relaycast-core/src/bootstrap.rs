//! Session bootstrap and dependency wiring.
//!
//! This module is the composition root: the one place where the streaming
//! server, discovery, the renderer connector and the orchestrator are
//! instantiated and wired together. Front ends call [`bootstrap_session`] and
//! then [`BootstrappedSession::run`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::api::StreamingServer;
use crate::context::NetworkContext;
use crate::discovery::{DeviceDiscovery, SsdpConfig, UdpSsdpTransport};
use crate::error::{CastError, CastResult};
use crate::events::EventEmitter;
use crate::protocol_constants::APP_NAME;
use crate::renderer::UpnpConnector;
use crate::services::{PlaybackOrchestrator, SessionOutcome};
use crate::state::Config;
use crate::video::{HttpPlaylistResolver, HttpVideoResolver};

/// Connect timeout for every outgoing HTTP request.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Container for a wired session.
pub struct BootstrappedSession {
    /// HTTP endpoint the renderer pulls the video from.
    pub server: Arc<StreamingServer>,
    /// Running renderer discovery.
    pub discovery: Arc<DeviceDiscovery>,
    /// Session state machine.
    pub orchestrator: Arc<PlaybackOrchestrator>,
    /// Network configuration (port, advertised IP).
    pub network: NetworkContext,
}

impl BootstrappedSession {
    /// Runs the session for `source` until the playlist ends or it fails.
    pub async fn run(&self, source: &str) -> CastResult<SessionOutcome> {
        self.orchestrator.run(&self.discovery, source).await
    }

    /// Stops discovery and tears the server down.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.discovery.stop();
        if self.server.destroy() {
            self.server.closed().await;
        }
        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client used for resolving, playlists and SOAP.
///
/// Only connecting is bounded here: video bodies are long-lived, so SOAP and
/// description requests set their own per-request timeouts.
pub fn create_http_client() -> CastResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .user_agent(format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CastError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Bootstraps a cast session.
///
/// Wiring order:
///
/// 1. Shared HTTP client
/// 2. Streaming server (binds the listener, records the bound port in `network`)
/// 3. SSDP transport and discovery (starts searching immediately)
/// 4. Renderer connector and orchestrator
///
/// # Errors
///
/// Returns an error if the config is invalid, the listener cannot bind, or
/// no interface can carry SSDP.
pub async fn bootstrap_session(
    config: &Config,
    network: NetworkContext,
    emitter: Arc<dyn EventEmitter>,
) -> CastResult<BootstrappedSession> {
    config.validate().map_err(CastError::Configuration)?;

    let http_client = create_http_client()?;

    let server = Arc::new(
        StreamingServer::bind(
            config,
            network.clone(),
            Arc::new(HttpVideoResolver::new(http_client.clone())),
            Arc::new(HttpPlaylistResolver::new(http_client.clone())),
            Arc::clone(&emitter),
        )
        .await?,
    );

    let transport = UdpSsdpTransport::bind(&SsdpConfig {
        mx_value: config.ssdp_mx,
        multicast: config.discovery_ssdp_multicast,
        broadcast: config.discovery_ssdp_broadcast,
    })?;
    let discovery = Arc::new(DeviceDiscovery::start(
        config.device_label.clone(),
        config.search_target.clone(),
        config.discovery_poll_interval(),
        Arc::new(transport),
    ));

    let connector = Arc::new(UpnpConnector::new(
        http_client,
        config.status_poll_interval(),
    ));
    let orchestrator = Arc::new(PlaybackOrchestrator::new(
        Arc::clone(&server),
        connector,
        emitter,
        config,
    ));

    Ok(BootstrappedSession {
        server,
        discovery,
        orchestrator,
        network,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;

    #[test]
    fn http_client_builds() {
        let client = create_http_client().unwrap();
        assert!(client.get("http://example.com").build().is_ok());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_binding() {
        let config = Config {
            video_path: "video.mp4".to_string(),
            ..Config::default()
        };
        let result =
            bootstrap_session(&config, NetworkContext::for_test(), Arc::new(NoopEventEmitter))
                .await;
        assert!(matches!(result, Err(CastError::Configuration(_))));
    }
}
