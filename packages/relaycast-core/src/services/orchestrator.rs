//! Playback session state machine.
//!
//! Responsibilities:
//! - Wait for discovery to settle on a renderer
//! - Load each playlist item into the streaming server and cast it
//! - Advance on `stopped`, destroying the server when the queue runs dry
//!
//! Renderer events are consumed one at a time from a channel, so a `stopped`
//! is fully handled (next load sent, or server destroyed) before the next
//! event is looked at.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use super::SessionState;
use crate::api::{LoadedVideo, StreamingServer};
use crate::discovery::DeviceDiscovery;
use crate::error::{CastError, CastResult};
use crate::events::{EventEmitter, SessionEvent};
use crate::renderer::{
    LoadOptions, MediaKind, MediaMetadata, RendererConnector, RendererControl, RendererEvent,
};
use crate::state::Config;
use crate::utils::now_millis;

/// Totals reported when a session ends normally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    /// Items a load command was sent for.
    pub items_played: usize,
    /// Items skipped because their video failed to load.
    pub items_skipped: usize,
}

/// Drives one cast session from discovery to the end of the playlist.
pub struct PlaybackOrchestrator {
    server: Arc<StreamingServer>,
    connector: Arc<dyn RendererConnector>,
    emitter: Arc<dyn EventEmitter>,
    discovery_timeout: Option<Duration>,
    renderer_timeout: Duration,
    skip_failed_items: bool,
    state: RwLock<SessionState>,
}

impl PlaybackOrchestrator {
    pub fn new(
        server: Arc<StreamingServer>,
        connector: Arc<dyn RendererConnector>,
        emitter: Arc<dyn EventEmitter>,
        config: &Config,
    ) -> Self {
        Self {
            server,
            connector,
            emitter,
            discovery_timeout: config.discovery_timeout(),
            renderer_timeout: config.renderer_timeout(),
            skip_failed_items: config.skip_failed_items,
            state: RwLock::new(SessionState::Discovering),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Runs the session for `source` (a video or a playlist reference).
    ///
    /// Returns once the playlist is exhausted and the server destroyed. Any
    /// error that aborts the session also destroys the server.
    pub async fn run(
        &self,
        discovery: &DeviceDiscovery,
        source: &str,
    ) -> CastResult<SessionOutcome> {
        let mut renderer = None;
        let result = self.drive(discovery, source, &mut renderer).await;

        if let Some(renderer) = renderer {
            renderer.close();
        }
        if let Err(e) = &result {
            log::error!("[Session] Session aborted: {}", e);
            self.server.destroy();
        }
        result
    }

    async fn drive(
        &self,
        discovery: &DeviceDiscovery,
        source: &str,
        renderer_slot: &mut Option<Arc<dyn RendererControl>>,
    ) -> CastResult<SessionOutcome> {
        let mut outcome = SessionOutcome::default();

        self.set_state(SessionState::Discovering);
        let device = discovery.wait_ready(self.discovery_timeout).await?;
        log::info!(
            "[Session] Renderer ready: {} ({})",
            device.location,
            device.server
        );
        self.emitter.emit_session(SessionEvent::DeviceReady {
            location: device.location.clone(),
            server: device.server.clone(),
            timestamp: now_millis(),
        });

        self.set_state(SessionState::Loading);
        let loaded = self
            .load_until_ready(source, self.server.play(source).await, &mut outcome)
            .await?;

        let renderer = self.connect(&device.location).await?;
        *renderer_slot = Some(Arc::clone(&renderer));
        let mut events = renderer.subscribe();

        self.cast(renderer.as_ref(), &loaded, &mut outcome).await?;

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("[Session] Missed {} renderer event(s)", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return Err(CastError::RendererDisconnected),
            };

            log::debug!("[Session] Renderer event: {}", event);
            match event {
                RendererEvent::Loading => self.set_state(SessionState::Buffering),
                RendererEvent::Playing => self.set_state(SessionState::Playing),
                RendererEvent::Paused => self.set_state(SessionState::Paused),
                RendererEvent::SpeedChanged(speed) => {
                    log::info!("[Session] Speed changed to {}", speed);
                    self.emitter.emit_session(SessionEvent::SpeedChanged {
                        speed,
                        timestamp: now_millis(),
                    });
                }
                RendererEvent::Stopped => {
                    self.set_state(SessionState::Stopped);
                    let Some(next) = self.server.next_queued() else {
                        self.finish(&outcome);
                        return Ok(outcome);
                    };

                    self.set_state(SessionState::Loading);
                    let first = self.server.play_item(&next).await;
                    let loaded = self.load_until_ready(&next, first, &mut outcome).await?;
                    self.cast(renderer.as_ref(), &loaded, &mut outcome).await?;
                }
            }
        }
    }

    /// Takes the result of playing `source` and, while it is an item-scoped
    /// failure and skipping is enabled, moves on to the next queued item.
    async fn load_until_ready(
        &self,
        source: &str,
        mut attempt: CastResult<LoadedVideo>,
        outcome: &mut SessionOutcome,
    ) -> CastResult<LoadedVideo> {
        let mut current = source.to_string();
        loop {
            let err = match attempt {
                Ok(loaded) => return Ok(loaded),
                Err(e) => e,
            };
            if !self.skip_failed_items || !err.is_item_scoped() {
                return Err(err);
            }
            let Some(next) = self.server.next_queued() else {
                return Err(err);
            };

            log::warn!("[Session] Skipping {}: {}", current, err);
            outcome.items_skipped += 1;
            self.emitter.emit_session(SessionEvent::ItemSkipped {
                source_id: current.clone(),
                reason: err.to_string(),
                timestamp: now_millis(),
            });

            attempt = self.server.play_item(&next).await;
            current = next;
        }
    }

    async fn connect(&self, location: &str) -> CastResult<Arc<dyn RendererControl>> {
        match tokio::time::timeout(self.renderer_timeout, self.connector.connect(location)).await {
            Ok(Ok(renderer)) => {
                log::info!("[Session] Connected to {}", renderer.name());
                Ok(renderer)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(CastError::RendererTimeout(format!(
                "connecting to {} took longer than {:?}",
                location, self.renderer_timeout
            ))),
        }
    }

    /// Sends the load command for `loaded` with autoplay and a video type tag.
    async fn cast(
        &self,
        renderer: &dyn RendererControl,
        loaded: &LoadedVideo,
        outcome: &mut SessionOutcome,
    ) -> CastResult<()> {
        self.set_state(SessionState::Casting);

        let url = self.server.public_url();
        let options = LoadOptions {
            autoplay: true,
            content_type: loaded.mime.clone(),
            metadata: MediaMetadata {
                title: loaded.metadata.title.clone(),
                creator: loaded.metadata.creator.clone(),
                kind: MediaKind::Video,
            },
        };

        match tokio::time::timeout(self.renderer_timeout, renderer.load(url, &options)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(CastError::RendererCommandFailed(e.to_string())),
            Err(_) => {
                return Err(CastError::RendererTimeout(format!(
                    "load of {} took longer than {:?}",
                    loaded.source_id, self.renderer_timeout
                )))
            }
        }

        outcome.items_played += 1;
        log::info!(
            "[Session] Casting {} to {} as {}",
            loaded.source_id,
            renderer.name(),
            loaded.mime
        );
        self.emitter.emit_session(SessionEvent::LoadSent {
            source_id: loaded.source_id.clone(),
            url: url.to_string(),
            content_type: loaded.mime.clone(),
            timestamp: now_millis(),
        });
        Ok(())
    }

    fn finish(&self, outcome: &SessionOutcome) {
        log::info!(
            "[Session] Playlist finished ({} played, {} skipped)",
            outcome.items_played,
            outcome.items_skipped
        );
        self.server.destroy();
        self.set_state(SessionState::Ended);
        self.emitter.emit_session(SessionEvent::Ended {
            items_played: outcome.items_played,
            items_skipped: outcome.items_skipped,
            timestamp: now_millis(),
        });
    }

    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous == state {
            return;
        }
        log::info!("[Session] {} -> {}", previous, state);
        self.emitter.emit_session(SessionEvent::StateChanged {
            state,
            timestamp: now_millis(),
        });
    }
}
