//! HTTP streaming server.
//!
//! [`StreamingServer`] owns the listening socket, the single current video and
//! the playlist queue. The route handler itself lives in [`http`] and only
//! reads the shared [`AppState`].

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::context::NetworkContext;
use crate::error::{CastError, CastResult};
use crate::events::{EventEmitter, StreamEvent};
use crate::state::{Config, VideoConfig};
use crate::utils::now_millis;
use crate::video::{
    is_playlist_reference, ByteRange, PlaylistResolver, ResolveOptions, VideoMetadata,
    VideoResolver, VideoSource,
};

pub mod http;

/// Errors that can occur when starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The bound socket could not report its address.
    #[error("Failed to read local address: {0}")]
    LocalAddr(#[from] std::io::Error),
}

impl From<ServerError> for CastError {
    fn from(err: ServerError) -> Self {
        Self::Network(err.to_string())
    }
}

/// Shared state for the video route.
#[derive(Clone)]
pub struct AppState {
    /// The video currently answering the route.
    current: Arc<RwLock<Option<Arc<VideoSource>>>>,
    /// Pending playlist items, front first.
    playlist: Arc<Mutex<VecDeque<String>>>,
    destroyed: Arc<AtomicBool>,
    pub video_resolver: Arc<dyn VideoResolver>,
    pub playlist_resolver: Arc<dyn PlaylistResolver>,
    pub video_config: Arc<VideoConfig>,
    pub emitter: Arc<dyn EventEmitter>,
}

impl AppState {
    /// Creates state with no current video and an empty playlist.
    pub fn new(
        video_resolver: Arc<dyn VideoResolver>,
        playlist_resolver: Arc<dyn PlaylistResolver>,
        video_config: VideoConfig,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            playlist: Arc::new(Mutex::new(VecDeque::new())),
            destroyed: Arc::new(AtomicBool::new(false)),
            video_resolver,
            playlist_resolver,
            video_config: Arc::new(video_config),
            emitter,
        }
    }

    /// The video currently eligible to be served.
    pub fn current_video(&self) -> Option<Arc<VideoSource>> {
        self.current.read().clone()
    }

    /// Returns true once the server has been torn down.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Installs `video` as current and returns the one it replaced.
    ///
    /// Refused (and `video` destroyed) once the server is destroyed.
    fn install(&self, video: Arc<VideoSource>) -> CastResult<Option<Arc<VideoSource>>> {
        let mut current = self.current.write();
        if self.is_destroyed() {
            video.destroy();
            return Err(CastError::ServerDestroyed);
        }
        Ok(current.replace(video))
    }
}

/// What the caller needs to command the renderer after a successful play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedVideo {
    /// Source identifier now being served.
    pub source_id: String,
    /// Identifier reported by the resolver.
    pub video_id: String,
    pub mime: String,
    pub metadata: VideoMetadata,
    pub total_length: u64,
}

/// HTTP endpoint serving one current video with byte-range support.
pub struct StreamingServer {
    state: AppState,
    public_url: String,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    closed: CancellationToken,
}

impl StreamingServer {
    /// Binds `config.bind_ip:config.port` and starts serving `config.video_path`.
    ///
    /// Port 0 picks a free port; the bound port is recorded in `network` and
    /// used for the public URL.
    pub async fn bind(
        config: &Config,
        network: NetworkContext,
        video_resolver: Arc<dyn VideoResolver>,
        playlist_resolver: Arc<dyn PlaylistResolver>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Result<Self, ServerError> {
        let addr = SocketAddr::new(config.bind_ip, config.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        network.set_port(local_addr.port());
        let public_url = network.video_url(&config.video_path);

        let state = AppState::new(
            video_resolver,
            playlist_resolver,
            config.video.clone(),
            emitter,
        );
        let app = http::create_router(state.clone(), &config.video_path);

        let shutdown = CancellationToken::new();
        let closed = CancellationToken::new();
        {
            let shutdown = shutdown.clone();
            let closed = closed.clone();
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown.cancelled_owned())
                    .await
                {
                    log::error!("[Stream] Server error: {}", e);
                }
                log::info!("[Stream] Listener on {} closed", local_addr);
                closed.cancel();
            });
        }

        log::info!(
            "[Stream] Listening on {}, serving {}",
            local_addr,
            public_url
        );

        Ok(Self {
            state,
            public_url,
            local_addr,
            shutdown,
            closed,
        })
    }

    /// Plays a source: a playlist reference is expanded first, its remaining
    /// items queued and its first item played.
    ///
    /// # Errors
    ///
    /// - [`CastError::EmptyPlaylist`] if the playlist has no items
    /// - [`CastError::ResolutionTimeout`] if playlist resolution or the first
    ///   load misses the resolver deadline
    /// - any error of [`play_item`](Self::play_item)
    pub async fn play(&self, source: &str) -> CastResult<LoadedVideo> {
        self.ensure_live()?;

        if !is_playlist_reference(source) {
            return self.play_item(source).await;
        }

        let timeout = self.state.video_config.resolver_timeout();
        let items = tokio::time::timeout(
            timeout,
            self.state.playlist_resolver.resolve_playlist(source),
        )
        .await
        .map_err(|_| CastError::ResolutionTimeout {
            source_id: source.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })??;

        log::info!("[Stream] Playlist loaded with {} items", items.len());

        let mut items = VecDeque::from(items);
        let first = items
            .pop_front()
            .ok_or_else(|| CastError::EmptyPlaylist(source.to_string()))?;
        *self.state.playlist.lock() = items;

        self.play_item(&first).await
    }

    /// Loads one source and makes it the current video.
    ///
    /// The previous video is destroyed only after the new one is installed,
    /// so a failed load leaves the old one serving.
    pub async fn play_item(&self, source_id: &str) -> CastResult<LoadedVideo> {
        self.ensure_live()?;

        let config = &self.state.video_config;
        let video = Arc::new(VideoSource::new(
            source_id,
            ResolveOptions {
                format: config.format.clone(),
                range: ByteRange::default(),
            },
            Arc::clone(&self.state.video_resolver),
            config.watermark_bytes,
            config.resolver_timeout(),
        ));

        let video_id = match video.load(None).await {
            Ok(id) => id,
            Err(e) => {
                video.destroy();
                log::warn!("[Stream] Failed to load {}: {}", source_id, e);
                return Err(e);
            }
        };

        let Some(details) = video.details().cloned() else {
            video.destroy();
            return Err(CastError::UnknownLength(source_id.to_string()));
        };

        if let Some(previous) = self.state.install(Arc::clone(&video))? {
            previous.destroy();
        }

        log::info!(
            "[Stream] Now serving {} ({}, {} bytes)",
            source_id,
            details.mime,
            details.total_length
        );
        self.state.emitter.emit_stream(StreamEvent::VideoInstalled {
            source_id: source_id.to_string(),
            total_length: details.total_length,
            mime: details.mime.clone(),
            timestamp: now_millis(),
        });

        Ok(LoadedVideo {
            source_id: source_id.to_string(),
            video_id,
            mime: details.mime,
            metadata: details.metadata,
            total_length: details.total_length,
        })
    }

    /// Pops the next queued playlist item.
    pub fn next_queued(&self) -> Option<String> {
        self.state.playlist.lock().pop_front()
    }

    /// Snapshot of the queued items, front first.
    pub fn queued(&self) -> Vec<String> {
        self.state.playlist.lock().iter().cloned().collect()
    }

    /// Appends a source to the playlist queue.
    pub fn enqueue(&self, source_id: impl Into<String>) {
        self.state.playlist.lock().push_back(source_id.into());
    }

    /// URL the renderer is told to fetch.
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The video currently being served.
    pub fn current_video(&self) -> Option<Arc<VideoSource>> {
        self.state.current_video()
    }

    /// Destroys the current video and closes the listener.
    ///
    /// Returns false if the server was already destroyed.
    pub fn destroy(&self) -> bool {
        if self.state.destroyed.swap(true, Ordering::SeqCst) {
            return false;
        }

        if let Some(video) = self.state.current.write().take() {
            video.destroy();
        }
        self.state.playlist.lock().clear();
        self.shutdown.cancel();

        log::info!("[Stream] Server destroyed");
        self.state.emitter.emit_stream(StreamEvent::ServerDestroyed {
            timestamp: now_millis(),
        });
        true
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.is_destroyed()
    }

    /// Waits until the listener has shut down.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    fn ensure_live(&self) -> CastResult<()> {
        if self.is_destroyed() {
            return Err(CastError::ServerDestroyed);
        }
        Ok(())
    }
}

impl Drop for StreamingServer {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NoopEventEmitter, SessionEvent};
    use crate::video::test_fixtures::{MemoryResolver, MemoryVideo, StaticPlaylist};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::AtomicUsize;

    pub(crate) fn test_config() -> Config {
        Config {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            video: VideoConfig {
                watermark_bytes: 128,
                ..VideoConfig::default()
            },
            ..Config::default()
        }
    }

    #[derive(Default)]
    struct DestroyCounter {
        destroyed: AtomicUsize,
        installed: AtomicUsize,
    }

    impl EventEmitter for DestroyCounter {
        fn emit_stream(&self, event: StreamEvent) {
            match event {
                StreamEvent::ServerDestroyed { .. } => {
                    self.destroyed.fetch_add(1, Ordering::SeqCst);
                }
                StreamEvent::VideoInstalled { .. } => {
                    self.installed.fetch_add(1, Ordering::SeqCst);
                }
                StreamEvent::Seeked { .. } => {}
            }
        }

        fn emit_session(&self, _event: SessionEvent) {}
    }

    async fn server_with(
        resolver: Arc<MemoryResolver>,
        playlist: Arc<StaticPlaylist>,
        emitter: Arc<dyn EventEmitter>,
    ) -> StreamingServer {
        StreamingServer::bind(
            &test_config(),
            NetworkContext::for_test(),
            resolver,
            playlist,
            emitter,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn public_url_uses_bound_port() {
        let server = server_with(
            MemoryResolver::new().arc(),
            StaticPlaylist::new(&[]),
            Arc::new(NoopEventEmitter),
        )
        .await;

        let port = server.local_addr().port();
        assert_ne!(port, 0);
        assert_eq!(
            server.public_url(),
            format!("http://127.0.0.1:{}/video.mp4", port)
        );
    }

    #[tokio::test]
    async fn play_returns_mime_and_metadata() {
        let resolver = MemoryResolver::new()
            .with_video("a", MemoryVideo::new(1000))
            .arc();
        let server =
            server_with(resolver, StaticPlaylist::new(&[]), Arc::new(NoopEventEmitter)).await;

        let loaded = server.play("a").await.unwrap();
        assert_eq!(loaded.mime, "video/mp4");
        assert_eq!(loaded.total_length, 1000);
        assert_eq!(loaded.metadata.title.as_deref(), Some("Test Video"));
        assert_eq!(loaded.metadata.creator.as_deref(), Some("Test Author"));
        assert!(server.queued().is_empty());
    }

    #[tokio::test]
    async fn playlist_queues_remaining_items() {
        let resolver = MemoryResolver::new()
            .with_video("a", MemoryVideo::new(300))
            .with_video("b", MemoryVideo::new(300))
            .with_video("c", MemoryVideo::new(300))
            .arc();
        let server = server_with(
            resolver.clone(),
            StaticPlaylist::new(&["a", "b", "c"]),
            Arc::new(NoopEventEmitter),
        )
        .await;

        let loaded = server.play("http://lists.local/playlist?id=1").await.unwrap();
        assert_eq!(loaded.source_id, "a");
        assert_eq!(server.queued(), vec!["b", "c"]);
        assert_eq!(server.next_queued().as_deref(), Some("b"));
        assert_eq!(server.queued(), vec!["c"]);
        assert_eq!(resolver.requested(), vec!["a"]);
    }

    #[tokio::test]
    async fn empty_playlist_is_typed() {
        let server = server_with(
            MemoryResolver::new().arc(),
            StaticPlaylist::new(&[]),
            Arc::new(NoopEventEmitter),
        )
        .await;

        let err = server.play("http://lists.local/playlist?id=2").await.unwrap_err();
        assert!(matches!(err, CastError::EmptyPlaylist(_)));
    }

    #[tokio::test]
    async fn second_play_replaces_and_destroys_first_video() {
        let mut held = MemoryVideo::new(1000);
        held.hold_open = true;
        let resolver = MemoryResolver::new()
            .with_video("a", held)
            .with_video("b", MemoryVideo::new(500))
            .arc();
        let server =
            server_with(resolver, StaticPlaylist::new(&[]), Arc::new(NoopEventEmitter)).await;

        server.play("a").await.unwrap();
        let first = server.current_video().unwrap();

        server.play("b").await.unwrap();
        assert!(first.is_destroyed());
        assert_eq!(server.current_video().unwrap().source_id(), "b");
    }

    #[tokio::test]
    async fn failed_play_keeps_previous_video() {
        let resolver = MemoryResolver::new()
            .with_video("a", MemoryVideo::new(1000))
            .arc();
        let server =
            server_with(resolver, StaticPlaylist::new(&[]), Arc::new(NoopEventEmitter)).await;

        server.play("a").await.unwrap();
        let err = server.play("missing").await.unwrap_err();
        assert!(matches!(err, CastError::Resolver(_)));

        let current = server.current_video().unwrap();
        assert_eq!(current.source_id(), "a");
        assert!(!current.is_destroyed());
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_closes_listener() {
        let emitter = Arc::new(DestroyCounter::default());
        let resolver = MemoryResolver::new()
            .with_video("a", MemoryVideo::new(1000))
            .arc();
        let server = server_with(resolver, StaticPlaylist::new(&[]), emitter.clone()).await;
        server.play("a").await.unwrap();
        let video = server.current_video().unwrap();

        assert!(server.destroy());
        assert!(!server.destroy());
        assert!(video.is_destroyed());
        assert!(server.current_video().is_none());
        assert_eq!(emitter.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.installed.load(Ordering::SeqCst), 1);

        tokio::time::timeout(std::time::Duration::from_secs(5), server.closed())
            .await
            .unwrap();
        assert!(tokio::net::TcpStream::connect(server.local_addr())
            .await
            .is_err());

        let err = server.play("a").await.unwrap_err();
        assert!(matches!(err, CastError::ServerDestroyed));
    }
}
