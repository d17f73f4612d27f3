//! Relaycast Core - video relay library for DLNA renderers.
//!
//! This crate finds a UPnP/DLNA media renderer on the local network, serves a
//! video (or a playlist of videos) to it over HTTP with byte-range support,
//! and advances through the playlist as the renderer reports playback ending.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`video`]: Video sources (seek by restart) and the resolvers behind them
//! - [`api`]: The streaming server and its single video route
//! - [`discovery`]: SSDP renderer discovery that settles on one device
//! - [`renderer`]: Renderer control (UPnP AVTransport over SOAP)
//! - [`services`]: The playback session state machine
//! - [`events`]: Event system for observing a session
//! - [`context`]: Network configuration and URL building
//! - [`state`]: Configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The crate defines several traits to decouple the session logic from the
//! network and from external services:
//!
//! - [`VideoResolver`](video::VideoResolver) / [`PlaylistResolver`](video::PlaylistResolver):
//!   turning source identifiers into bytes
//! - [`SsdpTransport`](discovery::SsdpTransport): sending searches and receiving responses
//! - [`RendererControl`](renderer::RendererControl) / [`RendererConnector`](renderer::RendererConnector):
//!   commanding a renderer
//! - [`EventEmitter`](events::EventEmitter): emitting domain events
//! - [`IpDetector`](context::IpDetector): picking the address to advertise
//!
//! Each trait has a default implementation used by the `relaycast` binary.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod context;
pub mod discovery;
pub mod error;
pub mod events;
pub mod protocol_constants;
pub mod renderer;
pub mod services;
pub mod state;
pub mod utils;
pub mod video;

// Re-export commonly used types at the crate root
pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError};
pub use error::{CastError, CastResult, DiscoveryResult, ErrorCode, RendererResult, SoapResult};
pub use events::{
    EventEmitter, LoggingEventEmitter, NoopEventEmitter, SessionEvent, StreamEvent,
};
pub use state::{Config, VideoConfig};
pub use utils::now_millis;

// Re-export discovery types
pub use discovery::{DeviceDiscovery, DiscoveredDevice, SsdpConfig, SsdpTransport, UdpSsdpTransport};

// Re-export renderer types
pub use renderer::{
    LoadOptions, MediaKind, MediaMetadata, RendererConnector, RendererControl, RendererEvent,
    UpnpConnector, UpnpRenderer,
};

// Re-export video types
pub use video::{HttpPlaylistResolver, HttpVideoResolver, VideoMetadata, VideoSource};

// Re-export service types
pub use services::{PlaybackOrchestrator, SessionOutcome, SessionState};

// Re-export API types
pub use api::{AppState, LoadedVideo, ServerError, StreamingServer};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_session, create_http_client, BootstrappedSession};
