//! Media renderer control.
//!
//! The playback session drives a renderer only through [`RendererControl`]
//! and obtains one through a [`RendererConnector`]. [`upnp`] provides the
//! UPnP AVTransport implementation used against real devices.

pub mod description;
pub mod didl;
mod retry;
pub mod services;
pub mod soap;
pub mod transport;
pub mod upnp;
mod utils;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

pub use services::UpnpService;
pub use soap::{SoapError, SoapResult};
pub use upnp::{UpnpConnector, UpnpRenderer};

/// Status changes reported by a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererEvent {
    /// The renderer is fetching or buffering media.
    Loading,
    /// Playback is running.
    Playing,
    /// Playback is paused.
    Paused,
    /// Playback stopped (media ended or was stopped on the device).
    Stopped,
    /// The transport play speed changed.
    SpeedChanged(String),
}

impl std::fmt::Display for RendererEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
            Self::SpeedChanged(speed) => write!(f, "speedChanged({})", speed),
        }
    }
}

/// Kind tag carried in load metadata; selects the DIDL-Lite `upnp:class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Video,
    Audio,
    Image,
}

impl MediaKind {
    /// UPnP object class for this kind.
    #[must_use]
    pub fn upnp_class(&self) -> &'static str {
        match self {
            Self::Video => "object.item.videoItem.movie",
            Self::Audio => "object.item.audioItem.musicTrack",
            Self::Image => "object.item.imageItem.photo",
        }
    }
}

/// Display metadata sent with a load command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaMetadata {
    pub title: Option<String>,
    pub creator: Option<String>,
    #[serde(rename = "type")]
    pub kind: MediaKind,
}

/// Options for [`RendererControl::load`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOptions {
    /// Start playback as soon as the media is set.
    pub autoplay: bool,
    /// Content type announced to the renderer.
    pub content_type: String,
    pub metadata: MediaMetadata,
}

/// Errors raised while connecting to or commanding a renderer.
#[derive(Debug, Error)]
pub enum RendererError {
    /// The device description could not be fetched or parsed.
    #[error("device description failed: {0}")]
    Description(String),

    /// The device does not expose a required service.
    #[error("renderer has no {0} service")]
    MissingService(&'static str),

    /// A URL in the description could not be resolved.
    #[error("invalid renderer URL: {0}")]
    InvalidUrl(String),

    /// A SOAP command failed.
    #[error(transparent)]
    Soap(#[from] SoapError),
}

/// Convenient Result alias for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;

/// Command and status contract of a connected renderer.
#[async_trait]
pub trait RendererControl: Send + Sync {
    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Sets `url` as the current media and starts it when `options.autoplay`.
    async fn load(&self, url: &str, options: &LoadOptions) -> RendererResult<()>;

    /// Resumes playback.
    async fn play(&self) -> RendererResult<()>;

    /// Pauses playback.
    async fn pause(&self) -> RendererResult<()>;

    /// Stops playback.
    async fn stop(&self) -> RendererResult<()>;

    /// Subscribes to status events. The channel closes when the renderer
    /// connection ends.
    fn subscribe(&self) -> broadcast::Receiver<RendererEvent>;

    /// Stops status monitoring. Safe to call repeatedly.
    fn close(&self);
}

/// Creates renderer connections from discovered description URLs.
#[async_trait]
pub trait RendererConnector: Send + Sync {
    /// Connects to the renderer described at `location`.
    async fn connect(&self, location: &str) -> RendererResult<Arc<dyn RendererControl>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_options_serialize_like_the_renderer_contract() {
        let options = LoadOptions {
            autoplay: true,
            content_type: "video/mp4".to_string(),
            metadata: MediaMetadata {
                title: Some("Clip".to_string()),
                creator: None,
                kind: MediaKind::Video,
            },
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["autoplay"], true);
        assert_eq!(json["contentType"], "video/mp4");
        assert_eq!(json["metadata"]["type"], "video");
        assert_eq!(json["metadata"]["title"], "Clip");
    }

    #[test]
    fn soap_errors_stay_transparent() {
        let err = RendererError::from(SoapError::Fault("UPnPError (701)".into()));
        assert_eq!(err.to_string(), "SOAP fault: UPnPError (701)");
    }
}
