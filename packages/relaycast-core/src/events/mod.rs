//! Event system for observing a cast session.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - Event types for the streaming server and the playback session

mod emitter;

pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::services::SessionState;

/// Events related to the streaming server and its current video.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    /// A video finished its initial load and is now served on the video route.
    VideoInstalled {
        /// Source identifier of the installed video.
        #[serde(rename = "sourceId")]
        source_id: String,
        /// Total length in bytes.
        #[serde(rename = "totalLength")]
        total_length: u64,
        /// Content type reported by the resolver.
        mime: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A ranged request restarted the resolver at a new offset.
    Seeked {
        /// Source identifier of the video.
        #[serde(rename = "sourceId")]
        source_id: String,
        /// Requested start offset.
        start: u64,
        /// Bytes remaining from `start` to the end.
        remaining: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The server was torn down.
    ServerDestroyed {
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to the playback session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The session moved to a new state.
    StateChanged {
        /// The new state.
        state: SessionState,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Discovery accepted a renderer.
    DeviceReady {
        /// Device description URL.
        location: String,
        /// Advertised SSDP server string.
        server: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A load command was sent to the renderer.
    LoadSent {
        /// Source identifier being played.
        #[serde(rename = "sourceId")]
        source_id: String,
        /// URL the renderer was told to fetch.
        url: String,
        /// Content type announced to the renderer.
        #[serde(rename = "contentType")]
        content_type: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A playlist item failed to load and was skipped.
    ItemSkipped {
        /// Source identifier that failed.
        #[serde(rename = "sourceId")]
        source_id: String,
        /// Why it failed.
        reason: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The renderer reported a playback speed change.
    SpeedChanged {
        /// New transport play speed (e.g. "1").
        speed: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The playlist is exhausted and the server was destroyed.
    Ended {
        /// Items sent to the renderer.
        #[serde(rename = "itemsPlayed")]
        items_played: usize,
        /// Items skipped because they failed to load.
        #[serde(rename = "itemsSkipped")]
        items_skipped: usize,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_event_serializes_camel_case() {
        let event = SessionEvent::StateChanged {
            state: SessionState::Casting,
            timestamp: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stateChanged");
        assert_eq!(json["state"], "casting");
    }

    #[test]
    fn stream_event_renames_fields() {
        let event = StreamEvent::Seeked {
            source_id: "abc".to_string(),
            start: 100,
            remaining: 900,
            timestamp: 0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["sourceId"], "abc");
        assert_eq!(json["remaining"], 900);
    }
}
