//! Application services layer.
//!
//! This module contains the session logic that drives discovery, the
//! streaming server and the renderer together.

pub mod orchestrator;

pub use orchestrator::{PlaybackOrchestrator, SessionOutcome};

use serde::Serialize;

/// States of a cast session.
///
/// `Buffering`, `Playing` and `Paused` mirror renderer status and have no
/// effect on the session; `Stopped` advances the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Waiting for a renderer to answer discovery.
    Discovering,
    /// Resolving and buffering the next video.
    Loading,
    /// Sending the load command to the renderer.
    Casting,
    Buffering,
    Playing,
    Paused,
    /// The renderer stopped; the next item is about to load.
    Stopped,
    /// The playlist is exhausted and the server is gone.
    Ended,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Discovering => "discovering",
            Self::Loading => "loading",
            Self::Casting => "casting",
            Self::Buffering => "buffering",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Ended => "ended",
        };
        f.write_str(name)
    }
}
