//! AVTransport state tracking.
//!
//! The renderer is polled with `GetTransportInfo`; [`TransportTracker`] turns
//! the resulting snapshots into [`RendererEvent`]s, emitting only changes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::utils::extract_xml_text;
use super::RendererEvent;

/// UPnP AVTransport transport states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportState {
    #[serde(rename = "PLAYING")]
    Playing,
    #[serde(rename = "PAUSED_PLAYBACK")]
    PausedPlayback,
    #[serde(rename = "STOPPED")]
    Stopped,
    #[serde(rename = "TRANSITIONING")]
    Transitioning,
    #[serde(rename = "NO_MEDIA_PRESENT")]
    NoMediaPresent,
}

impl FromStr for TransportState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PLAYING" => Ok(Self::Playing),
            "PAUSED_PLAYBACK" | "PAUSED_RECORDING" => Ok(Self::PausedPlayback),
            "STOPPED" => Ok(Self::Stopped),
            "TRANSITIONING" => Ok(Self::Transitioning),
            "NO_MEDIA_PRESENT" => Ok(Self::NoMediaPresent),
            other => Err(format!("unknown transport state {:?}", other)),
        }
    }
}

impl TransportState {
    /// The renderer event this state projects to.
    #[must_use]
    pub fn event(&self) -> RendererEvent {
        match self {
            Self::Transitioning => RendererEvent::Loading,
            Self::Playing => RendererEvent::Playing,
            Self::PausedPlayback => RendererEvent::Paused,
            Self::Stopped | Self::NoMediaPresent => RendererEvent::Stopped,
        }
    }
}

/// One `GetTransportInfo` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStatus {
    pub state: Option<TransportState>,
    pub speed: Option<String>,
}

/// Parses a `GetTransportInfo` response body.
pub fn parse_transport_info(xml: &str) -> TransportStatus {
    TransportStatus {
        state: extract_xml_text(xml, "CurrentTransportState").and_then(|s| s.parse().ok()),
        speed: extract_xml_text(xml, "CurrentSpeed")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    }
}

/// Turns transport snapshots into change events.
///
/// `Stopped` is reported only after some other state was seen since the last
/// [`reset`](Self::reset), so a renderer that idles in `STOPPED` while a new
/// URI is being set does not look like the end of playback.
#[derive(Debug, Default)]
pub struct TransportTracker {
    generation: u64,
    armed: bool,
    last_state: Option<TransportState>,
    last_speed: Option<String>,
}

impl TransportTracker {
    /// Creates a tracker that has seen nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current load generation. Snapshots taken under an older generation are dropped.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Starts a new load: disarms `Stopped` and forgets the last state.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.armed = false;
        self.last_state = None;
    }

    /// Applies a snapshot taken under `generation` and returns the events it causes.
    pub fn observe(&mut self, generation: u64, status: &TransportStatus) -> Vec<RendererEvent> {
        let mut events = Vec::new();
        if generation != self.generation {
            return events;
        }

        if let Some(state) = status.state {
            if self.last_state != Some(state) {
                self.last_state = Some(state);
                match state.event() {
                    RendererEvent::Stopped => {
                        if self.armed {
                            self.armed = false;
                            events.push(RendererEvent::Stopped);
                        }
                    }
                    event => {
                        self.armed = true;
                        events.push(event);
                    }
                }
            }
        }

        if let Some(speed) = &status.speed {
            if self.last_speed.as_ref() != Some(speed) {
                if self.last_speed.is_some() {
                    events.push(RendererEvent::SpeedChanged(speed.clone()));
                }
                self.last_speed = Some(speed.clone());
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(state: TransportState) -> TransportStatus {
        TransportStatus {
            state: Some(state),
            speed: Some("1".to_string()),
        }
    }

    #[test]
    fn parses_transport_info_response() {
        let xml = r#"<s:Envelope><s:Body><u:GetTransportInfoResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1"><CurrentTransportState>PLAYING</CurrentTransportState><CurrentTransportStatus>OK</CurrentTransportStatus><CurrentSpeed>1</CurrentSpeed></u:GetTransportInfoResponse></s:Body></s:Envelope>"#;
        let parsed = parse_transport_info(xml);
        assert_eq!(parsed.state, Some(TransportState::Playing));
        assert_eq!(parsed.speed.as_deref(), Some("1"));
    }

    #[test]
    fn no_media_present_projects_to_stopped() {
        let state: TransportState = "NO_MEDIA_PRESENT".parse().unwrap();
        assert_eq!(state.event(), RendererEvent::Stopped);
        assert!("BOGUS".parse::<TransportState>().is_err());
    }

    #[test]
    fn stopped_requires_prior_activity_since_reset() {
        let mut tracker = TransportTracker::new();
        tracker.reset();
        let generation = tracker.generation();

        assert!(tracker
            .observe(generation, &status(TransportState::Stopped))
            .is_empty());
        assert_eq!(
            tracker.observe(generation, &status(TransportState::Transitioning)),
            vec![RendererEvent::Loading]
        );
        assert_eq!(
            tracker.observe(generation, &status(TransportState::Playing)),
            vec![RendererEvent::Playing]
        );
        assert!(tracker
            .observe(generation, &status(TransportState::Playing))
            .is_empty());
        assert_eq!(
            tracker.observe(generation, &status(TransportState::Stopped)),
            vec![RendererEvent::Stopped]
        );
    }

    #[test]
    fn stale_generation_is_ignored() {
        let mut tracker = TransportTracker::new();
        let stale = tracker.generation();
        tracker.reset();
        assert!(tracker
            .observe(stale, &status(TransportState::Playing))
            .is_empty());
    }

    #[test]
    fn speed_changes_after_first_observation() {
        let mut tracker = TransportTracker::new();
        let generation = tracker.generation();
        tracker.observe(generation, &status(TransportState::Playing));

        let events = tracker.observe(
            generation,
            &TransportStatus {
                state: Some(TransportState::Playing),
                speed: Some("2".to_string()),
            },
        );
        assert_eq!(events, vec![RendererEvent::SpeedChanged("2".to_string())]);
    }
}
