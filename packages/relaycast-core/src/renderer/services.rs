//! UPnP service definitions used to drive a media renderer.

use serde::Serialize;

/// UPnP services the renderer client talks to.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UpnpService {
    /// Audio/Video transport control (load, play, pause, stop, status).
    AVTransport,
    /// Connection negotiation. Optional on most renderers.
    ConnectionManager,
}

impl UpnpService {
    /// Returns the UPnP service URN for SOAP requests.
    #[must_use]
    pub fn urn(&self) -> &'static str {
        match self {
            Self::AVTransport => "urn:schemas-upnp-org:service:AVTransport:1",
            Self::ConnectionManager => "urn:schemas-upnp-org:service:ConnectionManager:1",
        }
    }

    /// Returns a human-readable name for this service.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AVTransport => "AVTransport",
            Self::ConnectionManager => "ConnectionManager",
        }
    }

    /// Matches a `serviceType` from a device description, ignoring the version suffix.
    pub fn matches(&self, service_type: &str) -> bool {
        let urn = self.urn();
        let unversioned = &urn[..urn.rfind(':').unwrap_or(urn.len())];
        service_type
            .strip_prefix(unversioned)
            .is_some_and(|rest| rest.starts_with(':'))
    }
}
