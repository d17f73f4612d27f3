//! Shared types for renderer discovery.

use serde::Serialize;
use thiserror::Error;

/// Discovery method identifier, used in log prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryMethod {
    /// SSDP multicast to 239.255.255.250:1900
    SsdpMulticast,
    /// SSDP broadcast (directed per-interface + limited 255.255.255.255)
    SsdpBroadcast,
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SsdpMulticast => write!(f, "SSDP multicast"),
            Self::SsdpBroadcast => write!(f, "SSDP broadcast"),
        }
    }
}

/// Errors that can occur during discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Failed to bind UDP socket for discovery.
    #[error("failed to bind UDP socket: {0}")]
    SocketBind(#[source] std::io::Error),

    /// Failed to send an SSDP search on every socket.
    #[error("failed to send SSDP search: {0}")]
    SendSearch(#[source] std::io::Error),

    /// No usable network interfaces found.
    #[error("no usable network interfaces found")]
    NoInterfaces,

    /// The transport was closed.
    #[error("discovery transport closed")]
    Closed,
}

/// Convenient Result alias for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// One parsed SSDP search response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpResponse {
    /// Address the response came from.
    pub ip: String,
    /// `SERVER` header (empty if absent).
    pub server: String,
    /// `LOCATION` header: the device description URL.
    pub location: String,
    /// `USN` header, if present.
    pub usn: Option<String>,
    /// `ST` header, if present.
    pub st: Option<String>,
}

/// The renderer accepted by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    /// Device description URL.
    pub location: String,
    /// Advertised server string that matched the label.
    pub server: String,
    /// Address the response came from.
    pub ip: String,
    /// Unique service name, if advertised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usn: Option<String>,
}

impl From<SsdpResponse> for DiscoveredDevice {
    fn from(response: SsdpResponse) -> Self {
        Self {
            location: response.location,
            server: response.server,
            ip: response.ip,
            usn: response.usn,
        }
    }
}

/// Virtual interface prefixes to filter out during discovery.
pub const VIRTUAL_INTERFACE_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vbox", "tun", "tap",
];

/// Checks if an interface name belongs to a virtual/container interface.
pub fn is_virtual_interface(name: &str) -> bool {
    let name_lower = name.to_lowercase();
    VIRTUAL_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| name_lower.starts_with(prefix))
}
