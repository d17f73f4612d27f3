//! Renderer discovery over SSDP.
//!
//! - [`ssdp`]: M-SEARCH transport and response parsing
//! - [`device`]: single-fire orchestration on top of a transport

pub mod device;
pub mod ssdp;
pub mod types;

pub use device::DeviceDiscovery;
pub use ssdp::{SsdpConfig, SsdpTransport, UdpSsdpTransport};
pub use types::{DiscoveredDevice, DiscoveryError, DiscoveryResult, SsdpResponse};
