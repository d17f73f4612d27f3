//! Where the renderer reaches us.
//!
//! [`NetworkContext`] pairs the advertised IP with the port the streaming
//! server actually bound. The IP is settled once at startup, either from
//! `--advertise-ip` or through an [`IpDetector`].

use std::net::{IpAddr, SocketAddr};
#[cfg(test)]
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::RwLock;

/// Advertised address of the streaming server, shared by the server and the session.
#[derive(Debug, Clone)]
pub struct NetworkContext {
    advertise_ip: IpAddr,
    port: Arc<RwLock<u16>>,
}

impl NetworkContext {
    /// Uses `advertise_ip` as given. `port` is a placeholder until the server binds.
    #[must_use]
    pub fn explicit(port: u16, advertise_ip: IpAddr) -> Self {
        Self {
            advertise_ip,
            port: Arc::new(RwLock::new(port)),
        }
    }

    /// Asks `detector` for the address once and keeps it for the session.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Detection`] when no usable address is found.
    pub fn auto_detect(port: u16, detector: &dyn IpDetector) -> Result<Self, NetworkError> {
        let ip = detector.detect()?;
        log::debug!("[Network] Detected advertise IP {}", ip);
        Ok(Self::explicit(port, ip))
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::explicit(0, IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    #[must_use]
    pub fn advertise_ip(&self) -> IpAddr {
        self.advertise_ip
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        *self.port.read()
    }

    /// Records the port the server actually bound to.
    pub fn set_port(&self, port: u16) {
        *self.port.write() = port;
    }

    /// `http://ip:port`, with IPv6 addresses bracketed.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", SocketAddr::new(self.advertise_ip, self.port()))
    }

    /// URL the renderer is told to fetch `path` from.
    #[must_use]
    pub fn video_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

/// Source of the address to advertise when none is configured.
pub trait IpDetector: Send + Sync {
    fn detect(&self) -> Result<IpAddr, NetworkError>;
}

/// Picks the address of the interface holding the default route.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalIpDetector;

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<IpAddr, NetworkError> {
        local_ip_address::local_ip().map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to detect local IP: {0}")]
    Detection(String),
}
