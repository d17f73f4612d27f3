//! Core configuration types.
//!
//! [`Config`] holds every tunable of a cast session. All fields have defaults,
//! so a config file only needs to name what it changes.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{DEFAULT_PORT, DEFAULT_VIDEO_PATH, MEDIA_RENDERER_SEARCH_TARGET};

/// Configuration for video loading and buffering.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct VideoConfig {
    /// Format hint passed through to the resolver.
    pub format: Option<String>,

    /// Bytes that must be buffered before a load or seek is considered ready.
    pub watermark_bytes: usize,

    /// Deadline for a resolver to respond and reach the watermark (seconds).
    pub resolver_timeout_secs: u64,
}

impl VideoConfig {
    /// Creates a new `VideoConfig` with validated values.
    ///
    /// # Errors
    ///
    /// Returns an error if any value would cause runtime issues.
    pub fn new(
        format: Option<String>,
        watermark_bytes: usize,
        resolver_timeout_secs: u64,
    ) -> Result<Self, String> {
        let config = Self {
            format,
            watermark_bytes,
            resolver_timeout_secs,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.watermark_bytes == 0 {
            return Err("watermark_bytes must be >= 1".to_string());
        }
        if self.resolver_timeout_secs == 0 {
            return Err("resolver_timeout_secs must be >= 1".to_string());
        }
        Ok(())
    }

    /// Returns the resolver deadline as a `Duration`.
    #[must_use]
    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_secs(self.resolver_timeout_secs)
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            format: None,
            watermark_bytes: 512 * 1024,
            resolver_timeout_secs: 30,
        }
    }
}

/// Configuration for a relaycast session.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Server
    /// Address the HTTP server binds to.
    pub bind_ip: IpAddr,

    /// Port for the HTTP server (0 = auto-allocate).
    pub port: u16,

    /// Route the renderer fetches the current video from.
    pub video_path: String,

    // Discovery
    /// Substring the renderer's SSDP `SERVER` header must contain.
    pub device_label: String,

    /// SSDP search target.
    pub search_target: String,

    /// Interval between discovery queries (milliseconds).
    pub discovery_poll_interval_ms: u64,

    /// Give up discovery after this many seconds (unbounded when unset).
    pub discovery_timeout_secs: Option<u64>,

    /// SSDP MX value (max response delay in seconds).
    pub ssdp_mx: u64,

    /// Enable SSDP multicast discovery.
    pub discovery_ssdp_multicast: bool,

    /// Enable SSDP broadcast discovery.
    pub discovery_ssdp_broadcast: bool,

    // Video
    /// Video loading configuration.
    pub video: VideoConfig,

    // Renderer
    /// Deadline for connecting to the renderer and for each load command (seconds).
    pub renderer_timeout_secs: u64,

    /// Interval between renderer transport status polls (milliseconds).
    pub status_poll_interval_ms: u64,

    // Session
    /// Skip playlist items whose video fails to load instead of ending the session.
    pub skip_failed_items: bool,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !self.video_path.starts_with('/') {
            return Err(format!(
                "video_path must start with '/' (got {:?})",
                self.video_path
            ));
        }
        if self.device_label.is_empty() {
            return Err("device_label must not be empty".to_string());
        }
        if self.discovery_poll_interval_ms == 0 {
            return Err("discovery_poll_interval_ms must be >= 1".to_string());
        }
        if self.discovery_timeout_secs == Some(0) {
            return Err("discovery_timeout_secs must be >= 1 when set".to_string());
        }
        if !self.discovery_ssdp_multicast && !self.discovery_ssdp_broadcast {
            return Err("at least one SSDP discovery method must be enabled".to_string());
        }
        if self.renderer_timeout_secs == 0 {
            return Err("renderer_timeout_secs must be >= 1".to_string());
        }
        if self.status_poll_interval_ms == 0 {
            return Err("status_poll_interval_ms must be >= 1".to_string());
        }
        self.video.validate()
    }

    /// Interval between discovery queries.
    #[must_use]
    pub fn discovery_poll_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_poll_interval_ms)
    }

    /// Discovery deadline, if any.
    #[must_use]
    pub fn discovery_timeout(&self) -> Option<Duration> {
        self.discovery_timeout_secs.map(Duration::from_secs)
    }

    /// Renderer connect/command deadline.
    #[must_use]
    pub fn renderer_timeout(&self) -> Duration {
        Duration::from_secs(self.renderer_timeout_secs)
    }

    /// Interval between renderer status polls.
    #[must_use]
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            video_path: DEFAULT_VIDEO_PATH.to_string(),
            device_label: "Samsung".to_string(),
            search_target: MEDIA_RENDERER_SEARCH_TARGET.to_string(),
            discovery_poll_interval_ms: 5000,
            discovery_timeout_secs: None,
            ssdp_mx: 1,
            discovery_ssdp_multicast: true,
            discovery_ssdp_broadcast: false,
            video: VideoConfig::default(),
            renderer_timeout_secs: 15,
            status_poll_interval_ms: 1000,
            skip_failed_items: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_relative_video_path() {
        let config = Config {
            video_path: "video.mp4".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_watermark() {
        assert!(VideoConfig::new(None, 0, 30).is_err());
    }

    #[test]
    fn rejects_disabling_every_discovery_method() {
        let config = Config {
            discovery_ssdp_multicast: false,
            discovery_ssdp_broadcast: false,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"port": 0, "video": {"format": "22"}}"#)
            .unwrap();
        assert_eq!(config.port, 0);
        assert_eq!(config.video.format.as_deref(), Some("22"));
        assert_eq!(config.video.watermark_bytes, 512 * 1024);
        assert_eq!(config.device_label, "Samsung");
    }
}
