//! Caster configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use relaycast_core::protocol_constants::{DEFAULT_PORT, DEFAULT_VIDEO_PATH};
use serde::Deserialize;

/// Caster configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CasterConfig {
    /// Port to bind the HTTP server to.
    /// Override: `RELAYCAST_BIND_PORT`
    pub bind_port: u16,

    /// IP address to advertise to the renderer.
    /// If not specified, auto-detection will be attempted.
    /// Override: `RELAYCAST_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,

    /// Route the renderer fetches the video from.
    pub video_path: String,

    /// Substring the renderer's SSDP `SERVER` header must contain.
    /// Override: `RELAYCAST_DEVICE_LABEL`
    pub device_label: String,

    /// Seconds between discovery searches.
    pub discovery_interval: u64,

    /// Give up discovery after this many seconds (waits forever when unset).
    /// Override: `RELAYCAST_DISCOVERY_TIMEOUT`
    pub discovery_timeout: Option<u64>,

    /// Enable SSDP multicast discovery.
    pub discovery_ssdp_multicast: bool,

    /// Enable SSDP broadcast discovery.
    pub discovery_ssdp_broadcast: bool,

    /// Format hint passed to the resolver.
    /// Override: `RELAYCAST_FORMAT`
    pub format: Option<String>,

    /// Bytes to buffer before a load or seek is served.
    pub watermark_bytes: usize,

    /// Seconds a resolver may take to reach the watermark.
    pub resolver_timeout: u64,

    /// Seconds the renderer may take to connect or accept a command.
    pub renderer_timeout: u64,

    /// Skip playlist items that fail to load.
    pub skip_failed_items: bool,
}

impl Default for CasterConfig {
    fn default() -> Self {
        let core = relaycast_core::Config::default();
        Self {
            bind_port: DEFAULT_PORT,
            advertise_ip: None,
            video_path: DEFAULT_VIDEO_PATH.to_string(),
            device_label: core.device_label,
            discovery_interval: core.discovery_poll_interval_ms / 1000,
            discovery_timeout: core.discovery_timeout_secs,
            discovery_ssdp_multicast: core.discovery_ssdp_multicast,
            discovery_ssdp_broadcast: core.discovery_ssdp_broadcast,
            format: core.video.format,
            watermark_bytes: core.video.watermark_bytes,
            resolver_timeout: core.video.resolver_timeout_secs,
            renderer_timeout: core.renderer_timeout_secs,
            skip_failed_items: core.skip_failed_items,
        }
    }
}

impl CasterConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("RELAYCAST_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = port;
        }

        if let Some(ip) = lookup("RELAYCAST_ADVERTISE_IP").and_then(|v| v.parse().ok()) {
            self.advertise_ip = Some(ip);
        }

        if let Some(label) = lookup("RELAYCAST_DEVICE_LABEL").filter(|v| !v.is_empty()) {
            self.device_label = label;
        }

        if let Some(timeout) = lookup("RELAYCAST_DISCOVERY_TIMEOUT").and_then(|v| v.parse().ok())
        {
            self.discovery_timeout = Some(timeout);
        }

        if let Some(format) = lookup("RELAYCAST_FORMAT").filter(|v| !v.is_empty()) {
            self.format = Some(format);
        }
    }

    /// Converts to relaycast-core's Config type.
    pub fn to_core_config(&self) -> relaycast_core::Config {
        let defaults = relaycast_core::Config::default();
        relaycast_core::Config {
            port: self.bind_port,
            video_path: self.video_path.clone(),
            device_label: self.device_label.clone(),
            discovery_poll_interval_ms: self.discovery_interval.saturating_mul(1000),
            discovery_timeout_secs: self.discovery_timeout,
            discovery_ssdp_multicast: self.discovery_ssdp_multicast,
            discovery_ssdp_broadcast: self.discovery_ssdp_broadcast,
            video: relaycast_core::VideoConfig {
                format: self.format.clone(),
                watermark_bytes: self.watermark_bytes,
                resolver_timeout_secs: self.resolver_timeout,
            },
            renderer_timeout_secs: self.renderer_timeout,
            skip_failed_items: self.skip_failed_items,
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_match_core_defaults() {
        let core = CasterConfig::default().to_core_config();
        assert_eq!(core.port, 9999);
        assert_eq!(core.video_path, "/video.mp4");
        assert_eq!(core.device_label, "Samsung");
        assert_eq!(core.discovery_poll_interval_ms, 5000);
        assert!(core.validate().is_ok());
    }

    #[test]
    fn yaml_file_overrides_selected_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "bind_port: 8100\ndevice_label: \"[TV] Living Room\"\ndiscovery_timeout: 30\nskip_failed_items: false"
        )
        .unwrap();

        let config: CasterConfig =
            serde_yaml::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        let core = config.to_core_config();

        assert_eq!(core.port, 8100);
        assert_eq!(core.device_label, "[TV] Living Room");
        assert_eq!(core.discovery_timeout_secs, Some(30));
        assert!(!core.skip_failed_items);
        assert_eq!(core.video.watermark_bytes, 512 * 1024);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(CasterConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_port: [not, a, port]").unwrap();
        assert!(CasterConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn overrides_ignore_unparseable_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RELAYCAST_BIND_PORT", "not-a-port"),
            ("RELAYCAST_ADVERTISE_IP", "192.168.1.50"),
            ("RELAYCAST_DEVICE_LABEL", "Bravia"),
            ("RELAYCAST_FORMAT", ""),
        ]);
        let mut config = CasterConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.bind_port, 9999);
        assert_eq!(config.advertise_ip, Some("192.168.1.50".parse().unwrap()));
        assert_eq!(config.device_label, "Bravia");
        assert_eq!(config.format, None);
    }
}
