//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external specifications (UPnP, DLNA, SSDP)
//! or by renderer interoperability, and changing them would break playback on
//! real devices.

// ─────────────────────────────────────────────────────────────────────────────
// DLNA
// ─────────────────────────────────────────────────────────────────────────────

/// DLNA transfer mode header name.
pub const DLNA_TRANSFER_MODE_HEADER: &str = "transferMode.dlna.org";

/// DLNA transfer mode: real-time playback rather than download-first.
pub const DLNA_TRANSFER_MODE: &str = "Streaming";

/// DLNA content features header name.
pub const DLNA_CONTENT_FEATURES_HEADER: &str = "contentFeatures.dlna.org";

/// DLNA content features advertised for the relayed video.
///
/// OP=01 announces byte-range seeking and CI=0 untranscoded content. The
/// embedded space in the flags field is what the target renderers have been
/// verified against; keep it byte for byte.
pub const DLNA_CONTENT_FEATURES: &str =
    "DLNA.ORG_OP=01;DLNA.ORG_CI=0;DLNA.ORG_FLAGS=017000 00000000000000000000000000";

// ─────────────────────────────────────────────────────────────────────────────
// SSDP / UPnP
// ─────────────────────────────────────────────────────────────────────────────

/// SSDP search target for UPnP media renderers.
pub const MEDIA_RENDERER_SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";

/// Timeout for SOAP HTTP requests (seconds).
///
/// 10 seconds is reasonable for LAN operations.
pub const SOAP_TIMEOUT_SECS: u64 = 10;

/// Timeout for fetching a UPnP device description (seconds).
pub const DESCRIPTION_TIMEOUT_SECS: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Streaming server
// ─────────────────────────────────────────────────────────────────────────────

/// Default port for the video relay.
pub const DEFAULT_PORT: u16 = 9999;

/// Default route the renderer fetches the current video from.
pub const DEFAULT_VIDEO_PATH: &str = "/video.mp4";

/// Content type used when the resolver does not report one.
pub const FALLBACK_MIME: &str = "video/mp4";

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in protocol data (DIDL-Lite metadata, User-Agent).
pub const APP_NAME: &str = "relaycast";
