//! Centralized error types for the relaycast core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` so the video route never fails past its handler

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::context::NetworkError;
use crate::discovery::DiscoveryError;
use crate::renderer::soap::SoapError;
use crate::renderer::RendererError;
use crate::video::ResolverError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::SocketBind(_) => "socket_bind_failed",
            Self::SendSearch(_) => "ssdp_send_failed",
            Self::NoInterfaces => "no_network_interfaces",
            Self::Closed => "discovery_closed",
        }
    }
}

impl ErrorCode for SoapError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::HttpStatus(_, _) => "http_error_status",
            Self::Fault(_) => "soap_fault",
            Self::Parse => "soap_parse_error",
        }
    }
}

impl ErrorCode for RendererError {
    fn code(&self) -> &'static str {
        match self {
            Self::Description(_) => "device_description_failed",
            Self::MissingService(_) => "renderer_service_missing",
            Self::InvalidUrl(_) => "renderer_invalid_url",
            Self::Soap(e) => e.code(),
        }
    }
}

impl ErrorCode for ResolverError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "resolver_http_failed",
            Self::HttpStatus(_) => "resolver_http_status",
            Self::InvalidSource(_) => "invalid_source",
            Self::EmptyPlaylist(_) => "empty_playlist",
            Self::Stream(_) => "resolver_stream_failed",
        }
    }
}

/// Application-wide error type for relaycast.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum CastError {
    /// Renderer discovery failed (SSDP/network issues).
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// No renderer matching the label answered before the deadline.
    #[error("No renderer matching {0:?} was found")]
    DeviceNotFound(String),

    /// The video resolver rejected the source or failed mid-stream.
    #[error("Resolver error: {0}")]
    Resolver(String),

    /// The resolver did not reach the buffering watermark in time.
    #[error("Resolving {source_id} timed out after {timeout_ms}ms")]
    ResolutionTimeout {
        /// The source identifier being resolved.
        source_id: String,
        /// The configured deadline in milliseconds.
        timeout_ms: u64,
    },

    /// A playlist reference resolved to no items.
    #[error("Playlist is empty: {0}")]
    EmptyPlaylist(String),

    /// The first load of a source did not report a total length.
    #[error("Total length unknown for {0}")]
    UnknownLength(String),

    /// SOAP request to the renderer failed.
    #[error("SOAP request failed: {0}")]
    Soap(String),

    /// The renderer could not be reached or described.
    #[error("Renderer error: {0}")]
    Renderer(String),

    /// The renderer refused a load or transport command.
    #[error("Renderer command failed: {0}")]
    RendererCommandFailed(String),

    /// The renderer did not answer a command in time.
    #[error("Renderer timed out: {0}")]
    RendererTimeout(String),

    /// The renderer's status feed ended.
    #[error("Renderer disconnected")]
    RendererDisconnected,

    /// A request reached the video route before any video was loaded.
    #[error("No video loaded")]
    NoVideoLoaded,

    /// The streaming server has been torn down.
    #[error("Streaming server destroyed")]
    ServerDestroyed,

    /// The `Range` header could not be parsed.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// The requested start offset lies beyond the video.
    #[error("Range start {start} not satisfiable for length {total}")]
    RangeNotSatisfiable {
        /// Requested start offset.
        start: u64,
        /// Total length of the video.
        total: u64,
    },

    /// The active stream was replaced or destroyed while in use.
    #[error("Stream cancelled")]
    StreamCancelled,

    /// The active stream has already been handed to another response.
    #[error("Stream already in use")]
    StreamBusy,

    /// Network-related error (IP detection, bind issues).
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error (invalid values).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CastError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Discovery(_) => "discovery_failed",
            Self::DeviceNotFound(_) => "device_not_found",
            Self::Resolver(_) => "resolver_error",
            Self::ResolutionTimeout { .. } => "resolution_timeout",
            Self::EmptyPlaylist(_) => "empty_playlist",
            Self::UnknownLength(_) => "unknown_length",
            Self::Soap(_) => "soap_error",
            Self::Renderer(_) => "renderer_error",
            Self::RendererCommandFailed(_) => "renderer_command_failed",
            Self::RendererTimeout(_) => "renderer_timeout",
            Self::RendererDisconnected => "renderer_disconnected",
            Self::NoVideoLoaded => "no_video_loaded",
            Self::ServerDestroyed => "server_destroyed",
            Self::InvalidRange(_) => "invalid_range",
            Self::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            Self::StreamCancelled => "stream_cancelled",
            Self::StreamBusy => "stream_busy",
            Self::Network(_) => "network_error",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRange(_) | Self::RangeNotSatisfiable { .. } => {
                StatusCode::RANGE_NOT_SATISFIABLE
            }
            Self::ServerDestroyed | Self::StreamCancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::StreamBusy => StatusCode::CONFLICT,
            Self::Resolver(_) | Self::UnknownLength(_) | Self::EmptyPlaylist(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::ResolutionTimeout { .. } | Self::RendererTimeout(_) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns true if a playlist session may skip the failing item and continue.
    ///
    /// Only failures scoped to a single source qualify; server teardown and
    /// renderer failures end the session.
    #[must_use]
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            Self::Resolver(_) | Self::ResolutionTimeout { .. } | Self::UnknownLength(_)
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Type Aliases
// ─────────────────────────────────────────────────────────────────────────────

pub use crate::discovery::DiscoveryResult;
pub use crate::renderer::soap::SoapResult;
pub use crate::renderer::RendererResult;

/// Convenient Result alias for application-wide operations.
pub type CastResult<T> = Result<T, CastError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for CastError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<SoapError> for CastError {
    fn from(err: SoapError) -> Self {
        Self::Soap(err.to_string())
    }
}

impl From<RendererError> for CastError {
    fn from(err: RendererError) -> Self {
        match err {
            RendererError::Soap(e) => e.into(),
            other => Self::Renderer(other.to_string()),
        }
    }
}

impl From<DiscoveryError> for CastError {
    fn from(err: DiscoveryError) -> Self {
        Self::Discovery(err.to_string())
    }
}

impl From<ResolverError> for CastError {
    fn from(err: ResolverError) -> Self {
        match err {
            ResolverError::EmptyPlaylist(reference) => Self::EmptyPlaylist(reference),
            other => Self::Resolver(other.to_string()),
        }
    }
}

impl From<NetworkError> for CastError {
    fn from(err: NetworkError) -> Self {
        Self::Network(err.to_string())
    }
}
