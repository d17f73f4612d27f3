//! Resolver seams and the data they exchange.
//!
//! A [`VideoResolver`] turns an opaque source identifier into metadata plus a
//! byte stream starting at a requested offset. It can only *restart* at an
//! offset; there is no windowed read and no random access. A
//! [`PlaylistResolver`] turns a playlist reference into source identifiers.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by resolvers.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// HTTP request to the upstream failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("upstream returned HTTP {0}")]
    HttpStatus(u16),

    /// The source identifier cannot be resolved by this resolver.
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// The playlist reference resolved to no items.
    #[error("no items in playlist {0}")]
    EmptyPlaylist(String),

    /// The byte stream failed after it started.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Convenient Result alias for resolver operations.
pub type ResolverResult<T> = Result<T, ResolverError>;

/// Byte stream produced by a resolver.
pub type ByteStream = Pin<Box<dyn Stream<Item = ResolverResult<Bytes>> + Send>>;

/// A byte range. `end` is inclusive and only ever used as a length claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset, when the client named one.
    pub end: Option<u64>,
}

impl ByteRange {
    /// A range from `start` to the end of the resource.
    #[must_use]
    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }
}

/// Options fixed for the lifetime of a video.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Format hint forwarded to the resolver.
    pub format: Option<String>,
    /// Where to start reading.
    pub range: ByteRange,
}

/// Descriptive information the resolver reports for a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoInfo {
    /// Stable identifier of the video.
    pub video_id: String,
    /// Human-readable title.
    pub title: Option<String>,
    /// Author or channel name.
    pub author: Option<String>,
    /// Concrete URL the bytes are fetched from.
    pub format_url: Option<String>,
}

/// A resolved response: headers, info and the byte stream.
pub struct ResolvedStream {
    /// `content-length` of this response (remaining bytes from the offset).
    pub content_length: Option<u64>,
    /// `content-type` of this response.
    pub content_type: Option<String>,
    /// Info payload.
    pub info: VideoInfo,
    /// Bytes starting at the requested offset.
    pub body: ByteStream,
}

impl std::fmt::Debug for ResolvedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedStream")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Resolves a source identifier into a byte stream starting at an offset.
#[async_trait]
pub trait VideoResolver: Send + Sync {
    /// Starts a new stream for `source_id` at `options.range.start`.
    ///
    /// `options.range.end` is advisory; implementations stream to the end.
    async fn resolve(
        &self,
        source_id: &str,
        options: &ResolveOptions,
    ) -> ResolverResult<ResolvedStream>;
}

/// Resolves a playlist reference into an ordered list of source identifiers.
#[async_trait]
pub trait PlaylistResolver: Send + Sync {
    /// Returns the playlist items in play order.
    async fn resolve_playlist(&self, reference: &str) -> ResolverResult<Vec<String>>;
}

/// Returns true if `source` names a playlist rather than a single video.
#[must_use]
pub fn is_playlist_reference(source: &str) -> bool {
    if source.contains("playlist") {
        return true;
    }
    let path = source.split(['?', '#']).next().unwrap_or(source);
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".m3u") || lower.ends_with(".m3u8")
}
