//! The current video: one resolver stream at a time, reseeked by restart.
//!
//! A [`VideoSource`] owns at most one live resolver stream. Every load or seek
//! cancels the previous stream before the resolver is asked for a new one, so
//! bytes from two streams can never interleave in a response. Seeking is not a
//! primitive of the stream: it is a fresh resolve at the new offset.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::resolver::{ByteRange, ByteStream, ResolveOptions, ResolvedStream, VideoResolver};
use crate::error::{CastError, CastResult};
use crate::protocol_constants::FALLBACK_MIME;

/// Response body handed to the HTTP layer.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Display metadata forwarded to the renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VideoMetadata {
    /// Video title.
    pub title: Option<String>,
    /// Author or channel name.
    pub creator: Option<String>,
}

/// Facts captured from the first full (offset-free) load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDetails {
    /// Identifier reported by the resolver.
    pub video_id: String,
    /// Length of the whole resource in bytes.
    pub total_length: u64,
    /// Content type of the resource.
    pub mime: String,
    /// Display metadata.
    pub metadata: VideoMetadata,
    /// Concrete URL the resolver fetched.
    pub format_url: Option<String>,
}

struct ActiveStream {
    prefetched: VecDeque<Bytes>,
    body: ByteStream,
}

struct StreamSlot {
    generation: u64,
    cancel: CancellationToken,
    active: Option<ActiveStream>,
}

/// A single video served by the streaming server.
pub struct VideoSource {
    source_id: String,
    options: ResolveOptions,
    resolver: Arc<dyn VideoResolver>,
    watermark: usize,
    load_timeout: Duration,
    details: OnceLock<VideoDetails>,
    /// Cancelled once, on destroy. Every per-stream token is a child of it.
    lifetime: CancellationToken,
    slot: Mutex<StreamSlot>,
}

impl VideoSource {
    /// Creates an unloaded video for `source_id`.
    pub fn new(
        source_id: impl Into<String>,
        options: ResolveOptions,
        resolver: Arc<dyn VideoResolver>,
        watermark: usize,
        load_timeout: Duration,
    ) -> Self {
        let lifetime = CancellationToken::new();
        let slot = StreamSlot {
            generation: 0,
            cancel: lifetime.child_token(),
            active: None,
        };
        Self {
            source_id: source_id.into(),
            options,
            resolver,
            watermark: watermark.max(1),
            load_timeout,
            details: OnceLock::new(),
            lifetime,
            slot: Mutex::new(slot),
        }
    }

    /// Loads this video's own source. See [`VideoSource::load_source`].
    pub async fn load(&self, range: Option<ByteRange>) -> CastResult<String> {
        let source_id = self.source_id.clone();
        self.load_source(&source_id, range).await
    }

    /// Replaces the active stream with a new resolver stream.
    ///
    /// Without `range` the configured range is used and the resolver's length,
    /// content type and metadata are captured (once per video). With `range`
    /// they are left untouched. Resolves once the watermark is buffered or the
    /// stream ended, returning the resolver's video id.
    ///
    /// # Errors
    ///
    /// - [`CastError::ResolutionTimeout`] if the resolver misses the deadline
    /// - [`CastError::StreamCancelled`] if a newer load or destroy superseded this one
    /// - [`CastError::UnknownLength`] if the first load reports no length
    pub async fn load_source(&self, source_id: &str, range: Option<ByteRange>) -> CastResult<String> {
        if self.lifetime.is_cancelled() {
            return Err(CastError::StreamCancelled);
        }

        let (generation, cancel) = self.begin_load();
        let capture = range.is_none();
        let options = ResolveOptions {
            format: self.options.format.clone(),
            range: range.unwrap_or(self.options.range),
        };

        log::debug!(
            "[Video] Loading {} from offset {}",
            source_id,
            options.range.start
        );

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(CastError::StreamCancelled),
            res = tokio::time::timeout(self.load_timeout, self.fetch(source_id, &options, capture)) => res,
        };

        let (video_id, active) = match outcome {
            Ok(res) => res?,
            Err(_) => {
                log::warn!(
                    "[Video] {} did not buffer within {:?}",
                    source_id,
                    self.load_timeout
                );
                return Err(CastError::ResolutionTimeout {
                    source_id: source_id.to_string(),
                    timeout_ms: self.load_timeout.as_millis() as u64,
                });
            }
        };

        let mut slot = self.slot.lock();
        if slot.generation != generation || cancel.is_cancelled() {
            return Err(CastError::StreamCancelled);
        }
        slot.active = Some(active);
        Ok(video_id)
    }

    /// Restarts the resolver at `start` and returns the bytes left after it.
    pub async fn seek(&self, start: u64) -> CastResult<u64> {
        let total = self
            .total_length()
            .ok_or_else(|| CastError::UnknownLength(self.source_id.clone()))?;
        if start >= total {
            return Err(CastError::RangeNotSatisfiable { start, total });
        }

        self.load(Some(ByteRange::from_start(start))).await?;
        log::debug!(
            "[Video] {} seeked to {} ({} bytes remaining)",
            self.source_id,
            start,
            total - start
        );
        Ok(total - start)
    }

    /// Takes the active stream as a response body.
    ///
    /// The body yields the buffered watermark bytes followed by the rest of
    /// the resolver stream, and ends as soon as this stream is superseded by
    /// another load or the video is destroyed.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::StreamBusy`] if the stream was already taken.
    pub fn pipe(&self) -> CastResult<BodyStream> {
        let mut slot = self.slot.lock();
        if slot.cancel.is_cancelled() {
            return Err(CastError::StreamCancelled);
        }
        let ActiveStream { prefetched, body } = slot.active.take().ok_or(CastError::StreamBusy)?;
        let cancel = slot.cancel.clone();
        drop(slot);

        let stream = futures::stream::iter(prefetched.into_iter().map(Ok))
            .chain(body.map(|chunk| chunk.map_err(std::io::Error::other)))
            .take_until(cancel.cancelled_owned());
        Ok(Box::pin(stream))
    }

    /// Tears down the active stream. Idempotent; captured details survive.
    ///
    /// A destroyed video refuses further loads.
    pub fn destroy(&self) {
        if self.lifetime.is_cancelled() {
            return;
        }
        self.lifetime.cancel();
        self.slot.lock().active = None;
        log::debug!("[Video] {} destroyed", self.source_id);
    }

    /// Token cancelled when this video is destroyed.
    #[must_use]
    pub fn lifetime_token(&self) -> CancellationToken {
        self.lifetime.clone()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Details captured by the first full load, if it happened.
    #[must_use]
    pub fn details(&self) -> Option<&VideoDetails> {
        self.details.get()
    }

    #[must_use]
    pub fn total_length(&self) -> Option<u64> {
        self.details.get().map(|d| d.total_length)
    }

    #[must_use]
    pub fn mime(&self) -> Option<&str> {
        self.details.get().map(|d| d.mime.as_str())
    }

    #[must_use]
    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.details.get().map(|d| &d.metadata)
    }

    /// Cancels the current stream and installs a fresh token for the next one.
    fn begin_load(&self) -> (u64, CancellationToken) {
        let mut slot = self.slot.lock();
        slot.cancel.cancel();
        slot.active = None;
        slot.generation += 1;
        slot.cancel = self.lifetime.child_token();
        (slot.generation, slot.cancel.clone())
    }

    async fn fetch(
        &self,
        source_id: &str,
        options: &ResolveOptions,
        capture: bool,
    ) -> CastResult<(String, ActiveStream)> {
        let resolved = self.resolver.resolve(source_id, options).await?;
        if capture {
            self.capture_details(source_id, options.range.start, &resolved)?;
        }

        let ResolvedStream {
            content_length,
            info,
            mut body,
            ..
        } = resolved;

        let mut prefetched = VecDeque::new();
        let mut downloaded = 0usize;
        while downloaded < self.watermark {
            match body.next().await {
                Some(Ok(chunk)) => {
                    downloaded += chunk.len();
                    log::trace!(
                        "[Video] {} progress: chunk={} downloaded={} total={:?}",
                        source_id,
                        chunk.len(),
                        downloaded,
                        content_length
                    );
                    prefetched.push_back(chunk);
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        log::debug!(
            "[Video] {} ready at offset {} ({} bytes buffered)",
            source_id,
            options.range.start,
            downloaded
        );

        Ok((info.video_id, ActiveStream { prefetched, body }))
    }

    fn capture_details(
        &self,
        source_id: &str,
        offset: u64,
        resolved: &ResolvedStream,
    ) -> CastResult<()> {
        if self.details.get().is_some() {
            return Ok(());
        }
        let remaining = resolved
            .content_length
            .ok_or_else(|| CastError::UnknownLength(source_id.to_string()))?;
        let mime = resolved.content_type.clone().unwrap_or_else(|| {
            log::debug!("[Video] {} has no content type, using {}", source_id, FALLBACK_MIME);
            FALLBACK_MIME.to_string()
        });

        // A concurrent first load may have won; the first value stays.
        let _ = self.details.set(VideoDetails {
            video_id: resolved.info.video_id.clone(),
            total_length: offset + remaining,
            mime,
            metadata: VideoMetadata {
                title: resolved.info.title.clone(),
                creator: resolved.info.author.clone(),
            },
            format_url: resolved.info.format_url.clone(),
        });
        Ok(())
    }
}

impl std::fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSource")
            .field("source_id", &self.source_id)
            .field("details", &self.details.get())
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}
