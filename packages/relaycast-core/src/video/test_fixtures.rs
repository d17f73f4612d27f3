//! In-memory resolvers shared by unit tests across the crate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use super::resolver::{
    PlaylistResolver, ResolveOptions, ResolvedStream, ResolverError, ResolverResult,
    VideoInfo, VideoResolver,
};

/// Mime reported for offset loads, so tests can tell when it leaks into details.
pub(crate) const RANGED_MIME: &str = "application/octet-stream";

#[derive(Clone)]
pub(crate) struct MemoryVideo {
    pub data: Vec<u8>,
    pub mime: String,
    pub title: String,
    pub author: String,
    /// Never answer the resolve call.
    pub stall: bool,
    /// Keep the body open after the last byte.
    pub hold_open: bool,
}

impl MemoryVideo {
    pub fn new(len: usize) -> Self {
        Self {
            data: (0..len).map(|i| (i % 251) as u8).collect(),
            mime: "video/mp4".to_string(),
            title: "Test Video".to_string(),
            author: "Test Author".to_string(),
            stall: false,
            hold_open: false,
        }
    }
}

/// Resolver backed by byte vectors, recording every call.
pub(crate) struct MemoryResolver {
    videos: HashMap<String, MemoryVideo>,
    chunk_size: usize,
    calls: Mutex<Vec<(String, ResolveOptions)>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self {
            videos: HashMap::new(),
            chunk_size: 64,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_video(mut self, id: &str, video: MemoryVideo) -> Self {
        self.videos.insert(id.to_string(), video);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Offsets requested for `id`, in call order.
    pub fn offsets_for(&self, id: &str) -> Vec<u64> {
        self.calls
            .lock()
            .iter()
            .filter(|(source, _)| source == id)
            .map(|(_, options)| options.range.start)
            .collect()
    }

    /// Source identifiers requested, in call order.
    pub fn requested(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(s, _)| s.clone()).collect()
    }
}

#[async_trait]
impl VideoResolver for MemoryResolver {
    async fn resolve(
        &self,
        source_id: &str,
        options: &ResolveOptions,
    ) -> ResolverResult<ResolvedStream> {
        self.calls
            .lock()
            .push((source_id.to_string(), options.clone()));

        let video = self
            .videos
            .get(source_id)
            .cloned()
            .ok_or_else(|| ResolverError::InvalidSource(source_id.to_string()))?;

        if video.stall {
            futures::future::pending::<()>().await;
        }

        let start = (options.range.start as usize).min(video.data.len());
        let remaining = video.data[start..].to_vec();
        let chunks: Vec<ResolverResult<Bytes>> = remaining
            .chunks(self.chunk_size.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        let body = stream::iter(chunks);
        let body = if video.hold_open {
            body.chain(stream::pending()).boxed()
        } else {
            body.boxed()
        };

        // Offset loads report different headers/info than the first load.
        let (content_type, title) = if start == 0 {
            (video.mime.clone(), video.title.clone())
        } else {
            (RANGED_MIME.to_string(), format!("{} @{}", video.title, start))
        };

        Ok(ResolvedStream {
            content_length: Some(remaining.len() as u64),
            content_type: Some(content_type),
            info: VideoInfo {
                video_id: source_id.to_string(),
                title: Some(title),
                author: Some(video.author.clone()),
                format_url: Some(format!("memory://{}", source_id)),
            },
            body,
        })
    }
}

/// Playlist resolver returning fixed items.
pub(crate) struct StaticPlaylist {
    items: Vec<String>,
}

impl StaticPlaylist {
    pub fn new(items: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            items: items.iter().map(|s| s.to_string()).collect(),
        })
    }
}

#[async_trait]
impl PlaylistResolver for StaticPlaylist {
    async fn resolve_playlist(&self, reference: &str) -> ResolverResult<Vec<String>> {
        if self.items.is_empty() {
            return Err(ResolverError::EmptyPlaylist(reference.to_string()));
        }
        Ok(self.items.clone())
    }
}
