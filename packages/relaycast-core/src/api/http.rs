//! Video route handler.
//!
//! One GET route answers for whatever video is current. Un-ranged requests
//! get headers only; ranged requests restart the resolver at the requested
//! offset and stream from there.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use bytes::Bytes;
use futures::StreamExt;
use tower_http::trace::TraceLayer;

use crate::api::AppState;
use crate::error::{CastError, CastResult};
use crate::events::StreamEvent;
use crate::protocol_constants::{
    DLNA_CONTENT_FEATURES, DLNA_CONTENT_FEATURES_HEADER, DLNA_TRANSFER_MODE,
    DLNA_TRANSFER_MODE_HEADER, FALLBACK_MIME,
};
use crate::utils::now_millis;
use crate::video::ByteRange;

/// Creates the router serving the current video at `video_path`.
pub fn create_router(state: AppState, video_path: &str) -> Router {
    Router::new()
        .route(video_path, get(stream_video))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Parses a single `bytes=start-[end]` range.
///
/// Suffix ranges (`bytes=-N`) and multi-range requests are rejected: the
/// upstream can only restart from an absolute offset.
pub fn parse_range_header(value: &str) -> Result<ByteRange, CastError> {
    let invalid = || CastError::InvalidRange(value.to_string());

    let spec = value.trim().strip_prefix("bytes=").ok_or_else(invalid)?;
    if spec.contains(',') {
        return Err(invalid());
    }
    let (start, end) = spec.split_once('-').ok_or_else(invalid)?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() {
        return Err(invalid());
    }

    let start: u64 = start.parse().map_err(|_| invalid())?;
    let end = if end.is_empty() {
        None
    } else {
        let end: u64 = end.parse().map_err(|_| invalid())?;
        if end < start {
            return Err(invalid());
        }
        Some(end)
    };

    Ok(ByteRange { start, end })
}

async fn stream_video(State(state): State<AppState>, headers: HeaderMap) -> CastResult<Response> {
    if state.is_destroyed() {
        return Err(CastError::ServerDestroyed);
    }

    let video = state.current_video().ok_or_else(|| {
        log::error!("[Stream] Request arrived before any video was loaded");
        CastError::NoVideoLoaded
    })?;

    let total = video
        .total_length()
        .ok_or_else(|| CastError::UnknownLength(video.source_id().to_string()))?;
    let mime = video.mime().unwrap_or(FALLBACK_MIME).to_string();

    let range_header = headers
        .get(header::RANGE)
        .map(|v| {
            v.to_str()
                .map_err(|_| CastError::InvalidRange("non-ASCII Range header".to_string()))
        })
        .transpose()?;

    let Some(range_header) = range_header else {
        log::info!(
            "[Stream] Full request for {} ({} bytes, {})",
            video.source_id(),
            total,
            mime
        );

        // Headers only: the renderer follows up with a ranged request. The
        // body stays open until the video is replaced or destroyed.
        let body = futures::stream::pending::<Result<Bytes, std::io::Error>>()
            .take_until(video.lifetime_token().cancelled_owned());

        return Response::builder()
            .status(StatusCode::CREATED)
            .header(header::CONTENT_LENGTH, total)
            .header(header::CONTENT_TYPE, &mime)
            .header(DLNA_TRANSFER_MODE_HEADER, DLNA_TRANSFER_MODE)
            .header(DLNA_CONTENT_FEATURES_HEADER, DLNA_CONTENT_FEATURES)
            .body(Body::from_stream(body))
            .map_err(|e| CastError::Internal(e.to_string()));
    };

    log::debug!(
        "[Stream] Range request for {}: '{}'",
        video.source_id(),
        range_header
    );
    let range = parse_range_header(range_header)?;

    let remaining = video.seek(range.start).await?;
    state.emitter.emit_stream(StreamEvent::Seeked {
        source_id: video.source_id().to_string(),
        start: range.start,
        remaining,
        timestamp: now_millis(),
    });

    let body = video.pipe()?;
    let end = range.end.unwrap_or(total);

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", range.start, end, total),
        )
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, remaining)
        .header(header::CONTENT_TYPE, &mime)
        .header(DLNA_TRANSFER_MODE_HEADER, DLNA_TRANSFER_MODE)
        .header(DLNA_CONTENT_FEATURES_HEADER, DLNA_CONTENT_FEATURES)
        .body(Body::from_stream(body))
        .map_err(|e| CastError::Internal(e.to_string()))
}
