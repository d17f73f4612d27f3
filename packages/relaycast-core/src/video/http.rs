//! Plain HTTP(S) video resolver.
//!
//! Treats the source identifier as a URL. Offsets become an open-ended
//! `Range: bytes=N-` request; upstreams that ignore the header are handled by
//! discarding the leading bytes locally.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use reqwest::{Client, StatusCode, Url};

use super::resolver::{
    ByteStream, ResolveOptions, ResolvedStream, ResolverError, ResolverResult, VideoInfo,
    VideoResolver,
};

/// Resolver that streams a URL directly.
#[derive(Clone)]
pub struct HttpVideoResolver {
    client: Client,
}

impl HttpVideoResolver {
    /// Creates a resolver using the shared HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VideoResolver for HttpVideoResolver {
    async fn resolve(
        &self,
        source_id: &str,
        options: &ResolveOptions,
    ) -> ResolverResult<ResolvedStream> {
        let url = parse_source_url(source_id)?;
        let start = options.range.start;

        let mut request = self.client.get(url.clone());
        if start > 0 {
            request = request.header(RANGE, format!("bytes={}-", start));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolverError::HttpStatus(status.as_u16()));
        }

        let header_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let info = info_for(source_id, &url, response.url());

        let body: ByteStream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ResolverError::from))
            .boxed();

        // 200 to a ranged request means the upstream sent the whole resource.
        let (content_length, body) = if start > 0 && status == StatusCode::OK {
            log::debug!(
                "[Resolver] {} ignored Range, skipping {} bytes locally",
                source_id,
                start
            );
            (
                header_length.map(|len| len.saturating_sub(start)),
                skip_prefix(body, start),
            )
        } else {
            (header_length, body)
        };

        Ok(ResolvedStream {
            content_length,
            content_type,
            info,
            body,
        })
    }
}

fn parse_source_url(source_id: &str) -> ResolverResult<Url> {
    let url = Url::parse(source_id)
        .map_err(|e| ResolverError::InvalidSource(format!("{}: {}", source_id, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ResolverError::InvalidSource(format!(
            "{}: unsupported scheme {}",
            source_id, other
        ))),
    }
}

/// Derives the info payload from the request and final (post-redirect) URLs.
fn info_for(source_id: &str, requested: &Url, fetched: &Url) -> VideoInfo {
    let title = requested
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(|segment| {
            let decoded =
                String::from_utf8_lossy(&urlencoding::decode_binary(segment.as_bytes()))
                    .into_owned();
            match decoded.rsplit_once('.') {
                Some((stem, _)) if !stem.is_empty() => stem.to_string(),
                _ => decoded,
            }
        });

    VideoInfo {
        video_id: source_id.to_string(),
        title,
        author: requested.host_str().map(str::to_string),
        format_url: Some(fetched.to_string()),
    }
}

/// Drops the first `skip` bytes of a stream.
fn skip_prefix(body: ByteStream, skip: u64) -> ByteStream {
    async_stream::try_stream! {
        let mut body = body;
        let mut to_skip = skip;
        while let Some(chunk) = body.next().await {
            let chunk: Bytes = chunk?;
            if to_skip >= chunk.len() as u64 {
                to_skip -= chunk.len() as u64;
                continue;
            }
            let chunk = chunk.slice(to_skip as usize..);
            to_skip = 0;
            yield chunk;
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn rejects_non_http_sources() {
        assert!(parse_source_url("dQw4w9WgXcQ").is_err());
        assert!(parse_source_url("ftp://host/file.mp4").is_err());
        assert!(parse_source_url("https://host/file.mp4").is_ok());
    }

    #[test]
    fn info_uses_file_stem_and_host() {
        let url = Url::parse("http://nas.local/movies/My%20Film.mp4").unwrap();
        let info = info_for(url.as_str(), &url, &url);
        assert_eq!(info.title.as_deref(), Some("My Film"));
        assert_eq!(info.author.as_deref(), Some("nas.local"));
        assert_eq!(info.video_id, url.as_str());
    }

    #[test]
    fn info_records_redirect_target() {
        let requested = Url::parse("http://short.link/v").unwrap();
        let fetched = Url::parse("http://cdn.example/v/stream.mp4").unwrap();
        let info = info_for("http://short.link/v", &requested, &fetched);
        assert_eq!(
            info.format_url.as_deref(),
            Some("http://cdn.example/v/stream.mp4")
        );
        assert_eq!(info.title.as_deref(), Some("v"));
    }

    #[test]
    fn info_decodes_utf8_title() {
        let url = Url::parse("http://nas.local/Caf%C3%A9%20Night.mp4").unwrap();
        let info = info_for("src", &url, &url);
        assert_eq!(info.title.as_deref(), Some("Café Night"));
    }

    #[test]
    fn info_keeps_malformed_escapes() {
        let url = Url::parse("http://nas.local/100%25%zz.mkv").unwrap();
        let info = info_for("src", &url, &url);
        assert_eq!(info.title.as_deref(), Some("100%%zz"));
    }

    #[tokio::test]
    async fn skip_prefix_spans_chunks() {
        let chunks: Vec<ResolverResult<Bytes>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"defg")),
            Ok(Bytes::from_static(b"hi")),
        ];
        let body: ByteStream = stream::iter(chunks).boxed();

        let out: Vec<Bytes> = skip_prefix(body, 5)
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(out, vec![Bytes::from_static(b"fg"), Bytes::from_static(b"hi")]);
    }
}
