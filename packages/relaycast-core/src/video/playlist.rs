//! HTTP playlist resolver.
//!
//! Fetches a playlist reference and extracts its items. Two page shapes are
//! understood: HTML listings whose table rows carry a `data-video-id`
//! attribute, and M3U-style lists of one entry per line.

use async_trait::async_trait;
use reqwest::{Client, Url};

use super::resolver::{PlaylistResolver, ResolverError, ResolverResult};

/// Resolver that downloads a playlist page.
#[derive(Clone)]
pub struct HttpPlaylistResolver {
    client: Client,
}

impl HttpPlaylistResolver {
    /// Creates a resolver using the shared HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlaylistResolver for HttpPlaylistResolver {
    async fn resolve_playlist(&self, reference: &str) -> ResolverResult<Vec<String>> {
        let url = Url::parse(reference)
            .map_err(|e| ResolverError::InvalidSource(format!("{}: {}", reference, e)))?;

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolverError::HttpStatus(status.as_u16()));
        }
        let body = response.text().await?;

        let items = parse_playlist(&body, &url);
        log::debug!(
            "[Playlist] {} resolved to {} item(s)",
            reference,
            items.len()
        );
        if items.is_empty() {
            return Err(ResolverError::EmptyPlaylist(reference.to_string()));
        }
        Ok(items)
    }
}

/// Extracts playlist items, preferring `data-video-id` rows over M3U lines.
///
/// Entries that are not absolute URLs are resolved against `base`, so a bare
/// row id on `http://host/list/page.html` becomes `http://host/list/<id>`.
pub fn parse_playlist(body: &str, base: &Url) -> Vec<String> {
    let ids = extract_row_video_ids(body);
    if !ids.is_empty() {
        return ids.iter().map(|id| resolve_entry(id, base)).collect();
    }
    if body.contains('<') {
        return Vec::new();
    }
    parse_m3u(body, base)
}

/// Collects `data-video-id` values from `<tr ...>` start tags, in document order.
pub fn extract_row_video_ids(html: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut rest = html;

    while let Some(pos) = find_tr_tag(rest) {
        let tag_body = &rest[pos + 3..];
        let tag_end = start_tag_end(tag_body);
        let tag = &tag_body[..tag_end];

        if let Some(id) = attribute_value(tag, "data-video-id") {
            if !id.is_empty() {
                ids.push(id);
            }
        }
        rest = &tag_body[tag_end..];
    }

    ids
}

/// Finds the next `<tr` that starts a table-row tag (not `<track`, `<tr-x`...).
fn find_tr_tag(html: &str) -> Option<usize> {
    let bytes = html.as_bytes();
    let mut from = 0;
    while let Some(offset) = html[from..].find('<') {
        let pos = from + offset;
        let name = bytes.get(pos + 1..pos + 3);
        let after = bytes.get(pos + 3).copied();
        if name.is_some_and(|n| n.eq_ignore_ascii_case(b"tr"))
            && after.is_some_and(|b| b.is_ascii_whitespace() || b == b'>' || b == b'/')
        {
            return Some(pos);
        }
        from = pos + 1;
    }
    None
}

/// Offset of the `>` closing a start tag. A `>` inside a quoted value does not count.
fn start_tag_end(tag: &str) -> usize {
    let mut quote: Option<u8> = None;
    let mut after_eq = false;
    for (i, b) in tag.bytes().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'>' => return i,
                b'"' | b'\'' if after_eq => quote = Some(b),
                b'=' => {
                    after_eq = true;
                    continue;
                }
                _ if after_eq && b.is_ascii_whitespace() => continue,
                _ => {}
            },
        }
        after_eq = false;
    }
    tag.len()
}

/// Returns the decoded value of `name` among a start tag's attributes.
fn attribute_value(tag: &str, name: &str) -> Option<String> {
    let mut rest = tag;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '/');
        if rest.is_empty() {
            return None;
        }

        let name_end = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '=' || c == '/')
            .unwrap_or(rest.len());
        let attr = &rest[..name_end];
        rest = rest[name_end..].trim_start();

        let mut raw = "";
        if let Some(value) = rest.strip_prefix('=') {
            let value = value.trim_start();
            let (found, remaining) = match value.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let inner = &value[1..];
                    let end = inner.find(q).unwrap_or(inner.len());
                    (&inner[..end], inner.get(end + 1..).unwrap_or(""))
                }
                _ => {
                    let end = value
                        .find(|c: char| c.is_ascii_whitespace())
                        .unwrap_or(value.len());
                    value.split_at(end)
                }
            };
            raw = found;
            rest = remaining;
        }

        if attr.eq_ignore_ascii_case(name) {
            return Some(html_escape::decode_html_entities(raw).into_owned());
        }
    }
}

/// Parses an M3U-style list: non-empty, non-comment lines, resolved against `base`.
pub fn parse_m3u(body: &str, base: &Url) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| resolve_entry(line, base))
        .collect()
}

fn resolve_entry(entry: &str, base: &Url) -> String {
    if let Ok(url) = Url::parse(entry) {
        return url.to_string();
    }
    match base.join(entry) {
        Ok(url) => url.to_string(),
        Err(_) => entry.to_string(),
    }
}
