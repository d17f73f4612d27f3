//! DIDL-Lite metadata formatting for renderer display.

use super::utils::escape_xml;
use super::LoadOptions;
use crate::protocol_constants::APP_NAME;

/// Formats the DIDL-Lite document sent with `SetAVTransportURI`.
///
/// The `<res>` element repeats the media URL with a `protocolInfo` built from
/// the content type; several renderers refuse media whose DIDL lacks it.
pub(crate) fn format_didl_lite(url: &str, options: &LoadOptions) -> String {
    let title = options.metadata.title.as_deref().unwrap_or(APP_NAME);
    let creator = options.metadata.creator.as_deref().unwrap_or(APP_NAME);

    log::debug!(
        "[DIDL] title={:?}, creator={:?}, class={}, mime={}",
        title,
        creator,
        options.metadata.kind.upnp_class(),
        options.content_type
    );

    let mut didl = String::from(
        r#"<DIDL-Lite xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/" xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/">"#,
    );
    didl.push_str(r#"<item id="0" parentID="-1" restricted="1">"#);
    didl.push_str(&format!("<dc:title>{}</dc:title>", escape_xml(title)));
    didl.push_str(&format!("<dc:creator>{}</dc:creator>", escape_xml(creator)));
    didl.push_str(&format!(
        "<upnp:class>{}</upnp:class>",
        options.metadata.kind.upnp_class()
    ));
    didl.push_str(&format!(
        r#"<res protocolInfo="http-get:*:{}:*">{}</res>"#,
        escape_xml(&options.content_type),
        escape_xml(url)
    ));
    didl.push_str("</item>");
    didl.push_str("</DIDL-Lite>");

    didl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{MediaKind, MediaMetadata};

    fn options(title: Option<&str>) -> LoadOptions {
        LoadOptions {
            autoplay: true,
            content_type: "video/mp4".to_string(),
            metadata: MediaMetadata {
                title: title.map(str::to_string),
                creator: Some("Tom & Jerry".to_string()),
                kind: MediaKind::Video,
            },
        }
    }

    #[test]
    fn video_items_use_movie_class_and_protocol_info() {
        let didl = format_didl_lite("http://10.0.0.2:9999/video.mp4", &options(Some("Clip")));
        assert!(didl.contains("<dc:title>Clip</dc:title>"));
        assert!(didl.contains("<dc:creator>Tom &amp; Jerry</dc:creator>"));
        assert!(didl.contains("<upnp:class>object.item.videoItem.movie</upnp:class>"));
        assert!(didl.contains(
            r#"<res protocolInfo="http-get:*:video/mp4:*">http://10.0.0.2:9999/video.mp4</res>"#
        ));
    }

    #[test]
    fn missing_title_falls_back_to_app_name() {
        let didl = format_didl_lite("http://x/v", &options(None));
        assert!(didl.contains(&format!("<dc:title>{}</dc:title>", APP_NAME)));
    }
}
