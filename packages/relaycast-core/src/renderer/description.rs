//! UPnP device description fetching and parsing.
//!
//! The description lists each service's `serviceType` and `controlURL`.
//! Control URLs are usually relative and are resolved against `URLBase` when
//! present, otherwise against the description URL itself.

use std::time::Duration;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use reqwest::{Client, Url};

use super::services::UpnpService;
use super::{RendererError, RendererResult};
use crate::protocol_constants::DESCRIPTION_TIMEOUT_SECS;

/// One `<service>` entry of a device description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceEntry {
    pub service_type: String,
    pub control_url: String,
}

/// The parts of a device description the renderer client needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescription {
    /// First `friendlyName` in the document (the root device).
    pub friendly_name: Option<String>,
    pub url_base: Option<String>,
    /// Services of the root device and all embedded devices, in document order.
    pub services: Vec<ServiceEntry>,
}

impl DeviceDescription {
    /// Resolves the absolute control URL for `service`, if the device has it.
    pub fn control_url(&self, service: UpnpService, location: &Url) -> RendererResult<Option<Url>> {
        let Some(entry) = self
            .services
            .iter()
            .find(|s| service.matches(&s.service_type))
        else {
            return Ok(None);
        };

        let base = match self.url_base.as_deref().filter(|b| !b.is_empty()) {
            Some(base) => Url::parse(base)
                .map_err(|e| RendererError::InvalidUrl(format!("URLBase {}: {}", base, e)))?,
            None => location.clone(),
        };

        base.join(&entry.control_url).map(Some).map_err(|e| {
            RendererError::InvalidUrl(format!("controlURL {}: {}", entry.control_url, e))
        })
    }
}

fn element_text(reader: &mut Reader<&[u8]>, e: &BytesStart) -> Option<String> {
    reader
        .read_text(e.name())
        .ok()
        .map(|text| html_escape::decode_html_entities(&text).trim().to_string())
}

/// Parses a device description document.
pub fn parse_device_description(xml: &str) -> RendererResult<DeviceDescription> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut description = DeviceDescription::default();
    let mut current: Option<ServiceEntry> = None;
    let mut saw_root = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                saw_root = true;
                let local = e.local_name();
                match local.as_ref() {
                    b"service" => current = Some(ServiceEntry::default()),
                    b"serviceType" => {
                        let text = element_text(&mut reader, e);
                        if let (Some(entry), Some(text)) = (current.as_mut(), text) {
                            entry.service_type = text;
                        }
                    }
                    b"controlURL" => {
                        let text = element_text(&mut reader, e);
                        if let (Some(entry), Some(text)) = (current.as_mut(), text) {
                            entry.control_url = text;
                        }
                    }
                    b"friendlyName" => {
                        let text = element_text(&mut reader, e);
                        if description.friendly_name.is_none() {
                            description.friendly_name = text;
                        }
                    }
                    b"URLBase" => description.url_base = element_text(&mut reader, e),
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"service" => {
                if let Some(entry) = current.take() {
                    if !entry.service_type.is_empty() && !entry.control_url.is_empty() {
                        description.services.push(entry);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(RendererError::Description(format!("XML parse error: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(RendererError::Description("empty document".to_string()));
    }
    Ok(description)
}

/// Downloads and parses the description at `location`.
pub async fn fetch_device_description(
    client: &Client,
    location: &str,
) -> RendererResult<(Url, DeviceDescription)> {
    let url = Url::parse(location)
        .map_err(|e| RendererError::InvalidUrl(format!("{}: {}", location, e)))?;

    let response = client
        .get(url.clone())
        .timeout(Duration::from_secs(DESCRIPTION_TIMEOUT_SECS))
        .send()
        .await
        .map_err(|e| RendererError::Description(format!("GET {}: {}", location, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RendererError::Description(format!(
            "GET {} returned {}",
            location, status
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| RendererError::Description(format!("reading {}: {}", location, e)))?;

    Ok((url, parse_device_description(&body)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>[TV] Living Room &amp; Den</friendlyName>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
        <controlURL>/upnp/control/RenderingControl1</controlURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ConnectionManager:1</serviceType>
        <controlURL>/upnp/control/ConnectionManager1</controlURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <controlURL>upnp/control/AVTransport1</controlURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    #[test]
    fn parses_services_and_friendly_name() {
        let description = parse_device_description(DESCRIPTION).unwrap();
        assert_eq!(
            description.friendly_name.as_deref(),
            Some("[TV] Living Room & Den")
        );
        assert_eq!(description.services.len(), 3);
        assert_eq!(
            description.services[2].control_url,
            "upnp/control/AVTransport1"
        );
    }

    #[test]
    fn resolves_control_urls_against_location() {
        let description = parse_device_description(DESCRIPTION).unwrap();
        let location = Url::parse("http://192.168.1.20:9197/dmr").unwrap();

        let av = description
            .control_url(UpnpService::AVTransport, &location)
            .unwrap()
            .unwrap();
        assert_eq!(av.as_str(), "http://192.168.1.20:9197/upnp/control/AVTransport1");

        let cm = description
            .control_url(UpnpService::ConnectionManager, &location)
            .unwrap()
            .unwrap();
        assert_eq!(
            cm.as_str(),
            "http://192.168.1.20:9197/upnp/control/ConnectionManager1"
        );
    }

    #[test]
    fn url_base_takes_precedence() {
        let xml = DESCRIPTION.replace(
            "<device>",
            "<URLBase>http://192.168.1.20:7676/</URLBase><device>",
        );
        let description = parse_device_description(&xml).unwrap();
        let location = Url::parse("http://192.168.1.20:9197/dmr").unwrap();
        let av = description
            .control_url(UpnpService::AVTransport, &location)
            .unwrap()
            .unwrap();
        assert_eq!(av.as_str(), "http://192.168.1.20:7676/upnp/control/AVTransport1");
    }

    #[test]
    fn missing_service_is_none() {
        let xml = r#"<root><device><friendlyName>Speaker</friendlyName></device></root>"#;
        let description = parse_device_description(xml).unwrap();
        let location = Url::parse("http://10.0.0.1/d.xml").unwrap();
        assert!(description
            .control_url(UpnpService::AVTransport, &location)
            .unwrap()
            .is_none());
    }

    #[test]
    fn empty_document_is_an_error() {
        assert!(matches!(
            parse_device_description(""),
            Err(RendererError::Description(_))
        ));
    }
}
