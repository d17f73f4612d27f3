//! UPnP AVTransport renderer client.
//!
//! [`UpnpRenderer`] commands a renderer over SOAP and reports its status by
//! polling `GetTransportInfo` in a background task.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::description::fetch_device_description;
use super::didl::format_didl_lite;
use super::retry::with_retry;
use super::services::UpnpService;
use super::soap::{SoapRequestBuilder, SoapResult};
use super::transport::{parse_transport_info, TransportStatus, TransportTracker};
use super::utils::extract_xml_text;
use super::{
    LoadOptions, RendererConnector, RendererControl, RendererError, RendererEvent, RendererResult,
};

/// Capacity of the status event channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Consecutive failed status polls after which the renderer counts as gone.
const MAX_POLL_FAILURES: u32 = 10;

/// A renderer reached through its AVTransport control URL.
pub struct UpnpRenderer {
    client: Client,
    name: String,
    av_transport_url: String,
    connection_manager_url: Option<String>,
    instance_id: Arc<AtomicU32>,
    tracker: Arc<Mutex<TransportTracker>>,
    events: broadcast::Receiver<RendererEvent>,
    cancel: CancellationToken,
}

impl UpnpRenderer {
    /// Fetches the device description at `location` and starts status polling.
    ///
    /// # Errors
    ///
    /// Fails if the description cannot be fetched or parsed, or if the device
    /// has no AVTransport service.
    pub async fn connect(
        client: Client,
        location: &str,
        poll_interval: Duration,
    ) -> RendererResult<Arc<Self>> {
        let (url, description) = fetch_device_description(&client, location).await?;

        let av_transport_url = description
            .control_url(UpnpService::AVTransport, &url)?
            .ok_or(RendererError::MissingService(UpnpService::AVTransport.name()))?
            .to_string();
        let connection_manager_url = description
            .control_url(UpnpService::ConnectionManager, &url)?
            .map(|u| u.to_string());
        let name = description
            .friendly_name
            .unwrap_or_else(|| url.host_str().unwrap_or(location).to_string());

        log::info!(
            "[Renderer] Connected to {:?} (AVTransport at {})",
            name,
            av_transport_url
        );

        let (tx, events) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let renderer = Arc::new(Self {
            client,
            name,
            av_transport_url,
            connection_manager_url,
            instance_id: Arc::new(AtomicU32::new(0)),
            tracker: Arc::new(Mutex::new(TransportTracker::new())),
            events,
            cancel: CancellationToken::new(),
        });

        tokio::spawn(watch_transport(
            renderer.client.clone(),
            renderer.av_transport_url.clone(),
            Arc::clone(&renderer.instance_id),
            Arc::clone(&renderer.tracker),
            tx,
            renderer.cancel.clone(),
            poll_interval,
        ));

        Ok(renderer)
    }

    /// Negotiates a connection and returns its AVTransport instance.
    ///
    /// Most renderers do not implement `PrepareForConnection`; any failure
    /// falls back to instance 0.
    async fn prepare_connection(&self, content_type: &str) -> u32 {
        let Some(url) = self.connection_manager_url.as_deref() else {
            return 0;
        };

        let result = SoapRequestBuilder::new(&self.client, url)
            .service(UpnpService::ConnectionManager)
            .action("PrepareForConnection")
            .arg("RemoteProtocolInfo", format!("http-get:*:{}:*", content_type))
            .arg("PeerConnectionManager", "")
            .arg("PeerConnectionID", "-1")
            .arg("Direction", "Input")
            .send()
            .await;

        match result {
            Ok(body) => extract_xml_text(&body, "AVTransportID")
                .and_then(|id| id.trim().parse::<i64>().ok())
                .and_then(|id| u32::try_from(id).ok())
                .unwrap_or(0),
            Err(e) => {
                log::debug!(
                    "[Renderer] PrepareForConnection unsupported, using instance 0: {}",
                    e
                );
                0
            }
        }
    }

    async fn transport_command(&self, action: &str, extra: &[(&str, &str)]) -> RendererResult<()> {
        let instance = self.instance_id.load(Ordering::Acquire);
        with_retry(action, || {
            let mut request = SoapRequestBuilder::new(&self.client, &self.av_transport_url)
                .service(UpnpService::AVTransport)
                .action(action)
                .instance_id(instance);
            for (k, v) in extra {
                request = request.arg(*k, *v);
            }
            request.send()
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RendererControl for UpnpRenderer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self, url: &str, options: &LoadOptions) -> RendererResult<()> {
        let instance = self.prepare_connection(&options.content_type).await;
        self.instance_id.store(instance, Ordering::Release);
        self.tracker.lock().reset();

        let didl = format_didl_lite(url, options);
        log::info!(
            "[Renderer] Loading {} ({}) on {:?}",
            url,
            options.content_type,
            self.name
        );

        self.transport_command(
            "SetAVTransportURI",
            &[("CurrentURI", url), ("CurrentURIMetaData", didl.as_str())],
        )
        .await?;

        if options.autoplay {
            self.play().await?;
        }
        Ok(())
    }

    async fn play(&self) -> RendererResult<()> {
        self.transport_command("Play", &[("Speed", "1")]).await
    }

    async fn pause(&self) -> RendererResult<()> {
        self.transport_command("Pause", &[]).await
    }

    async fn stop(&self) -> RendererResult<()> {
        self.transport_command("Stop", &[]).await
    }

    fn subscribe(&self) -> broadcast::Receiver<RendererEvent> {
        self.events.resubscribe()
    }

    fn close(&self) {
        if !self.cancel.is_cancelled() {
            log::debug!("[Renderer] Closing {:?}", self.name);
            self.cancel.cancel();
        }
    }
}

impl Drop for UpnpRenderer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn get_transport_info(
    client: &Client,
    control_url: &str,
    instance: u32,
) -> SoapResult<TransportStatus> {
    let body = SoapRequestBuilder::new(client, control_url)
        .service(UpnpService::AVTransport)
        .action("GetTransportInfo")
        .instance_id(instance)
        .send()
        .await?;
    Ok(parse_transport_info(&body))
}

/// Polls transport status until cancelled or the renderer stops answering.
///
/// Owns the only event sender, so subscribers see the channel close when
/// this task ends.
async fn watch_transport(
    client: Client,
    control_url: String,
    instance_id: Arc<AtomicU32>,
    tracker: Arc<Mutex<TransportTracker>>,
    events: broadcast::Sender<RendererEvent>,
    cancel: CancellationToken,
    poll_interval: Duration,
) {
    let mut failures = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }

        let generation = tracker.lock().generation();
        let instance = instance_id.load(Ordering::Acquire);
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            r = get_transport_info(&client, &control_url, instance) => r,
        };

        match result {
            Ok(status) => {
                failures = 0;
                let emitted = tracker.lock().observe(generation, &status);
                for event in emitted {
                    log::debug!("[Renderer] Status: {}", event);
                    // No subscribers is fine; the session may not be listening yet.
                    let _ = events.send(event);
                }
            }
            Err(e) => {
                failures += 1;
                log::warn!(
                    "[Renderer] Status poll failed ({}/{}): {}",
                    failures,
                    MAX_POLL_FAILURES,
                    e
                );
                if failures >= MAX_POLL_FAILURES {
                    log::error!("[Renderer] Lost contact with renderer at {}", control_url);
                    break;
                }
            }
        }
    }

    log::debug!("[Renderer] Status watcher stopped");
}

/// Connects [`UpnpRenderer`]s with a shared HTTP client.
#[derive(Clone)]
pub struct UpnpConnector {
    client: Client,
    poll_interval: Duration,
}

impl UpnpConnector {
    /// Creates a connector whose renderers poll status every `poll_interval`.
    #[must_use]
    pub fn new(client: Client, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }
}

#[async_trait]
impl RendererConnector for UpnpConnector {
    async fn connect(&self, location: &str) -> RendererResult<Arc<dyn RendererControl>> {
        let renderer =
            UpnpRenderer::connect(self.client.clone(), location, self.poll_interval).await?;
        Ok(renderer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{MediaKind, MediaMetadata};
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::Router;

    #[derive(Clone, Default)]
    struct MockDevice {
        actions: Arc<Mutex<Vec<String>>>,
        bodies: Arc<Mutex<Vec<String>>>,
        transport_state: Arc<Mutex<String>>,
    }

    const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0"><device>
<friendlyName>Mock TV</friendlyName>
<serviceList>
<service><serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType><controlURL>/ctl/avt</controlURL></service>
<service><serviceType>urn:schemas-upnp-org:service:ConnectionManager:1</serviceType><controlURL>/ctl/cm</controlURL></service>
</serviceList></device></root>"#;

    fn soap_action(headers: &HeaderMap) -> String {
        headers
            .get("SOAPAction")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim_matches('"').rsplit('#').next())
            .unwrap_or_default()
            .to_string()
    }

    async fn av_transport(
        State(device): State<MockDevice>,
        headers: HeaderMap,
        body: String,
    ) -> (StatusCode, String) {
        let action = soap_action(&headers);
        if action == "GetTransportInfo" {
            let state = device.transport_state.lock().clone();
            return (
                StatusCode::OK,
                format!(
                    "<s:Envelope><s:Body><u:GetTransportInfoResponse><CurrentTransportState>{}</CurrentTransportState><CurrentSpeed>1</CurrentSpeed></u:GetTransportInfoResponse></s:Body></s:Envelope>",
                    state
                ),
            );
        }
        device.actions.lock().push(action.clone());
        device.bodies.lock().push(body);
        (
            StatusCode::OK,
            format!("<s:Envelope><s:Body><u:{}Response/></s:Body></s:Envelope>", action),
        )
    }

    async fn connection_manager() -> (StatusCode, &'static str) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "<s:Envelope><s:Body><s:Fault><faultstring>UPnPError</faultstring><detail><UPnPError><errorCode>401</errorCode><errorDescription>Invalid Action</errorDescription></UPnPError></detail></s:Fault></s:Body></s:Envelope>",
        )
    }

    async fn spawn_device(device: MockDevice) -> String {
        let app = Router::new()
            .route("/dmr", get(|| async { DESCRIPTION }))
            .route("/ctl/avt", post(av_transport))
            .route("/ctl/cm", post(connection_manager))
            .with_state(device);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/dmr", addr)
    }

    async fn next_event(rx: &mut broadcast::Receiver<RendererEvent>) -> RendererEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    #[tokio::test]
    async fn load_sets_uri_then_plays_and_reports_status() {
        let device = MockDevice::default();
        *device.transport_state.lock() = "STOPPED".to_string();
        let location = spawn_device(device.clone()).await;

        let renderer = UpnpRenderer::connect(Client::new(), &location, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(renderer.name(), "Mock TV");

        let mut events = renderer.subscribe();
        let options = LoadOptions {
            autoplay: true,
            content_type: "video/mp4".to_string(),
            metadata: MediaMetadata {
                title: Some("Clip".to_string()),
                creator: None,
                kind: MediaKind::Video,
            },
        };
        renderer
            .load("http://10.0.0.2:9999/video.mp4", &options)
            .await
            .unwrap();

        assert_eq!(
            *device.actions.lock(),
            vec!["SetAVTransportURI".to_string(), "Play".to_string()]
        );
        let set_uri = device.bodies.lock()[0].clone();
        assert!(set_uri.contains("<InstanceID>0</InstanceID>"));
        assert!(set_uri.contains("<CurrentURI>http://10.0.0.2:9999/video.mp4</CurrentURI>"));
        assert!(set_uri.contains("object.item.videoItem.movie"));

        *device.transport_state.lock() = "PLAYING".to_string();
        assert_eq!(next_event(&mut events).await, RendererEvent::Playing);

        *device.transport_state.lock() = "STOPPED".to_string();
        assert_eq!(next_event(&mut events).await, RendererEvent::Stopped);

        renderer.close();
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Err(broadcast::error::RecvError::Closed) = events.recv().await {
                    break;
                }
            }
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn missing_av_transport_is_rejected() {
        let app = Router::new().route(
            "/dmr",
            get(|| async { "<root><device><friendlyName>Speaker</friendlyName></device></root>" }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let result = UpnpRenderer::connect(
            Client::new(),
            &format!("http://{}/dmr", addr),
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(RendererError::MissingService("AVTransport"))));
    }
}
