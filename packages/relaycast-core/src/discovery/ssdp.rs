//! SSDP transport for media renderer discovery.
//!
//! Supports both multicast (239.255.255.250) and broadcast discovery methods
//! for networks with different multicast configurations.
//!
//! # Discovery Methods
//!
//! - **Multicast**: Standard SSDP M-SEARCH to 239.255.255.250:1900
//! - **Broadcast**: Directed broadcast per interface + limited broadcast fallback
//!
//! Both methods use the same socket for send AND receive since devices reply
//! unicast back to the sending socket/port.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use local_ip_address::list_afinet_netifas;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::types::{is_virtual_interface, DiscoveryError, DiscoveryMethod, DiscoveryResult, SsdpResponse};

// ─────────────────────────────────────────────────────────────────────────────
// ASCII Case-Insensitive Helpers
// ─────────────────────────────────────────────────────────────────────────────
//
// These avoid allocations from to_lowercase() during SSDP response parsing.
// HTTP headers are ASCII, so byte-level comparison is safe.

/// Checks if `s` starts with `prefix` (ASCII case-insensitive, no allocation).
#[inline]
fn starts_with_ignore_ascii_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Returns the trimmed value of header `name` (ASCII case-insensitive).
///
/// Splits on the first colon so URL colons in the value are preserved.
fn header_value<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim().len() == name.len() && starts_with_ignore_ascii_case(key.trim(), name))
            .then(|| value.trim())
    })
}

// ─────────────────────────────────────────────────────────────────────────────

/// Standard SSDP multicast address and port (protocol specification).
const MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// Limited broadcast address for fallback.
const LIMITED_BROADCAST_ADDR: &str = "255.255.255.255:1900";

/// Capacity of the parsed-response channel.
const RESPONSE_CHANNEL_CAPACITY: usize = 64;

/// Pauses after consecutive receive errors; one more error ends the loop.
const RECV_ERROR_DELAYS_MS: [u64; 3] = [100, 500, 1000];

/// Build the M-SEARCH message.
///
/// Note: HOST header always uses the multicast address per SSDP spec,
/// even when sending via broadcast.
pub fn build_msearch_message(search_target: &str, mx: u64) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: 239.255.255.250:1900\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\r\n",
        mx, search_target
    )
}

/// Parses an SSDP search response.
///
/// Returns None for anything that is not a `200` search response carrying a
/// `LOCATION` header (other hosts' M-SEARCH echoes, NOTIFY traffic, garbage).
pub fn parse_ssdp_response(response: &str, src_ip: &str) -> Option<SsdpResponse> {
    let status_line = response.lines().next()?;
    if !starts_with_ignore_ascii_case(status_line, "HTTP/") || !status_line.contains(" 200") {
        return None;
    }

    let location = header_value(response, "location").filter(|l| !l.is_empty())?;

    Some(SsdpResponse {
        ip: src_ip.to_string(),
        server: header_value(response, "server")
            .unwrap_or_default()
            .to_string(),
        location: location.to_string(),
        usn: header_value(response, "usn").map(str::to_string),
        st: header_value(response, "st").map(str::to_string),
    })
}

/// Network interface information for discovery.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    /// Interface name (e.g., "en0", "eth0").
    pub name: String,
    /// IPv4 address bound to this interface.
    pub ip: Ipv4Addr,
    /// Broadcast address for this interface (if available).
    pub broadcast: Option<Ipv4Addr>,
}

/// Gets all usable network interfaces for discovery.
///
/// Filters out virtual/container interfaces and loopback.
pub fn get_interfaces() -> Vec<InterfaceInfo> {
    list_afinet_netifas()
        .unwrap_or_else(|e| {
            log::warn!("Failed to list network interfaces: {}", e);
            Vec::new()
        })
        .into_iter()
        .filter_map(|(name, addr)| {
            if is_virtual_interface(&name) {
                log::debug!("Skipping virtual interface: {}", name);
                return None;
            }
            match addr {
                IpAddr::V4(ipv4) if !ipv4.is_loopback() => {
                    log::debug!("Using interface {} ({})", name, ipv4);
                    // Netmask is not reported; assume /24.
                    let octets = ipv4.octets();
                    let broadcast = Ipv4Addr::new(octets[0], octets[1], octets[2], 255);
                    Some(InterfaceInfo {
                        name,
                        ip: ipv4,
                        broadcast: Some(broadcast),
                    })
                }
                _ => None,
            }
        })
        .collect()
}

/// Creates a UDP socket bound to a specific interface.
///
/// Sets up socket options for SSDP discovery:
/// - SO_REUSEADDR for rapid restarts
/// - SO_REUSEPORT on Unix
/// - Multicast TTL of 4 per UPnP spec
/// - SO_BROADCAST for broadcast mode
fn create_socket(iface_ip: Ipv4Addr, enable_broadcast: bool) -> Result<UdpSocket, DiscoveryError> {
    let bind_addr = SocketAddr::new(IpAddr::V4(iface_ip), 0);

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(DiscoveryError::SocketBind)?;

    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("Failed to set SO_REUSEADDR on {}: {}", iface_ip, e);
    }

    #[cfg(unix)]
    if let Err(e) = socket.set_reuse_port(true) {
        log::warn!("Failed to set SO_REUSEPORT on {}: {}", iface_ip, e);
    }

    // UPnP 1.0 recommends TTL 4 for SSDP multicast
    if let Err(e) = socket.set_multicast_ttl_v4(4) {
        log::warn!("Failed to set multicast TTL on {}: {}", iface_ip, e);
    }

    if enable_broadcast {
        if let Err(e) = socket.set_broadcast(true) {
            log::warn!("Failed to set SO_BROADCAST on {}: {}", iface_ip, e);
        }
    }

    socket
        .set_nonblocking(true)
        .map_err(DiscoveryError::SocketBind)?;

    socket
        .bind(&bind_addr.into())
        .map_err(DiscoveryError::SocketBind)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(DiscoveryError::SocketBind)
}

/// Configuration for the UDP SSDP transport.
#[derive(Debug, Clone)]
pub struct SsdpConfig {
    /// MX value (max response delay in seconds).
    pub mx_value: u64,
    /// Send searches to the multicast group.
    pub multicast: bool,
    /// Send searches as directed and limited broadcasts.
    pub broadcast: bool,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            mx_value: 1,
            multicast: true,
            broadcast: false,
        }
    }
}

/// Sends SSDP searches and yields parsed responses.
///
/// Abstracts the UDP sockets so discovery orchestration can be tested
/// without a network.
#[async_trait]
pub trait SsdpTransport: Send + Sync {
    /// Sends one M-SEARCH for `search_target`.
    async fn search(&self, search_target: &str) -> DiscoveryResult<()>;

    /// Waits for the next response. Returns None once the transport is closed.
    async fn next_response(&self) -> Option<SsdpResponse>;

    /// Stops receiving and releases the sockets.
    fn close(&self);
}

#[derive(Clone)]
struct BoundSocket {
    iface: InterfaceInfo,
    socket: Arc<UdpSocket>,
    targets: Vec<(String, DiscoveryMethod)>,
}

/// SSDP over UDP, one socket per usable interface.
pub struct UdpSsdpTransport {
    sockets: parking_lot::Mutex<Vec<BoundSocket>>,
    mx_value: u64,
    responses: Mutex<mpsc::Receiver<SsdpResponse>>,
    cancel: CancellationToken,
}

impl UdpSsdpTransport {
    /// Binds sockets on every usable interface and starts their receive loops.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::NoInterfaces`] if no socket could be bound.
    pub fn bind(config: &SsdpConfig) -> DiscoveryResult<Self> {
        let interfaces = get_interfaces();
        if interfaces.is_empty() {
            return Err(DiscoveryError::NoInterfaces);
        }

        let mut sockets = Vec::new();

        for iface in interfaces {
            let socket = match create_socket(iface.ip, config.broadcast) {
                Ok(socket) => Arc::new(socket),
                Err(e) => {
                    log::warn!(
                        "Failed to create socket for {} ({}): {}",
                        iface.name,
                        iface.ip,
                        e
                    );
                    continue;
                }
            };

            let mut targets = Vec::new();
            if config.multicast {
                targets.push((MULTICAST_ADDR.to_string(), DiscoveryMethod::SsdpMulticast));
            }
            if config.broadcast {
                if let Some(broadcast) = iface.broadcast {
                    targets.push((format!("{}:1900", broadcast), DiscoveryMethod::SsdpBroadcast));
                }
                targets.push((
                    LIMITED_BROADCAST_ADDR.to_string(),
                    DiscoveryMethod::SsdpBroadcast,
                ));
            }

            sockets.push(BoundSocket {
                iface,
                socket,
                targets,
            });
        }

        if sockets.is_empty() {
            return Err(DiscoveryError::NoInterfaces);
        }

        let names: Vec<_> = sockets
            .iter()
            .map(|s| format!("{} ({})", s.iface.name, s.iface.ip))
            .collect();
        log::debug!(
            "[Discovery] SSDP bound on {} interface(s): {:?}",
            sockets.len(),
            names
        );

        Ok(Self::start(sockets, config.mx_value))
    }

    fn start(sockets: Vec<BoundSocket>, mx_value: u64) -> Self {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        for bound in &sockets {
            spawn_recv_loop(
                bound.iface.clone(),
                Arc::clone(&bound.socket),
                tx.clone(),
                cancel.clone(),
            );
        }

        Self {
            sockets: parking_lot::Mutex::new(sockets),
            mx_value,
            responses: Mutex::new(rx),
            cancel,
        }
    }
}

/// Delay before the next receive after `consecutive` failed ones, or None to stop.
fn recv_error_delay(consecutive: usize) -> Option<Duration> {
    consecutive
        .checked_sub(1)
        .and_then(|i| RECV_ERROR_DELAYS_MS.get(i))
        .map(|&ms| Duration::from_millis(ms))
}

fn spawn_recv_loop(
    iface: InterfaceInfo,
    socket: Arc<UdpSocket>,
    tx: mpsc::Sender<SsdpResponse>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        let mut failures = 0usize;
        log::trace!("[Discovery] Recv loop starting on {} ({})", iface.name, iface.ip);

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                r = socket.recv_from(&mut buf) => r,
            };

            match received {
                Ok((amt, src)) => {
                    failures = 0;
                    let text = String::from_utf8_lossy(&buf[..amt]);
                    if let Some(response) = parse_ssdp_response(&text, &src.ip().to_string()) {
                        log::trace!(
                            "[Discovery] Response from {} via {}: server={:?}",
                            response.ip,
                            iface.name,
                            response.server
                        );
                        if tx.send(response).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    log::warn!(
                        "[Discovery] Socket recv error on {} ({}): {}",
                        iface.name,
                        iface.ip,
                        e
                    );
                    let Some(delay) = recv_error_delay(failures) else {
                        log::warn!(
                            "[Discovery] Giving up on {} after {} recv errors",
                            iface.name,
                            failures
                        );
                        break;
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        log::trace!("[Discovery] Recv loop finished on {} ({})", iface.name, iface.ip);
    });
}

#[async_trait]
impl SsdpTransport for UdpSsdpTransport {
    async fn search(&self, search_target: &str) -> DiscoveryResult<()> {
        if self.cancel.is_cancelled() {
            return Err(DiscoveryError::Closed);
        }

        let msg = build_msearch_message(search_target, self.mx_value);
        let sockets = self.sockets.lock().clone();
        let mut sent = 0usize;
        let mut last_error = None;

        for bound in &sockets {
            for (target, method) in &bound.targets {
                match bound.socket.send_to(msg.as_bytes(), target.as_str()).await {
                    Ok(_) => {
                        sent += 1;
                        log::trace!(
                            "[{}] Sent M-SEARCH from {} to {}",
                            method,
                            bound.iface.ip,
                            target
                        );
                    }
                    Err(e) => {
                        log::warn!(
                            "[{}] Failed to send M-SEARCH on {} to {}: {}",
                            method,
                            bound.iface.name,
                            target,
                            e
                        );
                        last_error = Some(e);
                    }
                }
            }
        }

        match (sent, last_error) {
            (0, Some(e)) => Err(DiscoveryError::SendSearch(e)),
            _ => Ok(()),
        }
    }

    async fn next_response(&self) -> Option<SsdpResponse> {
        let mut responses = self.responses.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            r = responses.recv() => r,
        }
    }

    fn close(&self) {
        if !self.cancel.is_cancelled() {
            log::debug!("[Discovery] Closing SSDP sockets");
            self.cancel.cancel();
        }
        self.sockets.lock().clear();
    }
}

impl Drop for UdpSsdpTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_msearch_message() {
        let msg = build_msearch_message("urn:schemas-upnp-org:device:MediaRenderer:1", 1);
        assert!(msg.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(msg.contains("HOST: 239.255.255.250:1900"));
        assert!(msg.contains("MAN: \"ssdp:discover\""));
        assert!(msg.contains("MX: 1"));
        assert!(msg.contains("ST: urn:schemas-upnp-org:device:MediaRenderer:1"));
        assert!(msg.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_parse_ssdp_response_valid() {
        let response = "HTTP/1.1 200 OK\r\n\
CACHE-CONTROL: max-age=1800\r\n\
LOCATION: http://192.168.1.20:9197/dmr\r\n\
SERVER: SHP, UPnP/1.0, Samsung UPnP SDK/1.0\r\n\
ST: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
USN: uuid:0f4e2b9a::urn:schemas-upnp-org:device:MediaRenderer:1\r\n\r\n";

        let parsed = parse_ssdp_response(response, "192.168.1.20").unwrap();

        assert_eq!(parsed.location, "http://192.168.1.20:9197/dmr");
        assert_eq!(parsed.server, "SHP, UPnP/1.0, Samsung UPnP SDK/1.0");
        assert_eq!(
            parsed.st.as_deref(),
            Some("urn:schemas-upnp-org:device:MediaRenderer:1")
        );
        assert!(parsed.usn.unwrap().starts_with("uuid:0f4e2b9a"));
    }

    #[test]
    fn test_parse_ssdp_response_case_insensitive() {
        let response = "HTTP/1.1 200 OK\r\n\
location: http://10.0.0.7:1400/xml/device_description.xml\r\n\
server: Linux UPnP/1.0 Sonos/63.2\r\n\r\n";

        let parsed = parse_ssdp_response(response, "10.0.0.7").unwrap();

        assert_eq!(
            parsed.location,
            "http://10.0.0.7:1400/xml/device_description.xml"
        );
        assert_eq!(parsed.server, "Linux UPnP/1.0 Sonos/63.2");
    }

    #[test]
    fn test_parse_ssdp_response_missing_server_is_empty() {
        let response = "HTTP/1.1 200 OK\r\nLOCATION: http://10.0.0.7/desc.xml\r\n\r\n";
        let parsed = parse_ssdp_response(response, "10.0.0.7").unwrap();
        assert_eq!(parsed.server, "");
    }

    #[test]
    fn test_parse_ssdp_rejects_requests_and_locationless_responses() {
        let search = build_msearch_message("ssdp:all", 1);
        assert!(parse_ssdp_response(&search, "10.0.0.2").is_none());

        let notify = "NOTIFY * HTTP/1.1\r\nLOCATION: http://10.0.0.7/d.xml\r\n\r\n";
        assert!(parse_ssdp_response(notify, "10.0.0.7").is_none());

        let no_location = "HTTP/1.1 200 OK\r\nSERVER: Samsung\r\n\r\n";
        assert!(parse_ssdp_response(no_location, "10.0.0.7").is_none());
    }

    #[test]
    fn test_header_value_requires_exact_name() {
        let response = "HTTP/1.1 200 OK\r\nX-ST: nope\r\nST: yes\r\n";
        assert_eq!(header_value(response, "st"), Some("yes"));
    }

    fn loopback_transport() -> (UdpSsdpTransport, std::sync::Weak<UdpSocket>) {
        let iface = InterfaceInfo {
            name: "lo".to_string(),
            ip: Ipv4Addr::LOCALHOST,
            broadcast: None,
        };
        let socket = Arc::new(create_socket(iface.ip, false).unwrap());
        let weak = Arc::downgrade(&socket);
        let bound = BoundSocket {
            iface,
            socket,
            targets: Vec::new(),
        };
        (UdpSsdpTransport::start(vec![bound], 1), weak)
    }

    #[tokio::test]
    async fn test_close_releases_sockets() {
        let (transport, socket) = loopback_transport();
        assert_eq!(transport.sockets.lock().len(), 1);

        transport.close();
        assert!(transport.sockets.lock().is_empty());

        // The receive loop holds the last reference until it observes the cancel.
        tokio::time::timeout(Duration::from_secs(1), async {
            while socket.upgrade().is_some() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("socket still held after close");

        assert!(matches!(
            transport.search("ssdp:all").await,
            Err(DiscoveryError::Closed)
        ));
        assert!(transport.next_response().await.is_none());
    }

    #[tokio::test]
    async fn test_loopback_response_reaches_next_response() {
        let (transport, _) = loopback_transport();
        let addr = transport.sockets.lock()[0].socket.local_addr().unwrap();

        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(
                b"HTTP/1.1 200 OK\r\nLOCATION: http://127.0.0.1/d.xml\r\nSERVER: Samsung\r\n\r\n",
                addr,
            )
            .unwrap();

        let response = tokio::time::timeout(Duration::from_secs(1), transport.next_response())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.ip, "127.0.0.1");
        assert_eq!(response.server, "Samsung");
        transport.close();
    }

    #[test]
    fn test_recv_errors_back_off_then_stop() {
        assert_eq!(recv_error_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(recv_error_delay(3), Some(Duration::from_millis(1000)));
        assert_eq!(recv_error_delay(4), None);
    }

    #[test]
    fn test_starts_with_ignore_ascii_case() {
        assert!(starts_with_ignore_ascii_case("Location: http://...", "location:"));
        assert!(starts_with_ignore_ascii_case("LOCATION: http://...", "location:"));
        assert!(!starts_with_ignore_ascii_case("X-Custom: value", "usn:"));
    }
}
