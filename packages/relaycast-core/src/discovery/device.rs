//! Single-fire renderer discovery.
//!
//! [`DeviceDiscovery`] repeats SSDP searches on an interval until a response
//! whose `SERVER` header contains the configured label arrives. The first such
//! response locks discovery: the query task is cancelled, the transport is
//! closed, and the device is published exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::ssdp::SsdpTransport;
use super::types::{DiscoveredDevice, DiscoveryError, SsdpResponse};
use crate::error::{CastError, CastResult};

/// Accepts the first matching response and rejects everything after it.
struct ReadyLatch {
    label: String,
    locked: AtomicBool,
    cancel: CancellationToken,
    ready_tx: watch::Sender<Option<DiscoveredDevice>>,
}

impl ReadyLatch {
    /// Offers a response. Returns true only for the one response that locks.
    fn offer(&self, response: SsdpResponse) -> bool {
        if self.locked.load(Ordering::Acquire) {
            return false;
        }
        if !response.server.contains(&self.label) {
            log::trace!(
                "[Discovery] Ignoring {} (server {:?})",
                response.ip,
                response.server
            );
            return false;
        }
        // Check-and-set in one step so concurrent matches cannot both fire.
        if self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        log::info!(
            "[Discovery] Found {:?} at {} ({})",
            response.server,
            response.location,
            response.ip
        );
        self.ready_tx.send_replace(Some(response.into()));
        self.cancel.cancel();
        true
    }
}

/// Repeating SSDP search that settles on the first matching renderer.
pub struct DeviceDiscovery {
    label: String,
    transport: Arc<dyn SsdpTransport>,
    latch: Arc<ReadyLatch>,
    cancel: CancellationToken,
    ready_rx: watch::Receiver<Option<DiscoveredDevice>>,
}

impl DeviceDiscovery {
    /// Starts discovery: the first search goes out immediately, then one per
    /// `poll_interval` until a device matches or [`stop`](Self::stop) is called.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        label: impl Into<String>,
        search_target: impl Into<String>,
        poll_interval: Duration,
        transport: Arc<dyn SsdpTransport>,
    ) -> Self {
        let label = label.into();
        let search_target = search_target.into();
        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = watch::channel(None);

        log::info!("[Discovery] Discovering device \"{}\"...", label);

        let latch = Arc::new(ReadyLatch {
            label: label.clone(),
            locked: AtomicBool::new(false),
            cancel: cancel.clone(),
            ready_tx,
        });

        tokio::spawn(query_loop(
            Arc::clone(&transport),
            search_target,
            poll_interval,
            cancel.clone(),
        ));
        tokio::spawn(receive_loop(
            Arc::clone(&transport),
            Arc::clone(&latch),
            cancel.clone(),
        ));

        Self {
            label,
            transport,
            latch,
            cancel,
            ready_rx,
        }
    }

    /// The label responses are matched against.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns true once a device has been accepted.
    pub fn is_locked(&self) -> bool {
        self.latch.locked.load(Ordering::Acquire)
    }

    /// The accepted device, if any.
    pub fn device(&self) -> Option<DiscoveredDevice> {
        self.ready_rx.borrow().clone()
    }

    /// Waits for the ready event.
    ///
    /// With a `timeout`, expiry stops discovery and yields
    /// [`CastError::DeviceNotFound`]. Without one the wait is unbounded.
    pub async fn wait_ready(&self, timeout: Option<Duration>) -> CastResult<DiscoveredDevice> {
        let wait = self.wait_until_settled();
        let settled = match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(settled) => settled,
                Err(_) => {
                    log::warn!(
                        "[Discovery] No device matching \"{}\" after {:?}",
                        self.label,
                        limit
                    );
                    self.stop();
                    return Err(CastError::DeviceNotFound(self.label.clone()));
                }
            },
            None => wait.await,
        };

        settled.ok_or_else(|| DiscoveryError::Closed.into())
    }

    async fn wait_until_settled(&self) -> Option<DiscoveredDevice> {
        let mut rx = self.ready_rx.clone();
        tokio::select! {
            r = rx.wait_for(Option::is_some) => r.ok().and_then(|device| (*device).clone()),
            // Covers stop() before any match; the device is published before cancel.
            _ = self.cancel.cancelled() => self.device(),
        }
    }

    /// Stops searching and releases the transport. Safe to call repeatedly.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            log::debug!("[Discovery] Stopping");
        }
        self.cancel.cancel();
        self.transport.close();
    }
}

impl Drop for DeviceDiscovery {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.transport.close();
    }
}

async fn query_loop(
    transport: Arc<dyn SsdpTransport>,
    search_target: String,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        if let Err(e) = transport.search(&search_target).await {
            log::warn!("[Discovery] Search failed: {}", e);
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
    log::trace!("[Discovery] Query loop finished");
}

async fn receive_loop(
    transport: Arc<dyn SsdpTransport>,
    latch: Arc<ReadyLatch>,
    cancel: CancellationToken,
) {
    loop {
        let response = tokio::select! {
            _ = cancel.cancelled() => break,
            r = transport.next_response() => r,
        };
        match response {
            Some(response) => {
                if latch.offer(response) {
                    break;
                }
            }
            None => break,
        }
    }
    transport.close();
}
