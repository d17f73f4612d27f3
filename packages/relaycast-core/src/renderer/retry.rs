//! Retry logic for transient SOAP errors.
//!
//! Provides backoff for SOAP requests that fail with transient faults
//! (701, 714, 716) or timeouts.

use std::future::Future;
use std::time::Duration;

use super::soap::SoapResult;

/// Retry delays for transient SOAP errors.
const RETRY_DELAYS_MS: [u64; 3] = [200, 500, 1000];

/// Executes a SOAP request, retrying transient failures after 200ms, 500ms
/// and 1000ms before giving up.
///
/// # Arguments
/// * `action` - Action name for logging
/// * `operation` - Closure that performs the SOAP request
pub(crate) async fn with_retry<F, Fut>(action: &str, mut operation: F) -> SoapResult<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SoapResult<String>>,
{
    let mut delays = RETRY_DELAYS_MS.iter().enumerate();
    loop {
        match operation().await {
            Ok(r) => return Ok(r),
            Err(e) if e.is_transient() => {
                let Some((attempt, &delay_ms)) = delays.next() else {
                    return Err(e);
                };
                log::warn!("[Renderer] {} transient error: {}", action, e);
                log::info!(
                    "[Renderer] Retrying {} (attempt {}/{}) after {}ms",
                    action,
                    attempt + 2,
                    RETRY_DELAYS_MS.len() + 1,
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
