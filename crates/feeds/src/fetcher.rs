//! Listing page fetcher with bounded retry.

use crate::error::{FetchError, FetchResult};
use crate::proxy::RenderProxy;
use pricewatch_core::MonitoredSource;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest proxy error body kept in a [`FetchError`].
const MAX_ERROR_BODY: usize = 200;

/// Retry policy for proxy server errors (5xx).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per fetch, first try included.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(10),
        }
    }
}

/// Retrieves rendered listing pages through a [`RenderProxy`].
pub struct SourceFetcher {
    proxy: Arc<dyn RenderProxy>,
    retry: RetryPolicy,
}

impl SourceFetcher {
    pub fn new(proxy: Arc<dyn RenderProxy>, retry: RetryPolicy) -> Self {
        Self { proxy, retry }
    }

    /// Fetch the rendered markup of a source.
    ///
    /// Server errors are retried up to `max_attempts` with a fixed delay.
    /// Any other error status and all transport errors fail immediately.
    pub async fn fetch(&self, source: &MonitoredSource) -> FetchResult<String> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let response = self.proxy.render(source).await?;

            if response.is_success() {
                debug!(
                    source = %source,
                    attempt = attempt,
                    bytes = response.body.len(),
                    "Fetched rendered page"
                );
                return Ok(response.body);
            }

            if !response.is_server_error() {
                return Err(FetchError::NonTransientProxyFailure {
                    status: response.status,
                    body: truncate(&response.body, MAX_ERROR_BODY),
                });
            }

            if attempt >= max_attempts {
                return Err(FetchError::TransientProxyFailure {
                    status: response.status,
                    attempts: attempt,
                });
            }

            warn!(
                source = %source,
                status = response.status,
                "Proxy server error, retrying ({}/{})",
                attempt,
                max_attempts
            );
            tokio::time::sleep(self.retry.delay).await;
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
