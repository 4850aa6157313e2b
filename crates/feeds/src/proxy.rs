//! Rendering proxy client.
//!
//! The monitored pages render their listings client-side, so they are
//! requested through a proxy that executes the page script and returns
//! the final markup.

use crate::error::FetchResult;
use async_trait::async_trait;
use pricewatch_core::MonitoredSource;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Raw proxy reply: HTTP status and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: String,
}

impl ProxyResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Trait for rendering proxy backends.
///
/// Implementations return `Err` only for transport failures (timeout,
/// connection reset). Any HTTP reply, error statuses included, comes back
/// as a [`ProxyResponse`] so the caller owns the retry decision.
#[async_trait]
pub trait RenderProxy: Send + Sync {
    /// Request the rendered markup of a listing page.
    async fn render(&self, source: &MonitoredSource) -> FetchResult<ProxyResponse>;
}

/// ScrapingBee HTML API client.
pub struct ScrapingBeeProxy {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl std::fmt::Debug for ScrapingBeeProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapingBeeProxy")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ScrapingBeeProxy {
    pub const DEFAULT_ENDPOINT: &'static str = "https://app.scrapingbee.com/api/v1/";

    /// Create a client for the given endpoint with a per-request timeout.
    pub fn new(
        api_key: impl Into<String>,
        endpoint: &str,
        timeout: Duration,
    ) -> FetchResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
            api_key: api_key.into(),
        })
    }

    /// Build the proxy request URL. The target URL is form-encoded as a
    /// single opaque parameter.
    pub fn request_url(&self, source: &MonitoredSource) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("api_key", &self.api_key)
            .append_pair("url", source.url())
            .append_pair("render_js", "true");
        url
    }
}

#[async_trait]
impl RenderProxy for ScrapingBeeProxy {
    async fn render(&self, source: &MonitoredSource) -> FetchResult<ProxyResponse> {
        debug!(source = %source, "Requesting rendered page");

        let response = self.client.get(self.request_url(source)).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(ProxyResponse { status, body })
    }
}
