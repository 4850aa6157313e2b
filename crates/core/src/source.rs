//! Monitored listing pages and their canonical identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Errors raised while turning configured text into a [`MonitoredSource`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Invalid source URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported URL scheme {scheme} in {url}")]
    UnsupportedScheme { url: String, scheme: String },
}

/// Strip the query and fragment from a listing URL.
///
/// Sort orders and filter selections live in those components, so two
/// URLs that only differ there point at the same listing page.
pub fn normalize_url(raw: &str) -> Result<String, SourceError> {
    let raw = raw.trim();
    let mut url = Url::parse(raw).map_err(|e| SourceError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(SourceError::UnsupportedScheme {
            url: raw.to_string(),
            scheme: url.scheme().to_string(),
        });
    }

    url.set_query(None);
    url.set_fragment(None);
    Ok(url.into())
}

/// A listing page under watch, identified by its normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonitoredSource {
    url: String,
}

impl MonitoredSource {
    /// Parse and normalize a configured URL.
    pub fn parse(raw: &str) -> Result<Self, SourceError> {
        Ok(Self {
            url: normalize_url(raw)?,
        })
    }

    /// The canonical URL used for proxy requests and alert links.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for MonitoredSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl TryFrom<String> for MonitoredSource {
    type Error = SourceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MonitoredSource> for String {
    fn from(source: MonitoredSource) -> Self {
        source.url
    }
}
