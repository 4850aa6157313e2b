//! Error types for fetch and extraction operations.

use thiserror::Error;

/// Errors that can occur while retrieving a listing page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Rendering proxy returned HTTP {status} after {attempts} attempts")]
    TransientProxyFailure { status: u16, attempts: u32 },

    #[error("Rendering proxy rejected request with HTTP {status}: {body}")]
    NonTransientProxyFailure { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid proxy endpoint: {0}")]
    InvalidEndpoint(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        FetchError::InvalidEndpoint(err.to_string())
    }
}

impl FetchError {
    /// Returns true if the proxy was failing server-side and a later cycle
    /// is likely to succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::TransientProxyFailure { .. } | FetchError::Network(_)
        )
    }

    /// Returns true if the failure needs operator attention (bad API key,
    /// malformed request) and will repeat every cycle until fixed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            FetchError::NonTransientProxyFailure { .. } | FetchError::InvalidEndpoint(_)
        )
    }
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors raised while building a [`crate::PriceExtractor`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Invalid price selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
}
