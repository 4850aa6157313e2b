//! Application configuration.
//!
//! Secrets come from the environment; everything else from an optional
//! JSON file. Any error here stops the process before monitoring starts.

use pricewatch_alerts::{AlertPolicy, WindowPolicy};
use pricewatch_core::{MonitoredSource, PriceCeiling, SourceError};
use pricewatch_feeds::{ExtractError, FetchError, PriceExtractor, RetryPolicy, ScrapingBeeProxy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const BOT_TOKEN_VAR: &str = "BOT_TOKEN";
pub const CHAT_ID_VAR: &str = "CHAT_ID";
pub const PROXY_API_KEY_VAR: &str = "SCRAPINGBEE_API_KEY";
pub const SOURCE_URLS_VAR: &str = "SOURCE_URLS";

/// Upper bound for every duration setting (30 days).
pub const MAX_SETTING_SECS: u64 = 30 * 24 * 3600;

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variables: {}", .0.join(", "))]
    MissingVars(Vec<&'static str>),

    #[error("CHAT_ID must be an integer, got {0:?}")]
    InvalidChatId(String),

    #[error("Failed to read config file {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("No sources configured (set \"sources\" in the config file or SOURCE_URLS)")]
    NoSources,

    #[error(transparent)]
    InvalidSource(#[from] SourceError),

    #[error(transparent)]
    InvalidSelector(#[from] ExtractError),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Rendering proxy setup failed: {0}")]
    Proxy(#[from] FetchError),
}

/// Required secrets.
#[derive(Clone)]
pub struct Credentials {
    pub bot_token: String,
    pub chat_id: i64,
    pub proxy_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("proxy_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through a variable lookup. Empty values count as
    /// missing; every missing variable is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = read(BOT_TOKEN_VAR);
        let chat_id = read(CHAT_ID_VAR);
        let proxy_api_key = read(PROXY_API_KEY_VAR);

        let missing: Vec<&'static str> = [
            (BOT_TOKEN_VAR, bot_token.is_none()),
            (CHAT_ID_VAR, chat_id.is_none()),
            (PROXY_API_KEY_VAR, proxy_api_key.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        match (bot_token, chat_id, proxy_api_key) {
            (Some(bot_token), Some(chat_id), Some(proxy_api_key)) => {
                let chat_id = chat_id
                    .parse::<i64>()
                    .map_err(|_| ConfigError::InvalidChatId(chat_id.clone()))?;
                Ok(Self {
                    bot_token,
                    chat_id,
                    proxy_api_key,
                })
            }
            _ => Err(ConfigError::MissingVars(missing)),
        }
    }
}

/// Price extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    /// CSS selector matching one price element per listing.
    pub selector: String,
    /// Prefix a price must start with to be parsed.
    pub currency_symbol: String,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            selector: PriceExtractor::DEFAULT_SELECTOR.to_string(),
            currency_symbol: PriceExtractor::DEFAULT_CURRENCY_SYMBOL.to_string(),
        }
    }
}

/// Rendering proxy retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per fetch when the proxy returns 5xx.
    pub max_attempts: u32,
    /// Seconds between attempts.
    pub delay_secs: u64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_secs: 10,
            request_timeout_secs: 120,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy {
            max_attempts: settings.max_attempts,
            delay: Duration::from_secs(settings.delay_secs),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listing page URLs to monitor.
    pub sources: Vec<String>,
    /// Seconds to sleep between cycles.
    pub poll_interval_secs: u64,
    /// Highest price that triggers an alert.
    pub price_ceiling: PriceCeiling,
    pub extractor: ExtractorSettings,
    pub retry: RetrySettings,
    pub alerts: AlertPolicy,
    /// Rendering proxy endpoint.
    pub proxy_base_url: String,
    /// Warn the chat when the proxy rejects a request (bad key, bad request).
    pub notify_on_proxy_rejection: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            poll_interval_secs: 300,
            price_ceiling: PriceCeiling::default(),
            extractor: ExtractorSettings::default(),
            retry: RetrySettings::default(),
            alerts: AlertPolicy::default(),
            proxy_base_url: ScrapingBeeProxy::DEFAULT_ENDPOINT.to_string(),
            notify_on_proxy_rejection: true,
        }
    }
}

impl AppConfig {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject durations that would busy-loop the proxy or overflow timers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let window_secs = match self.alerts.window {
            WindowPolicy::Hourly => None,
            WindowPolicy::Elapsed { secs } => Some(secs),
        };
        let checks = [
            ("poll_interval_secs", Some(self.poll_interval_secs), 1),
            ("retry.request_timeout_secs", Some(self.retry.request_timeout_secs), 1),
            ("retry.delay_secs", Some(self.retry.delay_secs), 0),
            ("alerts.cooldown_secs", Some(self.alerts.cooldown_secs), 0),
            ("alerts.window.secs", window_secs, 1),
        ];

        for (name, value, min) in checks {
            if let Some(value) = value {
                if !(min..=MAX_SETTING_SECS).contains(&value) {
                    return Err(ConfigError::InvalidSetting(format!(
                        "{} must be between {} and {}, got {}",
                        name, min, MAX_SETTING_SECS, value
                    )));
                }
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Replace the source list with a comma separated override, if set.
    pub fn apply_source_override(&mut self, value: Option<String>) {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.sources = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    /// Normalize the configured URLs, dropping duplicates that only differ
    /// in query or fragment.
    pub fn monitored_sources(&self) -> Result<Vec<MonitoredSource>, ConfigError> {
        let mut sources: Vec<MonitoredSource> = Vec::with_capacity(self.sources.len());
        for raw in &self.sources {
            let source = MonitoredSource::parse(raw)?;
            if sources.contains(&source) {
                warn!(source = %source, "Duplicate source ignored");
                continue;
            }
            sources.push(source);
        }

        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        Ok(sources)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.retry.request_timeout_secs)
    }

    pub fn build_extractor(&self) -> Result<PriceExtractor, ConfigError> {
        Ok(PriceExtractor::new(
            &self.extractor.selector,
            &self.extractor.currency_symbol,
        )?)
    }
}
