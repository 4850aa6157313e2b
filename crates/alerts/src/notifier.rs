//! Notification delivery seam and message formatting.

use crate::state::{AlertSummary, QuietWindow};
use async_trait::async_trait;
use pricewatch_core::{MonitoredSource, PriceCeiling};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// A text message, optionally carrying a link to the listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub link: Option<String>,
}

impl Notification {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: None,
        }
    }

    pub fn with_link(text: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: Some(link.into()),
        }
    }
}

/// Trait for notification channels.
///
/// Callers log and drop delivery errors; a lost message must never stop
/// the monitor.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Format a qualifying-price alert for a source.
pub fn format_alert(
    summary: &AlertSummary,
    source: &MonitoredSource,
    ceiling: PriceCeiling,
    currency_symbol: &str,
) -> Notification {
    let cheapest = summary.cheapest.display_with(currency_symbol);

    let text = if summary.count == 1 {
        format!("🎟️ Ticket found for {}", cheapest)
    } else {
        let mut prices: Vec<String> = summary
            .sample
            .iter()
            .map(|a| a.display_with(currency_symbol))
            .collect();
        if summary.count > summary.sample.len() {
            prices.push(format!("+{} more", summary.count - summary.sample.len()));
        }
        format!(
            "🎟️ {} tickets at or below {}{}\nCheapest: {}\nPrices: {}",
            summary.count,
            currency_symbol,
            ceiling.0,
            cheapest,
            prices.join(", ")
        )
    };

    Notification::with_link(text, source.url())
}

/// Format the "still searching" heartbeat for a window with no results.
pub fn format_heartbeat(
    window: &QuietWindow,
    source_count: usize,
    ceiling: PriceCeiling,
    currency_symbol: &str,
) -> Notification {
    Notification::plain(format!(
        "🔍 Still searching: no tickets at or below {}{} at {} monitored {} between {} and {} UTC",
        currency_symbol,
        ceiling.0,
        source_count,
        if source_count == 1 { "page" } else { "pages" },
        window.started_at.format("%H:%M"),
        window.ended_at.format("%H:%M"),
    ))
}
