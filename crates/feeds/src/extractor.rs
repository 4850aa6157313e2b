//! Price extraction from rendered listing markup.
//!
//! Price elements are located with a CSS selector supplied by
//! configuration, since the listing site renames its generated class
//! names from time to time.

use crate::error::ExtractError;
use pricewatch_core::Amount;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// Extracts listed prices from rendered HTML.
#[derive(Debug, Clone)]
pub struct PriceExtractor {
    selector: Selector,
    selector_text: String,
    currency_symbol: String,
}

impl PriceExtractor {
    pub const DEFAULT_SELECTOR: &'static str = "span.TicketCard__price___3Oxo2";
    pub const DEFAULT_CURRENCY_SYMBOL: &'static str = "£";

    /// Build an extractor from a CSS selector and the expected currency symbol.
    pub fn new(selector: &str, currency_symbol: &str) -> Result<Self, ExtractError> {
        let parsed = Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            selector: parsed,
            selector_text: selector.to_string(),
            currency_symbol: currency_symbol.to_string(),
        })
    }

    pub fn selector(&self) -> &str {
        &self.selector_text
    }

    pub fn currency_symbol(&self) -> &str {
        &self.currency_symbol
    }

    /// Lazily yield every price in a parsed document.
    ///
    /// Each call walks the document from the start; the extractor keeps no
    /// state between calls.
    pub fn amounts<'a>(&'a self, document: &'a Html) -> impl Iterator<Item = Amount> + 'a {
        document
            .select(&self.selector)
            .filter_map(move |element| self.parse_element(element))
    }

    /// Parse page content and collect its prices in page order.
    ///
    /// Empty content or a selector that matches nothing yields an empty list.
    pub fn extract(&self, content: &str) -> Vec<Amount> {
        if content.trim().is_empty() {
            return Vec::new();
        }
        let document = Html::parse_document(content);
        self.amounts(&document).collect()
    }

    fn parse_element(&self, element: ElementRef<'_>) -> Option<Amount> {
        let text: String = element.text().map(str::trim).collect();
        let amount = parse_price(&text, &self.currency_symbol);
        if amount.is_none() {
            debug!(text = %text, "Ignoring non-price text matched by selector");
        }
        amount
    }
}

/// Parse a price label such as `£1,250` into an [`Amount`].
///
/// Returns `None` unless the text starts with `currency_symbol`. Grouping
/// separators are dropped. A fractional part rounds up to the next whole
/// unit so `£250.50` never passes a ceiling of 250.
pub fn parse_price(text: &str, currency_symbol: &str) -> Option<Amount> {
    let rest = text.trim().strip_prefix(currency_symbol)?;
    let cleaned: String = rest
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{a0}'))
        .collect();

    let (whole, fraction) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), ""));
    if whole.is_empty()
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let whole: u64 = whole.parse().ok()?;
    if fraction.bytes().any(|b| b != b'0') {
        whole.checked_add(1).map(Amount)
    } else {
        Some(Amount(whole))
    }
}
