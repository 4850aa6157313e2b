//! Price amounts and the qualifying ceiling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A listed price in whole currency units, currency symbol removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(pub u64);

impl Amount {
    /// Render with a currency symbol prefix, e.g. `£45`.
    pub fn display_with(self, currency_symbol: &str) -> String {
        format!("{}{}", currency_symbol, self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive upper bound a price must not exceed to qualify for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceCeiling(pub u64);

impl Default for PriceCeiling {
    fn default() -> Self {
        Self(250)
    }
}

impl PriceCeiling {
    /// True if the amount is at or below the ceiling.
    pub fn admits(self, amount: Amount) -> bool {
        amount.0 <= self.0
    }

    /// Keep only qualifying amounts, preserving page order.
    pub fn filter<I>(self, amounts: I) -> Vec<Amount>
    where
        I: IntoIterator<Item = Amount>,
    {
        amounts.into_iter().filter(|a| self.admits(*a)).collect()
    }
}
