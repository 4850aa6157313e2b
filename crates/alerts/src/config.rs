//! Alert policy configuration.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

/// Converts configured seconds, saturating instead of overflowing.
fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// How reporting windows roll over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowPolicy {
    /// Windows align to wall-clock hours (UTC).
    #[default]
    Hourly,
    /// Windows last a fixed number of seconds from the previous rollover.
    Elapsed { secs: u64 },
}

impl WindowPolicy {
    /// Start of the window containing `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            WindowPolicy::Hourly => now.duration_trunc(Duration::hours(1)).unwrap_or(now),
            WindowPolicy::Elapsed { .. } => now,
        }
    }

    /// True once `now` has left the window that began at `start`.
    pub fn has_rolled(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            WindowPolicy::Hourly => self.window_start(now) > start,
            WindowPolicy::Elapsed { secs } => now - start >= seconds(*secs),
        }
    }
}

/// Alert throttling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertPolicy {
    /// Minimum seconds between delivered alerts for the same source.
    pub cooldown_secs: u64,
    /// Reporting window used for the "still searching" heartbeat.
    pub window: WindowPolicy,
    /// Most prices listed in a single alert.
    pub sample_size: usize,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            window: WindowPolicy::Hourly,
            sample_size: 5,
        }
    }
}

impl AlertPolicy {
    pub fn cooldown(&self) -> Duration {
        seconds(self.cooldown_secs)
    }
}
