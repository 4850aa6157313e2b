//! Alert state machine.
//!
//! Each source is `Idle` until a qualifying result is reported in the
//! current reporting window, then `Alerted` until the window rolls over.
//! A window that ends with every source still `Idle` produces exactly one
//! heartbeat. A per-source cooldown suppresses repeat alerts while the
//! same listings stay up across consecutive polls.

use crate::config::AlertPolicy;
use chrono::{DateTime, Duration, Utc};
use pricewatch_core::{Amount, MonitoredSource};
use std::collections::HashMap;
use tracing::debug;

/// Per-source position in the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePhase {
    Idle,
    Alerted,
}

/// Count and representative prices of one cycle's qualifying results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSummary {
    pub count: usize,
    pub cheapest: Amount,
    /// Lowest prices first, at most `sample_size` of them.
    pub sample: Vec<Amount>,
}

impl AlertSummary {
    /// Summarize qualifying amounts. Returns `None` for an empty slice.
    pub fn from_amounts(amounts: &[Amount], sample_size: usize) -> Option<Self> {
        let mut sorted = amounts.to_vec();
        sorted.sort_unstable();
        let cheapest = *sorted.first()?;
        sorted.truncate(sample_size.max(1));

        Some(Self {
            count: amounts.len(),
            cheapest,
            sample: sorted,
        })
    }
}

/// Outcome of evaluating one poll of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    /// No amount passed the ceiling.
    NothingQualifying,
    /// Deliver an alert, then call [`AlertState::record_delivered`].
    Notify(AlertSummary),
    /// Qualifying results, but this source alerted too recently.
    CoolingDown {
        summary: AlertSummary,
        remaining: Duration,
    },
}

/// A reporting window that closed without any qualifying result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietWindow {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct SourceWindow {
    last_alert: Option<DateTime<Utc>>,
    window_has_hit: bool,
}

/// Alert bookkeeping for every monitored source.
///
/// Owned by the monitor loop and mutated only between sequential source
/// evaluations. Lost on restart.
#[derive(Debug, Clone)]
pub struct AlertState {
    policy: AlertPolicy,
    window_start: DateTime<Utc>,
    sources: HashMap<MonitoredSource, SourceWindow>,
}

impl AlertState {
    /// Start with every source `Idle` in the window containing `now`.
    pub fn new(policy: AlertPolicy, now: DateTime<Utc>) -> Self {
        let window_start = policy.window.window_start(now);
        Self {
            policy,
            window_start,
            sources: HashMap::new(),
        }
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn phase(&self, source: &MonitoredSource) -> SourcePhase {
        match self.sources.get(source) {
            Some(window) if window.window_has_hit => SourcePhase::Alerted,
            _ => SourcePhase::Idle,
        }
    }

    /// True if any source reached `Alerted` in the current window.
    pub fn window_has_hit(&self) -> bool {
        self.sources.values().any(|w| w.window_has_hit)
    }

    pub fn last_alert(&self, source: &MonitoredSource) -> Option<DateTime<Utc>> {
        self.sources.get(source).and_then(|w| w.last_alert)
    }

    /// Close the current window if `now` has left it.
    ///
    /// Every source returns to `Idle`. Returns the closed window when it
    /// saw no qualifying result, meaning a heartbeat is due. Calling again
    /// within the new window returns `None`.
    pub fn roll_window(&mut self, now: DateTime<Utc>) -> Option<QuietWindow> {
        if !self.policy.window.has_rolled(self.window_start, now) {
            return None;
        }

        let next_start = self.policy.window.window_start(now);
        let closed = QuietWindow {
            started_at: self.window_start,
            ended_at: next_start,
        };
        let had_hit = self.window_has_hit();

        for window in self.sources.values_mut() {
            window.window_has_hit = false;
        }
        self.window_start = next_start;

        debug!(
            started_at = %closed.started_at,
            ended_at = %closed.ended_at,
            had_hit = had_hit,
            "Reporting window rolled over"
        );

        (!had_hit).then_some(closed)
    }

    /// Decide whether this poll's qualifying amounts deserve an alert.
    ///
    /// Any qualifying amount moves the source to `Alerted` for the rest of
    /// the window. The cooldown only starts once the caller reports a
    /// successful send with [`AlertState::record_delivered`], so an
    /// undelivered alert is tried again on the next qualifying poll.
    pub fn evaluate(
        &mut self,
        source: &MonitoredSource,
        qualifying: &[Amount],
        now: DateTime<Utc>,
    ) -> AlertDecision {
        let Some(summary) = AlertSummary::from_amounts(qualifying, self.policy.sample_size) else {
            return AlertDecision::NothingQualifying;
        };

        let cooldown = self.policy.cooldown();
        let window = self.sources.entry(source.clone()).or_default();
        window.window_has_hit = true;

        if let Some(last) = window.last_alert {
            let since = now - last;
            if since < cooldown {
                return AlertDecision::CoolingDown {
                    summary,
                    remaining: cooldown - since,
                };
            }
        }

        AlertDecision::Notify(summary)
    }

    /// Record a delivered alert; starts the cooldown for this source.
    pub fn record_delivered(&mut self, source: &MonitoredSource, now: DateTime<Utc>) {
        let window = self.sources.entry(source.clone()).or_default();
        window.last_alert = Some(now);
        window.window_has_hit = true;
    }
}
