//! Alert decisions and delivery for the price monitor.
//!
//! This crate provides:
//! - Per-source cooldown and per-window heartbeat bookkeeping (`AlertState`)
//! - Channel-independent message formatting
//! - Telegram delivery through the `NotificationSink` seam

pub mod config;
pub mod notifier;
pub mod state;
pub mod telegram;

pub use config::{AlertPolicy, WindowPolicy};
pub use notifier::{
    format_alert, format_heartbeat, Notification, NotificationSink, NotifyError,
};
pub use state::{AlertDecision, AlertState, AlertSummary, QuietWindow, SourcePhase};
pub use telegram::TelegramSink;
