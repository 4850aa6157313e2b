//! Ticket price monitor - headless server
//!
//! Polls listing pages through a rendering proxy and sends Telegram alerts
//! when a ticket is listed at or below the configured price.

mod config;
mod monitor;

use chrono::Utc;
use clap::Parser;
use config::{
    AppConfig, ConfigError, Credentials, BOT_TOKEN_VAR, CHAT_ID_VAR, PROXY_API_KEY_VAR,
    SOURCE_URLS_VAR,
};
use monitor::{Monitor, MonitorSettings};
use pricewatch_alerts::TelegramSink;
use pricewatch_feeds::{ScrapingBeeProxy, SourceFetcher};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Ticket price monitor CLI
#[derive(Parser, Debug)]
#[command(name = "pricewatch")]
#[command(about = "Watch ticket listings and alert on cheap prices", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "pricewatch.json")]
    config: PathBuf,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Log which secrets are present without printing them.
fn log_env_presence() {
    let state = |key: &str| match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => "SET",
        _ => "NOT SET",
    };
    info!("  {}: {}", BOT_TOKEN_VAR, state(BOT_TOKEN_VAR));
    match std::env::var(CHAT_ID_VAR) {
        Ok(chat_id) if !chat_id.trim().is_empty() => {
            let shown: String = chat_id.chars().take(6).collect();
            info!("  {}: {}...", CHAT_ID_VAR, shown);
        }
        _ => info!("  {}: NOT SET", CHAT_ID_VAR),
    }
    info!("  {}: {}", PROXY_API_KEY_VAR, state(PROXY_API_KEY_VAR));
}

fn build_monitor(args: &Args) -> Result<Monitor, ConfigError> {
    let credentials = Credentials::from_env()?;

    let mut config = AppConfig::load(&args.config)?;
    config.apply_source_override(std::env::var(SOURCE_URLS_VAR).ok());
    config.validate()?;

    let sources = config.monitored_sources()?;
    let extractor = config.build_extractor()?;
    let proxy = ScrapingBeeProxy::new(
        credentials.proxy_api_key.clone(),
        &config.proxy_base_url,
        config.request_timeout(),
    )?;
    let fetcher = SourceFetcher::new(Arc::new(proxy), (&config.retry).into());
    let sink = TelegramSink::new(&credentials.bot_token, credentials.chat_id);

    for source in &sources {
        info!("  Watching: {}", source);
    }
    info!(
        "  Ceiling: {}{} | Interval: {}s | Selector: {}",
        config.extractor.currency_symbol,
        config.price_ceiling.0,
        config.poll_interval_secs,
        config.extractor.selector
    );

    Ok(Monitor::new(
        sources,
        fetcher,
        extractor,
        Arc::new(sink),
        MonitorSettings {
            poll_interval: config.poll_interval(),
            ceiling: config.price_ceiling,
            notify_on_proxy_rejection: config.notify_on_proxy_rejection,
        },
        config.alerts.clone(),
        Utc::now(),
    ))
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    init_logging(&args.log_level);

    info!("🚀 Ticket monitor starting...");
    info!("  Config: {}", args.config.display());
    log_env_presence();

    let monitor = match build_monitor(&args) {
        Ok(monitor) => monitor,
        Err(e) => {
            error!("ERROR: {}. Exiting.", e);
            std::process::exit(1);
        }
    };

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    monitor.run(&host).await;
}
