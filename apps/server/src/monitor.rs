//! Polling loop.
//!
//! Sources are checked one after another: fetch, extract, filter,
//! evaluate, deliver. Every failure stays inside the source that caused
//! it; the loop itself only stops with the process.

use chrono::{DateTime, Utc};
use pricewatch_alerts::{
    format_alert, format_heartbeat, AlertDecision, AlertPolicy, AlertState, Notification,
    NotificationSink,
};
use pricewatch_core::{MonitoredSource, PriceCeiling};
use pricewatch_feeds::{FetchError, PriceExtractor, SourceFetcher};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Loop settings that are not owned by a component.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub ceiling: PriceCeiling,
    pub notify_on_proxy_rejection: bool,
}

/// What happened during one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub failed: usize,
    pub alerts_sent: usize,
    pub alerts_suppressed: usize,
    pub heartbeat_sent: bool,
    pub any_qualifying: bool,
}

pub struct Monitor {
    sources: Vec<MonitoredSource>,
    fetcher: SourceFetcher,
    extractor: PriceExtractor,
    alerts: AlertState,
    sink: Arc<dyn NotificationSink>,
    settings: MonitorSettings,
    /// Sources whose last fetch was rejected and already reported.
    rejected: HashSet<MonitoredSource>,
}

impl Monitor {
    pub fn new(
        sources: Vec<MonitoredSource>,
        fetcher: SourceFetcher,
        extractor: PriceExtractor,
        sink: Arc<dyn NotificationSink>,
        settings: MonitorSettings,
        policy: AlertPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            sources,
            fetcher,
            extractor,
            alerts: AlertState::new(policy, now),
            sink,
            settings,
            rejected: HashSet::new(),
        }
    }

    pub fn alerts(&self) -> &AlertState {
        &self.alerts
    }

    /// Send the one-time "now running" message.
    pub async fn announce_start(&self, host: &str) {
        let text = format_startup(host, self.sources.len(), self.settings.poll_interval);
        self.deliver(&Notification::plain(text)).await;
    }

    /// Poll forever.
    pub async fn run(mut self, host: &str) {
        info!(
            sources = self.sources.len(),
            interval_secs = self.settings.poll_interval.as_secs(),
            "Monitor started"
        );
        self.announce_start(host).await;

        loop {
            let report = self.run_cycle(Utc::now()).await;
            debug!(?report, "Cycle finished");
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// Check every source once.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        info!("Starting check of {} sources", self.sources.len());

        if let Some(window) = self.alerts.roll_window(now) {
            let heartbeat = format_heartbeat(
                &window,
                self.sources.len(),
                self.settings.ceiling,
                self.extractor.currency_symbol(),
            );
            report.heartbeat_sent = self.deliver(&heartbeat).await;
        }

        let sources = self.sources.clone();
        for source in &sources {
            self.check_source(source, now, &mut report).await;
            report.checked += 1;
        }

        if !report.any_qualifying {
            info!(
                "No tickets at or below {}{} at any monitored source",
                self.extractor.currency_symbol(),
                self.settings.ceiling.0
            );
        }
        info!(
            checked = report.checked,
            failed = report.failed,
            alerts = report.alerts_sent,
            "Cycle complete"
        );

        report
    }

    async fn check_source(
        &mut self,
        source: &MonitoredSource,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        info!(source = %source, "Checking tickets");

        let page = match self.fetcher.fetch(source).await {
            Ok(page) => {
                self.rejected.remove(source);
                page
            }
            Err(e) => {
                report.failed += 1;
                self.handle_fetch_error(source, e).await;
                return;
            }
        };

        let amounts = self.extractor.extract(&page);
        let qualifying = self.settings.ceiling.filter(amounts.iter().copied());
        info!(
            source = %source,
            found = amounts.len(),
            qualifying = qualifying.len(),
            "Parsed listings"
        );

        match self.alerts.evaluate(source, &qualifying, now) {
            AlertDecision::NothingQualifying => {
                debug!(source = %source, "No tickets at or below ceiling");
            }
            AlertDecision::CoolingDown { summary, remaining } => {
                report.any_qualifying = true;
                report.alerts_suppressed += 1;
                info!(
                    source = %source,
                    count = summary.count,
                    cheapest = %summary.cheapest,
                    remaining_secs = remaining.num_seconds(),
                    "Alert suppressed by cooldown"
                );
            }
            AlertDecision::Notify(summary) => {
                report.any_qualifying = true;
                let message = format_alert(
                    &summary,
                    source,
                    self.settings.ceiling,
                    self.extractor.currency_symbol(),
                );
                if self.deliver(&message).await {
                    self.alerts.record_delivered(source, now);
                    report.alerts_sent += 1;
                    info!(
                        source = %source,
                        count = summary.count,
                        cheapest = %summary.cheapest,
                        "Sent alert"
                    );
                }
            }
        }
    }

    async fn handle_fetch_error(&mut self, source: &MonitoredSource, err: FetchError) {
        if err.is_transient() {
            warn!(source = %source, error = %err, "Skipping source this cycle");
            return;
        }

        error!(source = %source, error = %err, "Source keeps failing until fixed");
        if !err.is_permanent()
            || !self.settings.notify_on_proxy_rejection
            || self.rejected.contains(source)
        {
            return;
        }

        let warning = Notification::plain(format!(
            "⚠️ Checking {} failed: {}. Check the proxy API key and account.",
            source, err
        ));
        // Only a delivered warning counts; otherwise try again next cycle.
        if self.deliver(&warning).await {
            self.rejected.insert(source.clone());
        }
    }

    /// Deliver a message, logging and swallowing failures.
    async fn deliver(&self, notification: &Notification) -> bool {
        match self.sink.deliver(notification).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to send message");
                false
            }
        }
    }
}

/// Text of the startup notification.
pub fn format_startup(host: &str, source_count: usize, interval: Duration) -> String {
    format!(
        "✅ Ticket monitor is now running on {}, checking {} {} every {}",
        host,
        source_count,
        if source_count == 1 { "page" } else { "pages" },
        describe_interval(interval)
    )
}

fn describe_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    match secs {
        60 => "minute".to_string(),
        s if s > 0 && s % 60 == 0 => format!("{} minutes", s / 60),
        1 => "second".to_string(),
        s => format!("{} seconds", s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use pricewatch_alerts::NotifyError;
    use pricewatch_feeds::{FetchResult, ProxyResponse, RenderProxy, RetryPolicy};
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    const A: &str = "https://www.twickets.live/en/event/1828748649929117696";
    const B: &str = "https://www.twickets.live/en/event/1828748567179698176";

    #[derive(Clone)]
    enum Reply {
        Page(u16, String),
        NetworkDown,
    }

    /// Proxy with a reply queue per URL; the last reply repeats.
    #[derive(Default)]
    struct FakeProxy {
        replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    }

    impl FakeProxy {
        fn script(&self, url: &str, replies: Vec<Reply>) {
            self.replies
                .lock()
                .unwrap()
                .insert(url.to_string(), replies.into());
        }
    }

    #[async_trait]
    impl RenderProxy for FakeProxy {
        async fn render(&self, source: &MonitoredSource) -> FetchResult<ProxyResponse> {
            let mut replies = self.replies.lock().unwrap();
            let queue = replies.get_mut(source.url()).expect("unscripted source");
            let reply = if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap()
            };
            match reply {
                Reply::Page(status, body) => Ok(ProxyResponse::new(status, body)),
                Reply::NetworkDown => Err(FetchError::Network("connection reset".into())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Notification>>,
        failing: AtomicBool,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }

        fn heartbeats(&self) -> usize {
            self.sent()
                .iter()
                .filter(|n| n.text.starts_with("🔍"))
                .count()
        }

        fn alerts(&self) -> usize {
            self.sent()
                .iter()
                .filter(|n| n.text.starts_with("🎟️"))
                .count()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotifyError::Delivery("chat unreachable".into()));
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    fn page(prices: &[&str]) -> Reply {
        let spans: String = prices
            .iter()
            .map(|p| format!(r#"<span class="TicketCard__price___3Oxo2">{p}</span>"#))
            .collect();
        Reply::Page(200, format!("<html><body>{spans}</body></html>"))
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, h, m, 0).unwrap()
    }

    fn monitor(
        urls: &[&str],
        proxy: Arc<FakeProxy>,
        sink: Arc<RecordingSink>,
        start: DateTime<Utc>,
    ) -> Monitor {
        let sources = urls
            .iter()
            .map(|u| MonitoredSource::parse(u).unwrap())
            .collect();
        let fetcher = SourceFetcher::new(
            proxy,
            RetryPolicy {
                max_attempts: 3,
                delay: Duration::ZERO,
            },
        );
        let extractor = PriceExtractor::new(
            PriceExtractor::DEFAULT_SELECTOR,
            PriceExtractor::DEFAULT_CURRENCY_SYMBOL,
        )
        .unwrap();
        Monitor::new(
            sources,
            fetcher,
            extractor,
            sink,
            MonitorSettings {
                poll_interval: Duration::from_secs(300),
                ceiling: PriceCeiling(250),
                notify_on_proxy_rejection: true,
            },
            AlertPolicy::default(),
            start,
        )
    }

    #[tokio::test]
    async fn test_end_to_end_alert() {
        let proxy = Arc::new(FakeProxy::default());
        proxy.script(A, vec![page(&["£120", "£300", "£45"])]);
        let sink = Arc::new(RecordingSink::default());
        let url = format!("{A}#sort=FirstListed&typeFilter=Any&qFilter=All");
        let mut monitor = monitor(&[&url], proxy, sink.clone(), at(10, 0));

        let report = monitor.run_cycle(at(10, 0)).await;

        assert_eq!(report.alerts_sent, 1);
        assert!(report.any_qualifying);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].text,
            "🎟️ 2 tickets at or below £250\nCheapest: £45\nPrices: £45, £120"
        );
        assert_eq!(sent[0].link.as_deref(), Some(A));
    }

    #[tokio::test]
    async fn test_no_qualifying_prices_sends_nothing() {
        let proxy = Arc::new(FakeProxy::default());
        proxy.script(A, vec![page(&["£300", "£251"])]);
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = monitor(&[A], proxy, sink.clone(), at(10, 0));

        let report = monitor.run_cycle(at(10, 0)).await;

        assert!(!report.any_qualifying);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_cooldown_across_cycles() {
        let proxy = Arc::new(FakeProxy::default());
        proxy.script(A, vec![page(&["£100"])]);
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = monitor(&[A], proxy, sink.clone(), at(10, 0));

        assert_eq!(monitor.run_cycle(at(10, 0)).await.alerts_sent, 1);

        let report = monitor.run_cycle(at(10, 4)).await;
        assert_eq!(report.alerts_sent, 0);
        assert_eq!(report.alerts_suppressed, 1);

        assert_eq!(monitor.run_cycle(at(10, 6)).await.alerts_sent, 1);
        assert_eq!(sink.alerts(), 2);
    }

    #[tokio::test]
    async fn test_quiet_window_sends_one_heartbeat() {
        let proxy = Arc::new(FakeProxy::default());
        proxy.script(A, vec![page(&[])]);
        proxy.script(B, vec![page(&["£400"])]);
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = monitor(&[A, B], proxy, sink.clone(), at(10, 0));

        for minute in (0..=60).step_by(5) {
            monitor
                .run_cycle(at(10, 0) + chrono::Duration::minutes(minute))
                .await;
        }

        assert_eq!(sink.heartbeats(), 1);
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_window_with_alert_sends_no_heartbeat() {
        let proxy = Arc::new(FakeProxy::default());
        proxy.script(A, vec![page(&[])]);
        proxy.script(
            B,
            vec![
                page(&[]),
                page(&[]),
                page(&[]),
                page(&[]),
                page(&["£99"]),
                page(&[]),
            ],
        );
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = monitor(&[A, B], proxy, sink.clone(), at(10, 0));

        for minute in (0..=60).step_by(5) {
            monitor
                .run_cycle(at(10, 0) + chrono::Duration::minutes(minute))
                .await;
        }

        assert_eq!(sink.alerts(), 1);
        assert_eq!(sink.heartbeats(), 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_retried_next_cycle() {
        let proxy = Arc::new(FakeProxy::default());
        proxy.script(A, vec![page(&["£100"])]);
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = monitor(&[A], proxy, sink.clone(), at(10, 0));

        sink.failing.store(true, Ordering::SeqCst);
        let report = monitor.run_cycle(at(10, 0)).await;
        assert_eq!(report.alerts_sent, 0);
        assert_eq!(monitor.alerts().last_alert(&MonitoredSource::parse(A).unwrap()), None);

        sink.failing.store(false, Ordering::SeqCst);
        let report = monitor.run_cycle(at(10, 2)).await;
        assert_eq!(report.alerts_sent, 1);
        assert_eq!(sink.alerts(), 1);
    }

    #[tokio::test]
    async fn test_undelivered_alert_suppresses_heartbeat() {
        let proxy = Arc::new(FakeProxy::default());
        proxy.script(A, vec![page(&[]), page(&[]), page(&["£100"]), page(&[])]);
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = monitor(&[A], proxy, sink.clone(), at(10, 0));

        monitor.run_cycle(at(10, 0)).await;
        monitor.run_cycle(at(10, 10)).await;

        sink.failing.store(true, Ordering::SeqCst);
        let report = monitor.run_cycle(at(10, 20)).await;
        assert!(report.any_qualifying);
        assert_eq!(report.alerts_sent, 0);
        sink.failing.store(false, Ordering::SeqCst);

        for minute in [30, 40, 50] {
            monitor.run_cycle(at(10, minute)).await;
        }
        let report = monitor.run_cycle(at(11, 0)).await;

        assert!(!report.heartbeat_sent);
        assert_eq!(sink.heartbeats(), 0);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failing_source_does_not_affect_others() {
        let proxy = Arc::new(FakeProxy::default());
        proxy.script(A, vec![Reply::NetworkDown]);
        proxy.script(B, vec![page(&["£50"])]);
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = monitor(&[A, B], proxy, sink.clone(), at(10, 0));

        let report = monitor.run_cycle(at(10, 0)).await;

        assert_eq!(report.checked, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.alerts_sent, 1);
        assert_eq!(sink.sent()[0].link.as_deref(), Some(B));
    }

    #[tokio::test]
    async fn test_exhausted_retries_skip_source() {
        let proxy = Arc::new(FakeProxy::default());
        proxy.script(A, vec![Reply::Page(500, "busy".into())]);
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = monitor(&[A], proxy, sink.clone(), at(10, 0));

        let report = monitor.run_cycle(at(10, 0)).await;

        assert_eq!(report.failed, 1);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_proxy_rejection_warns_once_until_recovery() {
        let proxy = Arc::new(FakeProxy::default());
        proxy.script(
            A,
            vec![
                Reply::Page(401, "invalid api key".into()),
                Reply::Page(401, "invalid api key".into()),
                page(&[]),
                Reply::Page(401, "invalid api key".into()),
            ],
        );
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = monitor(&[A], proxy, sink.clone(), at(10, 0));

        for minute in [0, 5, 10, 15] {
            monitor.run_cycle(at(10, minute)).await;
        }

        let warnings: Vec<_> = sink
            .sent()
            .into_iter()
            .filter(|n| n.text.starts_with("⚠️"))
            .collect();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].text.contains("HTTP 401"));
        assert!(warnings[0].text.contains(A));
    }

    #[tokio::test]
    async fn test_undelivered_rejection_warning_is_resent() {
        let proxy = Arc::new(FakeProxy::default());
        proxy.script(A, vec![Reply::Page(401, "invalid api key".into())]);
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = monitor(&[A], proxy, sink.clone(), at(10, 0));

        sink.failing.store(true, Ordering::SeqCst);
        monitor.run_cycle(at(10, 0)).await;
        sink.failing.store(false, Ordering::SeqCst);

        for minute in [5, 10, 15] {
            monitor.run_cycle(at(10, minute)).await;
        }

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.starts_with("⚠️"));
        assert!(sent[0].text.contains("HTTP 401"));
    }

    #[tokio::test]
    async fn test_announce_start() {
        let proxy = Arc::new(FakeProxy::default());
        let sink = Arc::new(RecordingSink::default());
        let monitor = monitor(&[A, B], proxy, sink.clone(), at(10, 0));

        monitor.announce_start("box-1").await;

        assert_eq!(
            sink.sent(),
            vec![Notification::plain(
                "✅ Ticket monitor is now running on box-1, checking 2 pages every 5 minutes"
            )]
        );
    }

    #[test]
    fn test_describe_interval() {
        assert_eq!(describe_interval(Duration::from_secs(300)), "5 minutes");
        assert_eq!(describe_interval(Duration::from_secs(60)), "minute");
        assert_eq!(describe_interval(Duration::from_secs(90)), "90 seconds");
    }
}
