//! Background availability monitor
//!
//! Periodically re-checks the cached search candidates and fans buyable
//! statuses out to the registered observers. Polls at the rush interval while
//! any candidate shows an imminent-sale status, at the normal interval otherwise.

use async_trait::async_trait;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use super::candidate::{filter_candidates, Candidate, RawCandidate, StatusKeywords, TicketStatus};
use super::observer::{ObserverList, TicketObserver};
use crate::config::{Config, DelayRange, NotifyMode, PriceRange};
use crate::error::{Error, Result};
use crate::schedule::{new_rng, random_delay, sleep_or_cancel};

/// Where the monitor gets its candidates and statuses from
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    /// Run the configured search and return the raw results
    async fn search(&self) -> Result<Vec<RawCandidate>>;

    /// Query the current sale status of one candidate
    async fn check_status(&self, candidate: &Candidate) -> Result<TicketStatus>;
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub normal_interval: Duration,
    pub rush_interval: Duration,
    /// 0 = unbounded
    pub max_passes: u32,
    pub join_timeout: Duration,
    pub request_delay: DelayRange,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub price_window: PriceRange,
    pub notify_mode: NotifyMode,
    pub keywords: StatusKeywords,
    /// Fixed RNG seed for the inter-check delay
    pub seed: Option<u64>,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let date_range = config
            .target
            .date_range
            .as_ref()
            .map(|r| r.bounds())
            .transpose()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            normal_interval: config.monitor.normal_interval(),
            rush_interval: config.monitor.rush_interval(),
            max_passes: config.monitor.max_passes,
            join_timeout: config.monitor.join_timeout(),
            request_delay: config.risk_control.request_delay,
            date_range,
            price_window: config.target.price_range,
            notify_mode: config.strategy.notify_mode,
            keywords: StatusKeywords::from_site(&config.site),
            seed: None,
        })
    }
}

/// How a stop request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The scan task finished within the join timeout
    Clean,
    /// The scan task did not finish in time and was aborted
    TimedOut,
}

/// Counters of one monitor run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub passes: u32,
    pub notifications: u32,
}

struct Running {
    cancel: CancellationToken,
    /// Cancelled when the scan task ends, however it ends
    finished: CancellationToken,
    handle: JoinHandle<MonitorReport>,
}

pub struct AvailabilityMonitor {
    source: Arc<dyn AvailabilitySource>,
    observers: ObserverList,
    settings: MonitorSettings,
    parent: CancellationToken,
    running: Option<Running>,
    last_report: Option<MonitorReport>,
}

impl AvailabilityMonitor {
    /// Cancelling `parent` stops the monitor as well
    pub fn new(
        source: Arc<dyn AvailabilitySource>,
        settings: MonitorSettings,
        parent: CancellationToken,
    ) -> Self {
        Self {
            source,
            observers: ObserverList::new(),
            settings,
            parent,
            running: None,
            last_report: None,
        }
    }

    /// Register an observer. Takes effect on the next `start()`.
    pub fn register(&mut self, name: impl Into<String>, observer: Arc<dyn TicketObserver>) {
        let name = name.into();
        if self.is_running() {
            warn!("Observer '{}' registered while running, used after restart", name);
        }
        self.observers.register(name, observer);
    }

    /// Spawn the scan task. Returns `false` if it was already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            warn!("Availability monitor already running");
            return false;
        }

        let cancel = self.parent.child_token();
        let finished = CancellationToken::new();
        let scanner = Scanner {
            source: self.source.clone(),
            observers: self.observers.clone(),
            rng: new_rng(self.settings.seed),
            settings: self.settings.clone(),
            cancel: cancel.clone(),
            cache: Vec::new(),
            buyable: HashSet::new(),
            report: MonitorReport::default(),
            _finished: finished.clone().drop_guard(),
        };

        info!(
            "Starting availability monitor ({} observer(s), normal {:?}, rush {:?})",
            self.observers.len(),
            self.settings.normal_interval,
            self.settings.rush_interval
        );

        let handle = tokio::spawn(scanner.run());
        self.running = Some(Running {
            cancel,
            finished,
            handle,
        });
        true
    }

    /// Token cancelled once the current scan task has ended
    pub fn finished(&self) -> Option<CancellationToken> {
        self.running.as_ref().map(|r| r.finished.clone())
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Cancel the scan task and wait up to the join timeout for it to finish.
    /// The monitor is stopped afterwards in either case.
    pub async fn stop(&mut self) -> StopOutcome {
        let Some(Running {
            cancel, mut handle, ..
        }) = self.running.take()
        else {
            return StopOutcome::Clean;
        };

        cancel.cancel();

        match tokio::time::timeout(self.settings.join_timeout, &mut handle).await {
            Ok(Ok(report)) => {
                info!(
                    "Availability monitor stopped after {} pass(es), {} notification(s)",
                    report.passes, report.notifications
                );
                self.last_report = Some(report);
                StopOutcome::Clean
            }
            Ok(Err(e)) => {
                error!("Availability monitor task failed: {}", e);
                StopOutcome::Clean
            }
            Err(_) => {
                warn!(
                    "Availability monitor did not stop within {:?}, aborting it",
                    self.settings.join_timeout
                );
                handle.abort();
                StopOutcome::TimedOut
            }
        }
    }

    /// Wait for the scan task to end on its own (pass limit or parent cancellation)
    pub async fn join(&mut self) -> Option<MonitorReport> {
        let running = self.running.take()?;
        match running.handle.await {
            Ok(report) => {
                self.last_report = Some(report);
                Some(report)
            }
            Err(e) => {
                error!("Availability monitor task failed: {}", e);
                None
            }
        }
    }

    pub fn last_report(&self) -> Option<MonitorReport> {
        self.last_report
    }
}

/// Interval until the next pass
pub fn next_interval(
    cache: &[Candidate],
    keywords: &StatusKeywords,
    normal: Duration,
    rush: Duration,
) -> Duration {
    if cache.iter().any(|c| keywords.is_imminent(&c.status_text)) {
        rush
    } else {
        normal
    }
}

/// State owned by the spawned scan task
struct Scanner {
    source: Arc<dyn AvailabilitySource>,
    observers: ObserverList,
    settings: MonitorSettings,
    cancel: CancellationToken,
    rng: StdRng,
    cache: Vec<Candidate>,
    /// Candidates seen buyable on the previous check, for transition notifications
    buyable: HashSet<String>,
    report: MonitorReport,
    _finished: DropGuard,
}

impl Scanner {
    async fn run(mut self) -> MonitorReport {
        loop {
            if self.cancel.is_cancelled() {
                debug!("Availability monitor cancelled");
                break;
            }

            if self.cache.is_empty() {
                match self.refresh().await {
                    Ok(0) => {
                        info!("No matching candidates yet, searching again later");
                        if !sleep_or_cancel(&self.cancel, self.settings.normal_interval).await {
                            break;
                        }
                        continue;
                    }
                    Ok(n) => info!("Monitoring {} candidate(s)", n),
                    Err(e) => {
                        warn!("Search pass failed: {}", e);
                        if !sleep_or_cancel(&self.cancel, self.settings.normal_interval).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            self.report.passes += 1;
            self.check_all().await;

            if self.settings.max_passes > 0 && self.report.passes >= self.settings.max_passes {
                info!("Reached {} monitor pass(es)", self.report.passes);
                break;
            }

            let interval = next_interval(
                &self.cache,
                &self.settings.keywords,
                self.settings.normal_interval,
                self.settings.rush_interval,
            );
            debug!("Next monitor pass in {:?}", interval);
            if !sleep_or_cancel(&self.cancel, interval).await {
                break;
            }
        }

        self.report
    }

    async fn refresh(&mut self) -> Result<usize> {
        let raw = self.source.search().await?;
        self.cache = filter_candidates(
            raw,
            self.settings.date_range,
            &self.settings.price_window,
        );
        Ok(self.cache.len())
    }

    async fn check_all(&mut self) {
        let count = self.cache.len();

        for idx in 0..count {
            if self.cancel.is_cancelled() {
                return;
            }

            match self.source.check_status(&self.cache[idx]).await {
                Ok(status) => {
                    self.cache[idx].status_text = status.status_text.clone();
                    self.handle_status(status);
                }
                Err(e) => warn!(
                    "Status check failed for '{}': {}",
                    self.cache[idx].title, e
                ),
            }

            if idx + 1 < count {
                let delay = random_delay(
                    &mut self.rng,
                    self.settings.request_delay.min_ms,
                    self.settings.request_delay.max_ms,
                );
                if !sleep_or_cancel(&self.cancel, delay).await {
                    return;
                }
            }
        }
    }

    fn handle_status(&mut self, status: TicketStatus) {
        let key = candidate_key(&status.candidate);

        if !status.can_buy {
            self.buyable.remove(&key);
            debug!("'{}': {}", status.candidate.title, status.status_text);
            return;
        }

        let newly_buyable = self.buyable.insert(key);
        if self.settings.notify_mode == NotifyMode::Transition && !newly_buyable {
            return;
        }

        info!(
            "Tickets available: {} ({})",
            status.candidate.title, status.status_text
        );
        self.observers.notify(&status);
        self.report.notifications += 1;
    }
}

fn candidate_key(candidate: &Candidate) -> String {
    if candidate.link.is_empty() {
        candidate.title.clone()
    } else {
        candidate.link.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    const BUY: &str = "立即购买";
    const RUSH: &str = "即将开抢";

    #[derive(Default)]
    struct FakeSource {
        /// Results returned by successive searches, the last one repeats
        searches: Mutex<Vec<Vec<RawCandidate>>>,
        search_calls: AtomicUsize,
        /// title -> status text; missing titles fail
        statuses: Mutex<HashMap<String, String>>,
        hang: bool,
    }

    impl FakeSource {
        fn with(candidates: Vec<RawCandidate>, statuses: &[(&str, &str)]) -> Self {
            let source = Self::default();
            *source.searches.lock().unwrap() = vec![candidates];
            *source.statuses.lock().unwrap() = statuses
                .iter()
                .map(|(t, s)| (t.to_string(), s.to_string()))
                .collect();
            source
        }
    }

    #[async_trait]
    impl AvailabilitySource for FakeSource {
        async fn search(&self) -> Result<Vec<RawCandidate>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            let mut searches = self.searches.lock().unwrap();
            if searches.len() > 1 {
                Ok(searches.remove(0))
            } else {
                Ok(searches.first().cloned().unwrap_or_default())
            }
        }

        async fn check_status(&self, candidate: &Candidate) -> Result<TicketStatus> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            let text = self
                .statuses
                .lock()
                .unwrap()
                .get(&candidate.title)
                .cloned()
                .ok_or_else(|| Error::ElementNotFound(".buybtn".into()))?;
            Ok(TicketStatus {
                candidate: candidate.clone(),
                can_buy: text.contains(BUY),
                status_text: text,
            })
        }
    }

    fn raw(title: &str) -> RawCandidate {
        RawCandidate {
            title: title.into(),
            venue: "Arena".into(),
            time_text: "2030.05.01 19:30".into(),
            price_text: "¥380".into(),
            link: format!("https://detail.example.com/{}", title),
        }
    }

    fn settings(max_passes: u32) -> MonitorSettings {
        MonitorSettings {
            normal_interval: Duration::from_secs(5),
            rush_interval: Duration::from_secs(1),
            max_passes,
            join_timeout: Duration::from_secs(2),
            request_delay: DelayRange { min_ms: 0, max_ms: 0 },
            date_range: None,
            price_window: PriceRange::default(),
            notify_mode: NotifyMode::Every,
            keywords: StatusKeywords::from_site(&crate::config::SiteConfig::default()),
            seed: Some(1),
        }
    }

    fn counting_observer(counter: Arc<AtomicUsize>) -> Arc<dyn TicketObserver> {
        Arc::new(move |_: &TicketStatus| -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn candidate(status_text: &str) -> Candidate {
        let mut c = Candidate::from_raw(raw("c")).unwrap();
        c.status_text = status_text.into();
        c
    }

    #[test]
    fn test_rush_status_uses_rush_interval() {
        let keywords = StatusKeywords::from_site(&crate::config::SiteConfig::default());
        let normal = Duration::from_secs(5);
        let rush = Duration::from_secs(1);

        let cache = vec![candidate("预售中"), candidate(RUSH)];
        assert_eq!(next_interval(&cache, &keywords, normal, rush), rush);

        let cache = vec![candidate("预售中"), candidate(BUY)];
        assert_eq!(next_interval(&cache, &keywords, normal, rush), normal);
        assert_eq!(next_interval(&[], &keywords, normal, rush), normal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_pass_notifies_observers() {
        let source = Arc::new(FakeSource::with(
            vec![raw("a"), raw("b")],
            &[("a", BUY), ("b", "预售中")],
        ));
        let mut monitor =
            AvailabilityMonitor::new(source, settings(3), CancellationToken::new());
        let counter = Arc::new(AtomicUsize::new(0));
        monitor.register("count", counting_observer(counter.clone()));

        assert!(monitor.start());
        let report = monitor.join().await.unwrap();

        assert_eq!(report.passes, 3);
        assert_eq!(report.notifications, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_mode_notifies_once() {
        let source = Arc::new(FakeSource::with(vec![raw("a")], &[("a", BUY)]));
        let mut settings = settings(4);
        settings.notify_mode = NotifyMode::Transition;
        let mut monitor = AvailabilityMonitor::new(source, settings, CancellationToken::new());
        let counter = Arc::new(AtomicUsize::new(0));
        monitor.register("count", counting_observer(counter.clone()));

        monitor.start();
        let report = monitor.join().await.unwrap();

        assert_eq!(report.passes, 4);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rush_status_shortens_sleep() {
        let source = Arc::new(FakeSource::with(vec![raw("a")], &[("a", RUSH)]));
        let mut monitor =
            AvailabilityMonitor::new(source, settings(2), CancellationToken::new());

        let start = Instant::now();
        monitor.start();
        monitor.join().await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_search_does_not_consume_pass() {
        let source = Arc::new(FakeSource::with(vec![], &[("a", BUY)]));
        *source.searches.lock().unwrap() = vec![vec![], vec![], vec![raw("a")]];
        let mut monitor =
            AvailabilityMonitor::new(source.clone(), settings(1), CancellationToken::new());

        let start = Instant::now();
        monitor.start();
        let report = monitor.join().await.unwrap();

        assert_eq!(report.passes, 1);
        assert_eq!(report.notifications, 1);
        assert_eq!(source.search_calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_failure_is_isolated() {
        // "broken" has no status and fails; "b" is still checked
        let source = Arc::new(FakeSource::with(
            vec![raw("broken"), raw("b")],
            &[("b", BUY)],
        ));
        let mut monitor =
            AvailabilityMonitor::new(source, settings(1), CancellationToken::new());
        let counter = Arc::new(AtomicUsize::new(0));
        monitor.register("count", counting_observer(counter.clone()));

        monitor.start();
        monitor.join().await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_and_clean_stop() {
        let source = Arc::new(FakeSource::with(vec![raw("a")], &[("a", "预售中")]));
        let mut monitor =
            AvailabilityMonitor::new(source, settings(0), CancellationToken::new());

        assert!(monitor.start());
        assert!(!monitor.start());
        assert!(monitor.is_running());

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(monitor.stop().await, StopOutcome::Clean);
        assert!(!monitor.is_running());
        assert!(monitor.last_report().unwrap().passes >= 2);

        // Stopping again is a no-op
        assert_eq!(monitor.stop().await, StopOutcome::Clean);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_task_times_out() {
        let mut source = FakeSource::with(vec![raw("a")], &[("a", BUY)]);
        source.hang = true;
        let mut monitor =
            AvailabilityMonitor::new(Arc::new(source), settings(0), CancellationToken::new());

        monitor.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(monitor.stop().await, StopOutcome::TimedOut);
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_token_fires_on_pass_limit() {
        let source = Arc::new(FakeSource::with(vec![raw("a")], &[("a", "预售中")]));
        let mut monitor =
            AvailabilityMonitor::new(source, settings(2), CancellationToken::new());

        assert!(monitor.finished().is_none());
        monitor.start();
        let finished = monitor.finished().unwrap();
        assert!(!finished.is_cancelled());

        finished.cancelled().await;
        assert_eq!(monitor.join().await.unwrap().passes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_monitor() {
        let parent = CancellationToken::new();
        let source = Arc::new(FakeSource::with(vec![raw("a")], &[("a", "预售中")]));
        let mut monitor = AvailabilityMonitor::new(source, settings(0), parent.clone());

        monitor.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        parent.cancel();

        let report = monitor.join().await.unwrap();
        assert_eq!(report.passes, 1);
    }
}
