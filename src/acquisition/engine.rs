//! Acquisition loop
//!
//! Waits for the sale to open, then runs purchase attempts until one
//! succeeds, the attempt budget is spent, or the run is cancelled. Every
//! iteration counts as an attempt, whichever step it failed in.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use super::record::{AttemptHistory, AttemptRecord, FailureReason, FinalOutcome, RunSummary};
use crate::config::{Config, PriceRange, PriorityEntry};
use crate::driver::AttemptLease;
use crate::error::{Error, Result};
use crate::monitor::TicketStatus;
use crate::schedule::{sleep_or_cancel, WaitOutcome, WaitProgress, Waiter};
use crate::selection::{select_best_price, select_recipients, PriceTier, RecipientCandidate, RecipientToggle};

/// What submitting the order led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Order submitted, payment pending
    Submitted,
    /// Order page filled in and left for the user to submit
    AwaitingManual,
}

/// The site-specific steps of one purchase attempt
#[async_trait]
pub trait PurchaseFlow: RecipientToggle {
    /// Open the item page and get it ready for tier selection
    async fn open_target(&mut self, url: &str) -> Result<()>;

    /// Price tiers offered on the item page, possibly none
    async fn price_tiers(&mut self) -> Result<Vec<PriceTier>>;

    async fn choose_tier(&mut self, tier: &PriceTier) -> Result<()>;

    /// Press buy and wait for the order confirmation page
    async fn proceed_to_checkout(&mut self) -> Result<()>;

    /// Recipients listed on the order confirmation page
    async fn recipients(&mut self) -> Result<Vec<RecipientCandidate>>;

    async fn submit(&mut self, auto_submit: bool) -> Result<SubmitOutcome>;

    /// Held for the whole attempt when the session is shared with others
    fn attempt_lease(&self) -> Option<AttemptLease> {
        None
    }
}

/// Run parameters, fixed for the whole run
#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    pub target_url: Option<String>,
    pub start_time: Option<String>,
    /// 0 = unbounded
    pub max_attempts: u32,
    pub price_window: PriceRange,
    pub priority: Vec<PriorityEntry>,
    pub recipients: Vec<String>,
    pub required_recipients: usize,
    pub auto_submit: bool,
}

impl AcquisitionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_url: config.target_url(),
            start_time: config.target.start_time().map(String::from),
            max_attempts: config.strategy.max_attempts,
            price_window: config.target.price_range,
            priority: config.priority.clone(),
            recipients: config.recipient_names(),
            required_recipients: config.required_recipients(),
            auto_submit: config.strategy.auto_submit,
        }
    }
}

/// Which part of an attempt an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Navigate,
    Select,
    Checkout,
    Submit,
}

fn classify(step: Step, error: &Error) -> FailureReason {
    if error.is_unexpected() {
        return FailureReason::Unexpected;
    }

    match step {
        Step::Navigate => FailureReason::Navigation,
        _ if error.is_element_error() => FailureReason::ElementNotFound,
        Step::Select => FailureReason::Selection,
        Step::Checkout => match error {
            Error::SoldOut(_) | Error::Selection(_) => FailureReason::Selection,
            _ => FailureReason::Navigation,
        },
        Step::Submit => FailureReason::Submission,
    }
}

type StepError = (FailureReason, Error);

fn at(step: Step) -> impl Fn(Error) -> StepError {
    move |e| (classify(step, &e), e)
}

/// What a successful attempt ended with
struct Purchase {
    tier: Option<String>,
    recipients: Vec<String>,
    submitted: SubmitOutcome,
}

pub struct AcquisitionLoop<F> {
    flow: F,
    settings: AcquisitionSettings,
    backoff: BackoffPolicy,
    cancel: CancellationToken,
    history: AttemptHistory,
    progress: Option<mpsc::UnboundedSender<WaitProgress>>,
    reports: Option<mpsc::UnboundedSender<AttemptRecord>>,
    last_purchase: Option<Purchase>,
}

impl<F: PurchaseFlow> AcquisitionLoop<F> {
    pub fn new(
        flow: F,
        settings: AcquisitionSettings,
        backoff: BackoffPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            flow,
            settings,
            backoff,
            cancel,
            history: AttemptHistory::default(),
            progress: None,
            reports: None,
            last_purchase: None,
        }
    }

    /// Forward the waiter's progress notifications
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<WaitProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Deliver every attempt record on a channel as well as to the log
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<AttemptRecord>) -> Self {
        self.reports = Some(tx);
        self
    }

    pub fn history(&self) -> &AttemptHistory {
        &self.history
    }

    /// Give back the purchase flow, e.g. to close its session
    pub fn into_flow(self) -> F {
        self.flow
    }

    /// Scheduled run: wait for the start time, then attempt until done
    pub async fn run(&mut self) -> RunSummary {
        let run_id = Uuid::new_v4();
        let span = info_span!("acquisition", run_id = %run_id);

        async {
            let started = Instant::now();

            let mut waiter = Waiter::new(self.cancel.clone());
            if let Some(tx) = &self.progress {
                waiter = waiter.with_progress(tx.clone());
            }

            let outcome = match waiter.wait_until_str(self.settings.start_time.as_deref()).await {
                WaitOutcome::Proceeded => match self.settings.target_url.clone() {
                    Some(url) => self.attempt_until_done(&url).await,
                    None => FinalOutcome::Fatal("no target URL configured".to_string()),
                },
                WaitOutcome::Cancelled => FinalOutcome::Stopped,
                WaitOutcome::Failed(reason) => FinalOutcome::Fatal(reason),
            };

            self.finish(run_id, outcome, started.elapsed())
        }
        .instrument(span)
        .await
    }

    async fn attempt_until_done(&mut self, url: &str) -> FinalOutcome {
        info!("Starting acquisition of {}", url);
        let mut counter = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return FinalOutcome::Stopped;
            }
            if self.budget_spent(counter) {
                return FinalOutcome::Exhausted;
            }

            counter += 1;
            let record = self.attempt(counter, url).await;
            let unexpected = record.failure == Some(FailureReason::Unexpected);
            let success = record.is_success();
            self.report(record);

            if success {
                return FinalOutcome::Success;
            }
            if self.budget_spent(counter) {
                return FinalOutcome::Exhausted;
            }

            let delay = self.backoff.delay_for(counter, unexpected);
            debug!("Next attempt in {:?}", delay);
            if !sleep_or_cancel(&self.cancel, delay).await {
                return FinalOutcome::Stopped;
            }
        }
    }

    /// Monitor-triggered run: one attempt per buyable status received.
    ///
    /// Ends when an attempt succeeds, the budget is spent, the run is
    /// cancelled or the sender side is dropped.
    pub async fn run_triggered(&mut self, mut rx: mpsc::Receiver<TicketStatus>) -> RunSummary {
        let run_id = Uuid::new_v4();
        let span = info_span!("acquisition", run_id = %run_id, mode = "triggered");

        async {
            let started = Instant::now();
            let mut counter = 0u32;

            let outcome = loop {
                if self.budget_spent(counter) {
                    break FinalOutcome::Exhausted;
                }

                let status = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break FinalOutcome::Stopped,
                    msg = rx.recv() => match msg {
                        Some(status) => status,
                        None => {
                            info!("Availability notifications ended");
                            break FinalOutcome::Stopped;
                        }
                    },
                };

                let url = if status.candidate.link.is_empty() {
                    self.settings.target_url.clone()
                } else {
                    Some(status.candidate.link.clone())
                };

                counter += 1;
                info!(
                    "Attempt {} triggered by '{}' ({})",
                    counter, status.candidate.title, status.status_text
                );

                let record = match url {
                    Some(url) => self.attempt(counter, &url).await,
                    None => AttemptRecord::failure(
                        counter,
                        FailureReason::Navigation,
                        "candidate has no link and no target URL is configured",
                    ),
                };
                let unexpected = record.failure == Some(FailureReason::Unexpected);
                let success = record.is_success();
                self.report(record);

                if success {
                    break FinalOutcome::Success;
                }
                if self.budget_spent(counter) {
                    break FinalOutcome::Exhausted;
                }

                // Rate-limit retries triggered by a status that stays buyable
                let delay = self.backoff.delay_for(counter, unexpected);
                if !sleep_or_cancel(&self.cancel, delay).await {
                    break FinalOutcome::Stopped;
                }
            };

            self.finish(run_id, outcome, started.elapsed())
        }
        .instrument(span)
        .await
    }

    fn budget_spent(&self, counter: u32) -> bool {
        self.settings.max_attempts > 0 && counter >= self.settings.max_attempts
    }

    async fn attempt(&mut self, sequence: u32, url: &str) -> AttemptRecord {
        debug!("Attempt {} starting", sequence);

        let _lease = match self.flow.attempt_lease() {
            Some(lease) => Some(lease.lock_owned().await),
            None => None,
        };

        match self.purchase(url).await {
            Ok(purchase) => {
                let reason = match purchase.submitted {
                    SubmitOutcome::Submitted => "order submitted, payment pending",
                    SubmitOutcome::AwaitingManual => "order ready, waiting for manual submission",
                };
                self.last_purchase = Some(purchase);
                AttemptRecord::success(sequence, reason)
            }
            Err((failure, e)) => {
                if failure == FailureReason::Unexpected {
                    debug!("Attempt {} unexpected error detail: {:?}", sequence, e);
                }
                AttemptRecord::failure(sequence, failure, e.to_string())
            }
        }
    }

    async fn purchase(&mut self, url: &str) -> std::result::Result<Purchase, StepError> {
        self.flow.open_target(url).await.map_err(at(Step::Navigate))?;

        let tiers = self.flow.price_tiers().await.map_err(at(Step::Select))?;
        let tier = if tiers.is_empty() {
            debug!("No price tiers offered, skipping tier selection");
            None
        } else {
            let window = self.settings.price_window;
            let best = select_best_price(&tiers, &window, &self.settings.priority).ok_or_else(|| {
                (
                    FailureReason::Selection,
                    Error::Selection(format!(
                        "none of {} price tier(s) within [{}, {}]",
                        tiers.len(),
                        window.min,
                        window.max
                    )),
                )
            })?;
            info!("Choosing price tier '{}' ({})", best.text, best.value);
            self.flow.choose_tier(&best).await.map_err(at(Step::Select))?;
            Some(best.text)
        };

        self.flow
            .proceed_to_checkout()
            .await
            .map_err(at(Step::Checkout))?;

        let mut candidates = self.flow.recipients().await.map_err(at(Step::Select))?;
        let outcome = select_recipients(
            &mut self.flow,
            &mut candidates,
            &self.settings.recipients,
            self.settings.required_recipients,
        )
        .await;
        if !outcome.success() {
            return Err((
                FailureReason::Selection,
                Error::Selection(format!(
                    "need {} recipient(s), selected {}",
                    outcome.required,
                    outcome.selected.len()
                )),
            ));
        }

        let submitted = self
            .flow
            .submit(self.settings.auto_submit)
            .await
            .map_err(at(Step::Submit))?;

        Ok(Purchase {
            tier,
            recipients: outcome.selected,
            submitted,
        })
    }

    fn report(&mut self, record: AttemptRecord) {
        match record.failure {
            None => info!("Attempt {} succeeded: {}", record.sequence, record.reason),
            Some(FailureReason::Unexpected) => error!(
                "Attempt {} failed unexpectedly: {}",
                record.sequence, record.reason
            ),
            Some(failure) => warn!(
                "Attempt {} failed ({}): {}",
                record.sequence, failure, record.reason
            ),
        }

        if let Some(tx) = &self.reports {
            let _ = tx.send(record.clone());
        }
        self.history.push(record);
    }

    fn finish(&mut self, run_id: Uuid, outcome: FinalOutcome, elapsed: Duration) -> RunSummary {
        let mut summary = RunSummary::new(run_id, outcome, &self.history, elapsed);
        if summary.is_success() {
            if let Some(purchase) = self.last_purchase.take() {
                summary.tier = purchase.tier;
                summary.recipients = purchase.recipients;
            }
        }
        summary.log();
        summary
    }
}
