//! Attempt records and run summaries

use chrono::{DateTime, Local};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Attempts kept in memory for the run summary
pub const HISTORY_LIMIT: usize = 50;

/// Why an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureReason {
    Navigation,
    ElementNotFound,
    Selection,
    Submission,
    Unexpected,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Navigation => "navigation",
            FailureReason::ElementNotFound => "element not found",
            FailureReason::Selection => "selection",
            FailureReason::Submission => "submission",
            FailureReason::Unexpected => "unexpected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub sequence: u32,
    /// `None` for a successful attempt
    pub failure: Option<FailureReason>,
    pub reason: String,
    pub finished_at: DateTime<Local>,
}

impl AttemptRecord {
    pub fn success(sequence: u32, reason: impl Into<String>) -> Self {
        Self {
            sequence,
            failure: None,
            reason: reason.into(),
            finished_at: Local::now(),
        }
    }

    pub fn failure(sequence: u32, failure: FailureReason, reason: impl Into<String>) -> Self {
        Self {
            sequence,
            failure: Some(failure),
            reason: reason.into(),
            finished_at: Local::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Bounded attempt history plus per-reason totals over the whole run
#[derive(Debug, Default)]
pub struct AttemptHistory {
    recent: VecDeque<AttemptRecord>,
    failures: BTreeMap<FailureReason, u32>,
    total: u32,
}

impl AttemptHistory {
    pub fn push(&mut self, record: AttemptRecord) {
        self.total += 1;
        if let Some(reason) = record.failure {
            *self.failures.entry(reason).or_default() += 1;
        }
        if self.recent.len() == HISTORY_LIMIT {
            self.recent.pop_front();
        }
        self.recent.push_back(record);
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn recent(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.recent.iter()
    }

    pub fn failures(&self) -> &BTreeMap<FailureReason, u32> {
        &self.failures
    }
}

/// How the run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalOutcome {
    Success,
    /// All permitted attempts failed
    Exhausted,
    /// Cancelled before success
    Stopped,
    /// Could not run at all
    Fatal(String),
}

impl fmt::Display for FinalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalOutcome::Success => write!(f, "success"),
            FinalOutcome::Exhausted => write!(f, "exhausted"),
            FinalOutcome::Stopped => write!(f, "stopped"),
            FinalOutcome::Fatal(reason) => write!(f, "fatal: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcome: FinalOutcome,
    pub attempts: u32,
    pub failures: BTreeMap<FailureReason, u32>,
    pub elapsed: Duration,
    /// Tier text of the successful attempt
    pub tier: Option<String>,
    /// Recipients of the successful attempt
    pub recipients: Vec<String>,
}

impl RunSummary {
    pub fn new(run_id: Uuid, outcome: FinalOutcome, history: &AttemptHistory, elapsed: Duration) -> Self {
        Self {
            run_id,
            outcome,
            attempts: history.total(),
            failures: history.failures().clone(),
            elapsed,
            tier: None,
            recipients: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == FinalOutcome::Success
    }

    /// Emit the terminal summary line
    pub fn log(&self) {
        let failures = self
            .failures
            .iter()
            .map(|(reason, count)| format!("{}={}", reason, count))
            .collect::<Vec<_>>()
            .join(", ");

        info!(
            "Run {} finished: {} after {} attempt(s) in {:.1}s{}{}",
            self.run_id,
            self.outcome,
            self.attempts,
            self.elapsed.as_secs_f64(),
            if failures.is_empty() {
                String::new()
            } else {
                format!(" [{}]", failures)
            },
            match &self.tier {
                Some(tier) => format!(" tier '{}' for {}", tier, self.recipients.join(", ")),
                None => String::new(),
            }
        );
    }
}
