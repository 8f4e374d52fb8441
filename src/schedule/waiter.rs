//! Sale-start waiter
//!
//! Sleeps until the configured start instant in chunks of at most 10s,
//! reporting progress after every chunk, and wakes 0.5s early to absorb
//! clock skew between this machine and the ticketing servers.
//!
//! The deadline is computed once from the wall clock and then tracked on the
//! monotonic tokio clock, so NTP corrections mid-wait don't move it.

use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{parse_start_time, sleep_or_cancel};

/// Longest single sleep between progress reports
pub const MAX_CHUNK: Duration = Duration::from_secs(10);

/// How much earlier than the target the waiter returns
pub const EARLY_START: Duration = Duration::from_millis(500);

const MIN_PREPARATION: Duration = Duration::from_secs(1);
const MAX_PREPARATION: Duration = Duration::from_secs(10);

/// Result of waiting for the start instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Start instant reached (or already past)
    Proceeded,
    /// Cancellation requested while waiting
    Cancelled,
    /// Start instant could not be interpreted; the run must not continue
    Failed(String),
}

/// Emitted after each sleep chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitProgress {
    pub remaining: Duration,
}

/// Margin kept before the deadline for final preparation: 10% of the wait,
/// clamped to [1s, 10s]
pub fn preparation_margin(wait: Duration) -> Duration {
    wait.mul_f64(0.1).clamp(MIN_PREPARATION, MAX_PREPARATION)
}

/// Waits for the sale to open
pub struct Waiter {
    cancel: CancellationToken,
    progress: Option<mpsc::UnboundedSender<WaitProgress>>,
}

impl Waiter {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            progress: None,
        }
    }

    /// Also deliver progress notifications on a channel
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<WaitProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Wait for a start instant given as text. `None` starts immediately.
    pub async fn wait_until_str(&self, start_time: Option<&str>) -> WaitOutcome {
        let Some(input) = start_time else {
            info!("No start time configured, starting immediately");
            return WaitOutcome::Proceeded;
        };

        match parse_start_time(input) {
            Ok(target) => self.wait_until(target).await,
            Err(e) => {
                warn!("Cannot wait for start time: {}", e);
                WaitOutcome::Failed(e.to_string())
            }
        }
    }

    /// Wait until `target`, returning immediately if it has already passed
    pub async fn wait_until(&self, target: DateTime<Local>) -> WaitOutcome {
        let now = Local::now();
        if now >= target {
            info!("Start time {} already passed, starting immediately", target);
            return WaitOutcome::Proceeded;
        }

        let wait = (target - now).to_std().unwrap_or_default();
        info!(
            "Waiting {:.1}s for sale start at {}",
            wait.as_secs_f64(),
            target.format("%Y-%m-%d %H:%M:%S")
        );
        self.wait_for(wait).await
    }

    /// Wait for a relative duration using the chunked schedule
    pub async fn wait_for(&self, wait: Duration) -> WaitOutcome {
        if wait.is_zero() {
            return WaitOutcome::Proceeded;
        }

        let deadline = Instant::now() + wait;
        let preparation = preparation_margin(wait);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining <= preparation {
                break;
            }

            let chunk = (remaining - preparation).min(MAX_CHUNK);
            if !sleep_or_cancel(&self.cancel, chunk).await {
                info!("Wait for sale start cancelled");
                return WaitOutcome::Cancelled;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            self.report(remaining);
        }

        info!("Preparing to start...");

        // Final phase: wake slightly before the deadline
        let wake_at = deadline.checked_sub(EARLY_START).unwrap_or(deadline);
        let final_sleep = wake_at.saturating_duration_since(Instant::now());
        if !sleep_or_cancel(&self.cancel, final_sleep).await {
            info!("Wait for sale start cancelled");
            return WaitOutcome::Cancelled;
        }

        debug!("Start instant reached");
        WaitOutcome::Proceeded
    }

    fn report(&self, remaining: Duration) {
        info!("Sale starts in {:.1}s", remaining.as_secs_f64());

        if let Some(tx) = &self.progress {
            // Receiver gone just means nobody is watching
            let _ = tx.send(WaitProgress { remaining });
        }
    }
}
