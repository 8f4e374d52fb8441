//! Scheduling primitives: start-time parsing, the sale-start waiter and
//! cancellable sleeps shared by the monitor and the acquisition loop.

pub mod waiter;

pub use waiter::{WaitOutcome, WaitProgress, Waiter};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Local-time format used by sale announcements, e.g. `2024-04-20 12:00:00`
pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a sale start instant.
///
/// Accepts RFC 3339 (`2024-04-20T12:00:00+08:00`) or [`START_TIME_FORMAT`]
/// interpreted in the local time zone.
pub fn parse_start_time(input: &str) -> Result<DateTime<Local>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Local));
    }

    let naive = NaiveDateTime::parse_from_str(input, START_TIME_FORMAT).map_err(|e| {
        Error::InvalidStartTime {
            input: input.to_string(),
            reason: e.to_string(),
        }
    })?;

    // DST gaps have no local representation; overlaps take the earlier instant
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| Error::InvalidStartTime {
            input: input.to_string(),
            reason: "time does not exist in the local time zone".to_string(),
        })
}

/// Seeded RNG for reproducible delays, entropy-seeded otherwise
pub fn new_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Uniform delay in `[min_ms, max_ms]`
pub fn random_delay(rng: &mut StdRng, min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rng.gen_range(min_ms..=max_ms))
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `false` when cancelled.
pub async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
