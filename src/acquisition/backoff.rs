//! Delay between acquisition attempts
//!
//! Every 10th attempt, and any attempt that ended in an unexpected error,
//! is followed by a cool-down of twice the base delay.

use rand::rngs::StdRng;
use std::time::Duration;

use crate::config::{JitterRange, StrategyConfig};
use crate::schedule::{new_rng, random_delay};

/// Attempts between forced cool-downs
pub const COOL_DOWN_EVERY: u32 = 10;

/// Cool-down length as a multiple of the base delay
pub const COOL_DOWN_FACTOR: u32 = 2;

pub struct BackoffPolicy {
    base: Duration,
    jitter: Option<JitterRange>,
    rng: StdRng,
}

impl BackoffPolicy {
    pub fn new(base: Duration, jitter: Option<JitterRange>, seed: Option<u64>) -> Self {
        Self {
            base,
            jitter,
            rng: new_rng(seed),
        }
    }

    pub fn from_strategy(strategy: &StrategyConfig) -> Self {
        Self::new(strategy.base_delay(), strategy.jitter, None)
    }

    /// Delay before the attempt following `attempt`, without jitter
    pub fn base_delay_for(&self, attempt: u32, unexpected: bool) -> Duration {
        if unexpected || (attempt > 0 && attempt % COOL_DOWN_EVERY == 0) {
            self.base * COOL_DOWN_FACTOR
        } else {
            self.base
        }
    }

    /// Delay before the attempt following `attempt`, jitter included
    pub fn delay_for(&mut self, attempt: u32, unexpected: bool) -> Duration {
        let delay = self.base_delay_for(attempt, unexpected);
        match self.jitter {
            Some(j) => delay + random_delay(&mut self.rng, j.min_ms, j.max_ms),
            None => delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tenth_attempt_cools_down() {
        let policy = BackoffPolicy::new(Duration::from_millis(500), None, Some(1));
        let cool_down = Duration::from_secs(1);

        for attempt in 1..=30 {
            let expected = if attempt % 10 == 0 {
                cool_down
            } else {
                Duration::from_millis(500)
            };
            assert_eq!(policy.base_delay_for(attempt, false), expected, "attempt {}", attempt);
        }
    }

    #[test]
    fn test_unexpected_error_cools_down() {
        let policy = BackoffPolicy::new(Duration::from_millis(500), None, None);
        assert_eq!(policy.base_delay_for(3, true), Duration::from_secs(1));
        assert_eq!(policy.base_delay_for(10, true), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_added_within_range() {
        let jitter = JitterRange {
            min_ms: 100,
            max_ms: 300,
        };
        let mut policy = BackoffPolicy::new(Duration::from_millis(500), Some(jitter), Some(42));

        for attempt in 1..50 {
            let delay = policy.delay_for(attempt, false);
            let base = policy.base_delay_for(attempt, false);
            assert!(delay >= base + Duration::from_millis(100));
            assert!(delay <= base + Duration::from_millis(300));
        }
    }
}
