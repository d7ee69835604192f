//! Time source used by every gate.
//!
//! Components never call `Utc::now()` directly; they read the injected
//! clock so cooldowns and staleness windows can be driven in tests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and replay.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Clock starting at a fixed, arbitrary instant.
    pub fn at_epoch_millis(millis: i64) -> Self {
        let start = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default();
        Self::new(start)
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        let mut now = self.now.lock();
        *now += delta;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Elapsed time from `earlier` to `later`, clamped at zero.
pub fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_epoch_millis(1_700_000_000_000);
        let start = clock.now();
        clock.advance(Duration::from_millis(1500));
        assert_eq!(elapsed_between(start, clock.now()), Duration::from_millis(1500));
    }

    #[test]
    fn test_elapsed_between_clamps_negative() {
        let clock = ManualClock::at_epoch_millis(1_700_000_000_000);
        let later = clock.now();
        clock.advance(Duration::from_secs(5));
        assert_eq!(elapsed_between(clock.now(), later), Duration::ZERO);
    }
}
