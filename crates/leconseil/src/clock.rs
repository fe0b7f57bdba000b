// Time source used for trending windows, cache expiry and row timestamps

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current instant
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock, second resolution.
#[derive(Debug)]
pub struct FixedClock {
    secs: AtomicI64,
}

impl FixedClock {
    /// Clock frozen at `at`
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            secs: AtomicI64::new(at.timestamp()),
        }
    }

    /// Move the clock forward (or backward for a negative duration)
    pub fn advance(&self, by: Duration) {
        self.secs.fetch_add(by.num_seconds(), Ordering::SeqCst);
    }

    /// Jump to an instant
    pub fn set(&self, at: DateTime<Utc>) {
        self.secs.store(at.timestamp(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.secs.load(Ordering::SeqCst), 0).unwrap_or_default()
    }
}
