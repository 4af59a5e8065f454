//! Wall clock seam

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> i64;

    /// Current instant
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_ms())
            .single()
            .unwrap_or_default()
    }
}

/// Real time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Hand-driven time for tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    ms: AtomicI64,
}

impl ManualClock {
    /// Clock frozen at `epoch_ms`
    #[must_use]
    pub fn at(epoch_ms: i64) -> Self {
        Self {
            ms: AtomicI64::new(epoch_ms),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.ms.fetch_add(delta, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set(&self, epoch_ms: i64) {
        self.ms.store(epoch_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::at(1_000);
        clock.advance(Duration::from_secs(60));
        assert_eq!(clock.now_ms(), 61_000);
        assert_eq!(clock.now().timestamp_millis(), 61_000);
    }
}
