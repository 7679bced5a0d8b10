//! Millisecond time sources.
//!
//! Lease windows cross process boundaries and are compared against values
//! published through the coordination service, so the production clock is
//! wall time in Unix milliseconds. The only local contract is that two
//! samples taken on the same task are non-decreasing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A millisecond clock.
pub trait Clock: Send + Sync {
    /// Current time in Unix milliseconds. Non-decreasing between two
    /// samples on the same task.
    fn now_millis(&self) -> u64;
}

/// Wall-clock time source backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_millis() as u64,
            // A pre-epoch clock reads as 0, which can only shorten a lease.
            Err(_) => 0,
        }
    }
}

/// Settable clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `start_millis`.
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::Release);
    }

    /// Move the clock forward.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_non_decreasing() {
        let clock = SystemClock;
        let t1 = clock.now_millis();
        let t2 = clock.now_millis();
        assert!(t2 >= t1);
        assert!(t1 > 0);
    }

    #[test]
    fn manual_clock_set_and_advance() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);

        clock.advance(250);
        assert_eq!(clock.now_millis(), 1_250);

        clock.set(10_000);
        assert_eq!(clock.now_millis(), 10_000);
    }
}
