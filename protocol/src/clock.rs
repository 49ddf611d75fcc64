//! # Time Sources
//!
//! Vault operations read the current time exactly once, from a [`Clock`]
//! they were constructed with. Production code uses [`SystemClock`]; tests
//! and simulations use [`ManualClock`] and move time forward explicitly.
//!
//! Timestamps are unix seconds (`i64`). Nothing in the vault depends on
//! sub-second precision.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A source of unix timestamps, in seconds.
pub trait Clock {
    /// The current unix timestamp.
    fn now(&self) -> i64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> i64 {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> i64 {
        (**self).now()
    }
}

/// Wall-clock time from the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying instant, so a test can keep one handle
/// and give another to the program under test.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    /// Jumps to an absolute timestamp.
    pub fn set(&self, timestamp: i64) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    /// Moves time forward by `seconds` and returns the new timestamp.
    pub fn advance(&self, seconds: i64) -> i64 {
        self.now.fetch_add(seconds, Ordering::SeqCst) + seconds
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new(1_000);
        let handle = clock.clone();

        assert_eq!(handle.advance(5), 1_005);
        assert_eq!(clock.now(), 1_005);

        clock.set(42);
        assert_eq!(handle.now(), 42);
    }

    #[test]
    fn system_clock_is_after_2024() {
        // 2024-01-01T00:00:00Z
        assert!(SystemClock.now() > 1_704_067_200);
    }

    #[test]
    fn references_and_arcs_are_clocks() {
        let clock = ManualClock::new(7);
        let arc: Arc<dyn Clock> = Arc::new(clock.clone());
        assert_eq!((&clock).now(), 7);
        assert_eq!(arc.now(), 7);
    }
}
