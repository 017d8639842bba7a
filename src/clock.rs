//! Clocks consumed by the fabric.
//!
//! The fabric never sets a clock; it only reads one. Reads must never go backwards, and the clock
//! must advertise the drift bound (`max_offset`) that the rest of the cluster is designed around.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

pub trait Clock: Send + Sync {
    /// Current local time in nanoseconds since the unix epoch. Successive reads are monotonically
    /// non-decreasing.
    fn now_nanos(&self) -> i64;

    /// How far this clock may drift from the true cluster time while the system's ordering
    /// guarantees still hold.
    fn max_offset(&self) -> Duration;
}

/// Wall clock with enforced monotonicity.
pub struct SystemClock {
    max_offset: Duration,
    last: AtomicI64,
}

impl SystemClock {
    pub fn new(max_offset: Duration) -> Arc<SystemClock> {
        Arc::new(SystemClock { max_offset, last: AtomicI64::new(0) })
    }
}

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        let now = Utc::now().timestamp_nanos();
        // The OS clock can be stepped backwards; reads of this clock cannot.
        let prev = self.last.fetch_max(now, Ordering::SeqCst);
        if prev > now {
            prev
        } else {
            now
        }
    }

    fn max_offset(&self) -> Duration {
        self.max_offset
    }
}

/// A clock driven entirely by its owner: it starts at a fixed instant and advances a configurable
/// amount on every read. Useful in tests that need exact round-trip arithmetic.
pub struct ManualClock {
    now: AtomicI64,
    advance: AtomicI64,
    max_offset: Duration,
}

impl ManualClock {
    pub fn new(start_nanos: i64, max_offset: Duration) -> Arc<ManualClock> {
        Arc::new(ManualClock { now: AtomicI64::new(start_nanos), advance: AtomicI64::new(0), max_offset })
    }

    /// Every subsequent read advances the clock by `interval`.
    pub fn set_advance_interval(&self, interval: Duration) {
        self.advance.store(interval.as_nanos() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> i64 {
        self.now.fetch_add(self.advance.load(Ordering::SeqCst), Ordering::SeqCst)
    }

    fn max_offset(&self) -> Duration {
        self.max_offset
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn system_clock_is_monotone() {
        let clock = SystemClock::new(Duration::from_millis(250));
        let mut last = clock.now_nanos();
        for _ in 0..1000 {
            let now = clock.now_nanos();
            assert!(now >= last);
            last = now;
        }
        assert_eq!(clock.max_offset(), Duration::from_millis(250));
    }

    #[test]
    fn manual_clock_advances_per_read() {
        let clock = ManualClock::new(10, Duration::from_nanos(100));
        assert_eq!(clock.now_nanos(), 10);
        assert_eq!(clock.now_nanos(), 10);

        clock.set_advance_interval(Duration::from_nanos(3));
        assert_eq!(clock.now_nanos(), 10);
        assert_eq!(clock.now_nanos(), 13);
        assert_eq!(clock.now_nanos(), 16);
    }
}
