//! Global timestamp oracle
//!
//! One monotonic counter for the whole engine. Every issued timestamp is
//! strictly greater than every previously issued one, and never behind the
//! wall clock — so commit timestamps are comparable with parsed wall-clock
//! inputs for time travel.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use terrace_core::{Clock, Timestamp};

/// Monotonic logical-timestamp source.
pub struct TimestampOracle {
    clock: Arc<dyn Clock>,
    last: AtomicI64,
}

impl TimestampOracle {
    /// Create an oracle seeded from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: AtomicI64::new(0),
        }
    }

    /// Create an oracle that will never issue a timestamp at or below
    /// `floor` — used after recovery so new commits sort after replayed
    /// ones.
    pub fn with_floor(clock: Arc<dyn Clock>, floor: Timestamp) -> Self {
        Self {
            clock,
            last: AtomicI64::new(floor),
        }
    }

    /// Issue the next timestamp: strictly greater than all prior issues,
    /// and at least the current wall clock.
    ///
    /// # Panics
    ///
    /// Timestamp exhaustion (the counter reaching `i64::MAX`) is fatal.
    pub fn next(&self) -> Timestamp {
        let now = self.clock.now_micros();
        self.last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                let candidate = now.max(last.checked_add(1)?);
                Some(candidate)
            })
            .map(|last| {
                let issued = now.max(last + 1);
                debug_assert!(issued > last);
                issued
            })
            .expect("timestamp counter exhausted: i64::MAX reached")
    }

    /// The most recently issued timestamp (0 if none yet).
    pub fn current(&self) -> Timestamp {
        self.last.load(Ordering::SeqCst)
    }

    /// Current wall-clock reading, without issuing a timestamp.
    pub fn now(&self) -> Timestamp {
        self.clock.now_micros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use terrace_core::ManualClock;

    #[test]
    fn strictly_increasing_under_frozen_clock() {
        let oracle = TimestampOracle::new(Arc::new(ManualClock::new(1_000)));
        let a = oracle.next();
        let b = oracle.next();
        let c = oracle.next();
        assert!(a < b && b < c);
        assert!(a >= 1_000);
    }

    #[test]
    fn follows_advancing_clock() {
        let clock = Arc::new(ManualClock::new(1_000));
        let oracle = TimestampOracle::new(clock.clone());
        let a = oracle.next();
        clock.set(50_000);
        let b = oracle.next();
        assert_eq!(a, 1_000);
        assert_eq!(b, 50_000);
    }

    #[test]
    fn floor_is_respected() {
        let oracle = TimestampOracle::with_floor(Arc::new(ManualClock::new(10)), 9_999);
        assert!(oracle.next() > 9_999);
    }

    #[test]
    fn current_tracks_last_issue() {
        let oracle = TimestampOracle::new(Arc::new(ManualClock::new(500)));
        assert_eq!(oracle.current(), 0);
        let t = oracle.next();
        assert_eq!(oracle.current(), t);
    }

    #[test]
    fn concurrent_issues_are_unique() {
        let oracle = Arc::new(TimestampOracle::new(Arc::new(ManualClock::new(1))));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let oracle = Arc::clone(&oracle);
            handles.push(std::thread::spawn(move || {
                (0..250).map(|_| oracle.next()).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<Timestamp> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let len = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), len);
    }
}
