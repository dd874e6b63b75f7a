//! Per-table workload analyzer
//!
//! Windowed read/write counters updated in-line by the store. The
//! read/write ratio over the most recent window drives write-path
//! placement for Hybrid-mode tables.

use parking_lot::Mutex;
use std::collections::VecDeque;
use terrace_core::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Read,
    Write,
}

/// Sliding-window operation counters for one table.
pub struct WorkloadAnalyzer {
    window_micros: i64,
    events: Mutex<VecDeque<(Timestamp, Op)>>,
}

impl WorkloadAnalyzer {
    /// Create an analyzer with the given window length.
    pub fn new(window_micros: i64) -> Self {
        Self {
            window_micros,
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Record a read operation at `now`.
    pub fn record_read(&self, now: Timestamp) {
        let mut events = self.events.lock();
        events.push_back((now, Op::Read));
        Self::prune(&mut events, now, self.window_micros);
    }

    /// Record a write operation at `now`.
    pub fn record_write(&self, now: Timestamp) {
        let mut events = self.events.lock();
        events.push_back((now, Op::Write));
        Self::prune(&mut events, now, self.window_micros);
    }

    fn prune(events: &mut VecDeque<(Timestamp, Op)>, now: Timestamp, window: i64) {
        let cutoff = now.saturating_sub(window);
        while events.front().is_some_and(|(ts, _)| *ts < cutoff) {
            events.pop_front();
        }
    }

    /// Reads and writes inside the window ending at `now`.
    pub fn counts(&self, now: Timestamp) -> (u64, u64) {
        let mut events = self.events.lock();
        Self::prune(&mut events, now, self.window_micros);
        let reads = events.iter().filter(|(_, op)| *op == Op::Read).count() as u64;
        let writes = events.len() as u64 - reads;
        (reads, writes)
    }

    /// Fraction of window operations that were reads. Zero when the
    /// window is empty — a cold table has shown no read pressure.
    pub fn read_ratio(&self, now: Timestamp) -> f64 {
        let (reads, writes) = self.counts(now);
        let total = reads + writes;
        if total == 0 {
            0.0
        } else {
            reads as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_ratio_is_zero() {
        let analyzer = WorkloadAnalyzer::new(1_000);
        assert_eq!(analyzer.read_ratio(0), 0.0);
    }

    #[test]
    fn ratio_tracks_mix() {
        let analyzer = WorkloadAnalyzer::new(1_000_000);
        for _ in 0..3 {
            analyzer.record_read(100);
        }
        analyzer.record_write(100);
        assert!((analyzer.read_ratio(100) - 0.75).abs() < f64::EPSILON);
        assert_eq!(analyzer.counts(100), (3, 1));
    }

    #[test]
    fn old_events_age_out() {
        let analyzer = WorkloadAnalyzer::new(100);
        analyzer.record_read(10);
        analyzer.record_write(10);
        assert_eq!(analyzer.counts(50), (1, 1));
        // Window has moved past the events.
        assert_eq!(analyzer.counts(500), (0, 0));
        assert_eq!(analyzer.read_ratio(500), 0.0);
    }
}
