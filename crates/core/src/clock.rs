//! Injectable time source and timestamp parsing
//!
//! All engine timestamps are microseconds since the Unix epoch, produced
//! through the `Clock` trait: `SystemClock` in production, `ManualClock` in
//! tests. The parsing boundary is the only place where other units appear.

use crate::error::{Error, Result};
use crate::types::Timestamp;
use chrono::NaiveDateTime;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix integers with absolute value below this are read as seconds;
/// at or above, as microseconds. The cutoff (~year 5138 in seconds,
/// ~1973 in microseconds) keeps both interpretations unambiguous for
/// real-world dates.
const SECONDS_CUTOFF: i64 = 100_000_000_000;

/// Monotonic wall-clock abstraction.
///
/// Everything that needs "now" — the timestamp oracle, tier aging, cache
/// TTLs, workload windows — takes a `Clock` so tests can drive time
/// explicitly.
pub trait Clock: Send + Sync {
    /// Current time in microseconds since the Unix epoch.
    fn now_micros(&self) -> Timestamp;
}

/// Production clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> Timestamp {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_micros() as i64,
            // Pre-epoch system clocks are not supported in production;
            // zero keeps the oracle monotonic rather than panicking.
            Err(_) => 0,
        }
    }
}

/// Test clock advanced by hand.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start` microseconds.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward by `delta` microseconds.
    pub fn advance(&self, delta: Timestamp) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Parse a user-supplied timestamp into engine microseconds.
///
/// Accepted forms:
/// - Unix integer: seconds or microseconds, inferred by magnitude.
///   Negative integers denote pre-epoch instants.
/// - ISO-8601 UTC: `YYYY-MM-DDTHH:MM:SSZ`.
///
/// # Errors
///
/// `Error::InvalidOperation` if the text matches neither form or the
/// seconds value overflows the microsecond range.
pub fn parse_timestamp(text: &str) -> Result<Timestamp> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidOperation("empty timestamp".to_string()));
    }

    if let Ok(n) = trimmed.parse::<i64>() {
        if n.abs() < SECONDS_CUTOFF {
            return n.checked_mul(1_000_000).ok_or_else(|| {
                Error::InvalidOperation(format!("timestamp out of range: {}", trimmed))
            });
        }
        return Ok(n);
    }

    let parsed = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%SZ")
        .map_err(|e| Error::InvalidOperation(format!("bad timestamp {:?}: {}", trimmed, e)))?;
    Ok(parsed.and_utc().timestamp_micros())
}
