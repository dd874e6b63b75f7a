//! Memory manager
//!
//! Query, cache, and compaction pools with quotas. Consumers declare a
//! pool and reserve before allocating; the RAII reservation releases on
//! every exit path. When aggregate occupancy crosses the pressure
//! threshold, reservations fail and the consumer is expected to yield and
//! retry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use terrace_core::{Error, Result};
use tracing::warn;

/// Which pool an allocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Scan and join working memory.
    Query,
    /// Result-cache residency.
    Cache,
    /// Compaction scratch space.
    Compaction,
}

impl PoolKind {
    fn name(&self) -> &'static str {
        match self {
            PoolKind::Query => "query",
            PoolKind::Cache => "cache",
            PoolKind::Compaction => "compaction",
        }
    }
}

struct Pool {
    kind: PoolKind,
    quota: u64,
    used: AtomicU64,
}

/// Occupancy snapshot of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolUsage {
    /// The pool.
    pub kind: PoolKind,
    /// Bytes in use.
    pub used: u64,
    /// Quota in bytes.
    pub quota: u64,
}

/// Snapshot of all pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReport {
    /// Per-pool occupancy, query/cache/compaction order.
    pub pools: [PoolUsage; 3],
    /// Whether aggregate occupancy exceeds the pressure threshold.
    pub under_pressure: bool,
}

/// Central pool accounting with leak detection at drop.
pub struct MemoryManager {
    query: Arc<Pool>,
    cache: Arc<Pool>,
    compaction: Arc<Pool>,
    /// Aggregate occupancy fraction above which pressure is reported.
    pressure_threshold: f64,
}

impl MemoryManager {
    /// Create a manager with per-pool quotas in bytes.
    pub fn new(query_quota: u64, cache_quota: u64, compaction_quota: u64) -> Self {
        let pool = |kind, quota| {
            Arc::new(Pool {
                kind,
                quota,
                used: AtomicU64::new(0),
            })
        };
        Self {
            query: pool(PoolKind::Query, query_quota),
            cache: pool(PoolKind::Cache, cache_quota),
            compaction: pool(PoolKind::Compaction, compaction_quota),
            pressure_threshold: 0.9,
        }
    }

    fn pool(&self, kind: PoolKind) -> &Arc<Pool> {
        match kind {
            PoolKind::Query => &self.query,
            PoolKind::Cache => &self.cache,
            PoolKind::Compaction => &self.compaction,
        }
    }

    /// Reserve `bytes` from `kind`'s pool.
    ///
    /// # Errors
    ///
    /// `Storage` (retryable) when the reservation would exceed the pool
    /// quota — the caller should yield and retry.
    pub fn reserve(&self, kind: PoolKind, bytes: u64) -> Result<MemoryReservation> {
        let pool = self.pool(kind);
        let mut current = pool.used.load(Ordering::SeqCst);
        loop {
            let next = current.saturating_add(bytes);
            if next > pool.quota {
                return Err(Error::Storage(format!(
                    "memory pressure in {} pool: {} + {} exceeds quota {}",
                    pool.kind.name(),
                    current,
                    bytes,
                    pool.quota
                )));
            }
            match pool.used.compare_exchange(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    return Ok(MemoryReservation {
                        pool: Arc::clone(pool),
                        bytes,
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Occupancy report.
    pub fn report(&self) -> MemoryReport {
        let usage = |pool: &Arc<Pool>| PoolUsage {
            kind: pool.kind,
            used: pool.used.load(Ordering::SeqCst),
            quota: pool.quota,
        };
        let pools = [usage(&self.query), usage(&self.cache), usage(&self.compaction)];
        let used: u64 = pools.iter().map(|p| p.used).sum();
        let quota: u64 = pools.iter().map(|p| p.quota).sum();
        MemoryReport {
            pools,
            under_pressure: quota > 0 && used as f64 / quota as f64 > self.pressure_threshold,
        }
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        for pool in [&self.query, &self.cache, &self.compaction] {
            let used = pool.used.load(Ordering::SeqCst);
            if used != 0 {
                warn!(
                    target: "terrace::memory",
                    pool = pool.kind.name(),
                    used,
                    "pool still occupied at shutdown; leaked reservation"
                );
            }
        }
    }
}

/// RAII reservation; releases its bytes when dropped.
pub struct MemoryReservation {
    pool: Arc<Pool>,
    bytes: u64,
}

impl std::fmt::Debug for MemoryReservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryReservation")
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl MemoryReservation {
    /// Bytes held by this reservation.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.pool.used.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}
