//! Transaction manager
//!
//! Owns the timestamp oracle, the version store, and the per-table commit
//! guards. The commit protocol run by the engine's coordinator:
//!
//! ```text
//! 1. acquire commit guards for touched tables (sorted name order)
//! 2. validate()  - first-writer-wins over the write set
//! 3. allocate_commit_ts()
//! 4. timeline append + block write (coordinator)
//! 5. install()   - versions become globally visible
//! 6. mark_committed()
//! ```
//!
//! Holding the guard between validation and install closes the
//! check-then-act race: no other commit to the same table can slip in
//! between steps 2 and 5.

use crate::oracle::TimestampOracle;
use crate::transaction::TransactionContext;
use crate::version_store::VersionStore;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use terrace_core::{Clock, Error, Key, Record, Result, Timestamp};
use tracing::debug;

/// Observational transaction counters.
///
/// Relaxed ordering throughout: the counters are metrics, they synchronize
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxnMetrics {
    /// Transactions begun.
    pub started: u64,
    /// Transactions committed.
    pub committed: u64,
    /// Transactions aborted, by request or conflict.
    pub aborted: u64,
}

/// Coordinates transaction lifecycle and atomic commits.
pub struct TransactionManager {
    oracle: TimestampOracle,
    versions: Arc<VersionStore>,
    next_txn_id: AtomicU64,
    commit_locks: DashMap<String, Arc<Mutex<()>>>,
    started: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
}

impl TransactionManager {
    /// Create a manager over a fresh version store.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_floor(clock, 0)
    }

    /// Create a manager whose oracle never issues a timestamp at or below
    /// `floor` — used after recovery so new commits sort after replayed
    /// ones.
    pub fn with_floor(clock: Arc<dyn Clock>, floor: Timestamp) -> Self {
        Self {
            oracle: TimestampOracle::with_floor(clock, floor),
            versions: Arc::new(VersionStore::new()),
            next_txn_id: AtomicU64::new(1),
            commit_locks: DashMap::new(),
            started: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
        }
    }

    /// Begin a transaction with a fresh snapshot timestamp.
    pub fn begin(&self) -> TransactionContext {
        let txn_id = self
            .next_txn_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_add(1))
            .expect("transaction id overflow: u64::MAX reached");
        let start_ts = self.oracle.next();
        self.started.fetch_add(1, Ordering::Relaxed);
        debug!(target: "terrace::txn", txn_id, start_ts, "transaction started");
        TransactionContext::new(txn_id, start_ts)
    }

    /// Read `key` under the transaction's snapshot, honoring staged
    /// writes, and record the observation in the read set.
    pub fn read(&self, txn: &mut TransactionContext, key: &Key) -> Option<Record> {
        if let Some(staged) = txn.staged(key) {
            return staged.clone();
        }
        let seen = self.versions.visible_commit_ts(key, txn.start_ts);
        let value = self.versions.visible(key, txn.start_ts);
        txn.record_read(key.clone(), seen);
        value
    }

    /// The commit guard for `table`. Guards are acquired in sorted table
    /// order by the coordinator to prevent deadlock.
    pub fn commit_guard(&self, table: &str) -> Arc<Mutex<()>> {
        self.commit_locks
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// First-writer-wins validation over the write set.
    ///
    /// # Errors
    ///
    /// `Conflict` if any write-set key was committed by another
    /// transaction after this one's `start_ts`. The error names the key
    /// and the competing commit timestamp.
    pub fn validate(&self, txn: &TransactionContext) -> Result<()> {
        for (key, _) in txn.write_set() {
            if let Some(committed_ts) = self.versions.latest_commit_ts(key) {
                if committed_ts > txn.start_ts {
                    return Err(Error::Conflict {
                        key: key.to_string(),
                        committed_ts,
                    });
                }
            }
        }
        Ok(())
    }

    /// Allocate the commit timestamp: strictly greater than anything
    /// previously issued.
    pub fn allocate_commit_ts(&self) -> Timestamp {
        self.oracle.next()
    }

    /// Install the write set into the version store at `commit_ts`.
    /// Callers hold the table guards.
    pub fn install(&self, txn: &TransactionContext, commit_ts: Timestamp) {
        for (key, value) in txn.write_set() {
            self.versions.install(key.clone(), commit_ts, value.clone());
        }
    }

    /// Finish a successful commit: update status and metrics.
    pub fn finish_commit(&self, txn: &mut TransactionContext, commit_ts: Timestamp) {
        txn.mark_committed(commit_ts);
        self.committed.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "terrace::txn",
            txn_id = txn.txn_id,
            commit_ts,
            "transaction committed"
        );
    }

    /// Abort a transaction, discarding its staged writes.
    pub fn abort(&self, txn: &mut TransactionContext, reason: impl Into<String>) {
        let reason = reason.into();
        txn.mark_aborted(reason.clone());
        self.aborted.fetch_add(1, Ordering::Relaxed);
        debug!(target: "terrace::txn", txn_id = txn.txn_id, reason, "transaction aborted");
    }

    /// Shared handle to the version store.
    pub fn versions(&self) -> &Arc<VersionStore> {
        &self.versions
    }

    /// The timestamp oracle.
    pub fn oracle(&self) -> &TimestampOracle {
        &self.oracle
    }

    /// GC version chains against the oldest live snapshot timestamp.
    pub fn gc_versions(&self, min_ts: Timestamp) -> usize {
        self.versions.gc(min_ts)
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> TxnMetrics {
        TxnMetrics {
            started: self.started.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}
