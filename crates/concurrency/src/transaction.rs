//! Transaction context
//!
//! Tracks one transaction's private state: the keys it observed (and at
//! which committed timestamp), the writes it staged, and its place in the
//! status machine.
//!
//! State transitions:
//! - `Active` → `Committed` on successful commit
//! - `Active` → `Aborted` on explicit abort or commit conflict
//!
//! Terminal states persist for the context's lifetime only; the context is
//! discarded after resolution.
//!
//! # Read-your-writes
//!
//! A read checks the staged write set before the snapshot: an uncommitted
//! write from this transaction is returned, an uncommitted delete reads as
//! absent, everything else comes from the version store at `start_ts`.

use std::collections::HashMap;
use terrace_core::{Key, Record, Timestamp};

/// Status of a transaction in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnStatus {
    /// Executing; reads and writes are allowed.
    Active,
    /// Commit succeeded; the write set is installed.
    Committed,
    /// Rolled back, by request or by conflict.
    Aborted {
        /// Human-readable reason.
        reason: String,
    },
}

/// Private state of one transaction.
#[derive(Debug)]
pub struct TransactionContext {
    /// Unique transaction id.
    pub txn_id: u64,
    /// Snapshot timestamp assigned at begin; all reads observe commits
    /// with `commit_ts ≤ start_ts`.
    pub start_ts: Timestamp,
    /// Commit timestamp, set when the transaction commits.
    pub commit_ts: Option<Timestamp>,
    /// Keys observed, with the commit timestamp seen (`None` = not found).
    pub read_set: HashMap<Key, Option<Timestamp>>,
    /// Staged writes; `None` is a staged delete. Not visible globally.
    write_set: HashMap<Key, Option<Record>>,
    /// Current lifecycle status.
    pub status: TxnStatus,
}

impl TransactionContext {
    /// Create an active context.
    pub fn new(txn_id: u64, start_ts: Timestamp) -> Self {
        Self {
            txn_id,
            start_ts,
            commit_ts: None,
            read_set: HashMap::new(),
            write_set: HashMap::new(),
            status: TxnStatus::Active,
        }
    }

    /// Whether the transaction can still read and write.
    pub fn is_active(&self) -> bool {
        self.status == TxnStatus::Active
    }

    /// Stage a write. Repeated writes to the same key overwrite the
    /// staged value; nothing is visible globally until commit.
    pub fn stage_write(&mut self, key: Key, record: Record) {
        debug_assert!(self.is_active());
        self.write_set.insert(key, Some(record));
    }

    /// Stage a delete (a tombstone at commit).
    pub fn stage_delete(&mut self, key: Key) {
        debug_assert!(self.is_active());
        self.write_set.insert(key, None);
    }

    /// The staged value for `key`: `Some(None)` is a staged delete,
    /// `None` means the key is untouched by this transaction.
    pub fn staged(&self, key: &Key) -> Option<&Option<Record>> {
        self.write_set.get(key)
    }

    /// Record an observed read for validation diagnostics.
    pub fn record_read(&mut self, key: Key, seen_commit_ts: Option<Timestamp>) {
        self.read_set.entry(key).or_insert(seen_commit_ts);
    }

    /// Iterate staged writes.
    pub fn write_set(&self) -> impl Iterator<Item = (&Key, &Option<Record>)> {
        self.write_set.iter()
    }

    /// Number of staged writes (deletes included).
    pub fn pending_writes(&self) -> usize {
        self.write_set.len()
    }

    /// Distinct tables this transaction writes, sorted. Commit acquires
    /// table guards in exactly this order.
    pub fn tables_touched(&self) -> Vec<String> {
        let mut tables: Vec<String> = self
            .write_set
            .keys()
            .map(|k| k.table.clone())
            .collect();
        tables.sort();
        tables.dedup();
        tables
    }

    /// Staged writes for one table, sorted by key for deterministic
    /// change ordering.
    pub fn writes_for_table(&self, table: &str) -> Vec<(Key, Option<Record>)> {
        let mut writes: Vec<(Key, Option<Record>)> = self
            .write_set
            .iter()
            .filter(|(k, _)| k.table == table)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        writes.sort_by(|a, b| a.0.cmp(&b.0));
        writes
    }

    /// Transition to `Committed` at `commit_ts`.
    pub fn mark_committed(&mut self, commit_ts: Timestamp) {
        debug_assert!(self.is_active());
        self.commit_ts = Some(commit_ts);
        self.status = TxnStatus::Committed;
    }

    /// Transition to `Aborted`, discarding the write set.
    pub fn mark_aborted(&mut self, reason: impl Into<String>) {
        self.write_set.clear();
        self.status = TxnStatus::Aborted {
            reason: reason.into(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrace_core::Value;

    fn rec(v: i64) -> Record {
        Record::from([("v", Value::Int(v))])
    }

    #[test]
    fn starts_active() {
        let txn = TransactionContext::new(1, 100);
        assert!(txn.is_active());
        assert_eq!(txn.start_ts, 100);
        assert_eq!(txn.pending_writes(), 0);
    }

    #[test]
    fn repeated_writes_overwrite() {
        let mut txn = TransactionContext::new(1, 100);
        let key = Key::new("t", "k");
        txn.stage_write(key.clone(), rec(1));
        txn.stage_write(key.clone(), rec(2));
        assert_eq!(txn.pending_writes(), 1);
        assert_eq!(txn.staged(&key), Some(&Some(rec(2))));
    }

    #[test]
    fn staged_delete_shadows_write() {
        let mut txn = TransactionContext::new(1, 100);
        let key = Key::new("t", "k");
        txn.stage_write(key.clone(), rec(1));
        txn.stage_delete(key.clone());
        assert_eq!(txn.staged(&key), Some(&None));
    }

    #[test]
    fn tables_touched_sorted_dedup() {
        let mut txn = TransactionContext::new(1, 100);
        txn.stage_write(Key::new("b", "1"), rec(1));
        txn.stage_write(Key::new("a", "1"), rec(1));
        txn.stage_write(Key::new("a", "2"), rec(2));
        assert_eq!(txn.tables_touched(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(txn.writes_for_table("a").len(), 2);
    }

    #[test]
    fn commit_transition_records_timestamp() {
        let mut txn = TransactionContext::new(1, 100);
        txn.mark_committed(200);
        assert_eq!(txn.status, TxnStatus::Committed);
        assert_eq!(txn.commit_ts, Some(200));
    }

    #[test]
    fn abort_discards_writes() {
        let mut txn = TransactionContext::new(1, 100);
        txn.stage_write(Key::new("t", "k"), rec(1));
        txn.mark_aborted("conflict");
        assert_eq!(txn.pending_writes(), 0);
        assert!(matches!(txn.status, TxnStatus::Aborted { .. }));
    }

    #[test]
    fn first_read_observation_wins() {
        let mut txn = TransactionContext::new(1, 100);
        let key = Key::new("t", "k");
        txn.record_read(key.clone(), Some(50));
        txn.record_read(key.clone(), Some(80));
        assert_eq!(txn.read_set.get(&key), Some(&Some(50)));
    }
}
