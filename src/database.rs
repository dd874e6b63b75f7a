//! Public database handle
//!
//! [`Terrace`] is a thin delegation layer over the engine crate: it pins
//! the public API surface and keeps the internal crates out of downstream
//! signatures.

use std::path::Path;
use terrace_concurrency::{SnapshotRecord, TransactionContext};
use terrace_core::{ColumnDef, CommitId, Record, Result, StorageMode, Timestamp, Value, Watermark};
use terrace_engine::{ChangeSet, Engine, EngineMetrics, OpenOptions, RefreshStrategy, ResultSet};
use terrace_storage::IndexKind;

/// A Terrace database rooted at one directory.
pub struct Terrace {
    engine: Engine,
}

impl std::fmt::Debug for Terrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terrace").finish_non_exhaustive()
    }
}

impl Terrace {
    /// Open or create a database at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            engine: Engine::open(path)?,
        })
    }

    /// Open or create a database at `path`.
    pub fn open_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        Ok(Self {
            engine: Engine::open_with(path, options)?,
        })
    }

    /// The underlying engine, for advanced callers.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    // ------------------------------------------------------------------
    // Tables and schema
    // ------------------------------------------------------------------

    /// Create a table.
    pub fn create_table(
        &self,
        name: &str,
        columns: Vec<ColumnDef>,
        mode: StorageMode,
    ) -> Result<()> {
        self.engine.create_table(name, columns, mode)
    }

    /// Drop a table and its on-disk state.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.engine.drop_table(name)
    }

    /// Add a column; returns the new schema version.
    pub fn add_column(&self, table: &str, column: ColumnDef) -> Result<u32> {
        self.engine.add_column(table, column)
    }

    /// Drop a column; returns the new schema version.
    pub fn drop_column(&self, table: &str, column: &str) -> Result<u32> {
        self.engine.drop_column(table, column)
    }

    /// Create an ordered secondary index over `columns`.
    pub fn create_index(&self, table: &str, name: &str, columns: Vec<String>) -> Result<()> {
        self.engine
            .create_index(table, name, columns, IndexKind::Ordered)
    }

    /// Drop an index by name.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.engine.drop_index(name)
    }

    /// Registered table names.
    pub fn list_tables(&self) -> Vec<String> {
        self.engine.list_tables()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert records in one atomic commit.
    pub fn insert(&self, table: &str, records: Vec<Record>) -> Result<CommitId> {
        self.engine.insert(table, records)
    }

    /// Insert-or-update records keyed by `key_columns`.
    pub fn upsert(
        &self,
        table: &str,
        records: Vec<Record>,
        key_columns: Vec<String>,
    ) -> Result<CommitId> {
        self.engine.upsert(table, records, key_columns)
    }

    /// Delete rows by primary-key values.
    pub fn delete(&self, table: &str, keys: Vec<Value>) -> Result<CommitId> {
        self.engine.delete(table, keys)
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Begin an explicit transaction.
    pub fn begin(&self) -> TransactionContext {
        self.engine.begin()
    }

    /// Read a row under the transaction's snapshot.
    pub fn txn_read(&self, txn: &mut TransactionContext, table: &str, row: &str) -> Option<Record> {
        self.engine.txn_read(txn, table, row)
    }

    /// Stage a write; nothing is visible until commit.
    pub fn txn_write(
        &self,
        txn: &mut TransactionContext,
        table: &str,
        row: &str,
        record: Record,
    ) -> Result<()> {
        self.engine.txn_write(txn, table, row, record)
    }

    /// Stage a delete.
    pub fn txn_delete(&self, txn: &mut TransactionContext, table: &str, row: &str) -> Result<()> {
        self.engine.txn_delete(txn, table, row)
    }

    /// Commit; `Conflict` under first-writer-wins aborts the caller.
    pub fn commit(&self, txn: &mut TransactionContext) -> Result<Timestamp> {
        self.engine.commit(txn)
    }

    /// Abort, discarding staged writes.
    pub fn abort(&self, txn: &mut TransactionContext) {
        self.engine.abort(txn)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Execute a read query.
    pub fn query(&self, table: &str, text: &str) -> Result<ResultSet> {
        self.engine.query(table, text)
    }

    /// Execute a read query at a past timestamp (futures clamp to the
    /// latest commit).
    pub fn query_as_of(&self, table: &str, at: Timestamp, text: &str) -> Result<ResultSet> {
        self.engine.query_as_of(table, at, text)
    }

    /// Execute a read query over the commits in `[start, end]`
    /// (inclusive; `end == 0` unbounded).
    pub fn query_range(
        &self,
        table: &str,
        start: Timestamp,
        end: Timestamp,
        text: &str,
    ) -> Result<ResultSet> {
        self.engine.query_range(table, start, end, text)
    }

    /// Execute a read query over commits after `watermark`.
    pub fn query_since(&self, table: &str, watermark: Watermark, text: &str) -> Result<ResultSet> {
        self.engine.query_since(table, watermark, text)
    }

    /// Every change committed after `watermark`.
    pub fn changes_since(&self, table: &str, watermark: Watermark) -> Result<ChangeSet> {
        self.engine.changes_since(table, watermark)
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Create a named snapshot at the current commit frontier.
    pub fn create_snapshot(&self, id: &str) -> Result<SnapshotRecord> {
        self.engine.create_snapshot(id)
    }

    /// Restore every table to a snapshot's state via compensating
    /// commits.
    pub fn rollback_to(&self, id: &str) -> Result<()> {
        self.engine.rollback_to(id)
    }

    /// All live snapshots.
    pub fn list_snapshots(&self) -> Vec<SnapshotRecord> {
        self.engine.list_snapshots()
    }

    /// Release a snapshot.
    pub fn release_snapshot(&self, id: &str) -> Result<()> {
        self.engine.release_snapshot(id)
    }

    // ------------------------------------------------------------------
    // Materialized views
    // ------------------------------------------------------------------

    /// Create a materialized view and run its first refresh.
    pub fn create_materialized_view(
        &self,
        name: &str,
        query: &str,
        strategy: RefreshStrategy,
    ) -> Result<()> {
        self.engine.create_materialized_view(name, query, strategy)
    }

    /// Refresh a view to its source's latest commit.
    pub fn refresh_view(&self, name: &str) -> Result<()> {
        self.engine.refresh_view(name)
    }

    /// Registered view names.
    pub fn list_views(&self) -> Vec<String> {
        self.engine.list_views()
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Run storage and timeline compaction, GC, and snapshot retention
    /// now.
    pub fn compact_now(&self) -> Result<()> {
        self.engine.compact_now().map(|_| ())
    }

    /// Engine counters.
    pub fn metrics(&self) -> EngineMetrics {
        self.engine.metrics()
    }
}
