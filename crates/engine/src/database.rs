//! The engine facade
//!
//! [`Engine`] owns everything: catalog, per-table runtimes (hybrid store +
//! timeline), transaction manager, snapshot registry, planner, memory
//! manager, secret store. It opens a database directory, recovers state
//! from the timeline, and exposes the public table/transaction/query API.
//!
//! ## Recovery
//!
//! On open, each table's timeline is replayed into the version store and
//! the oracle floor is raised past the newest replayed commit. The block
//! store is then reconciled against the replayed state: rows the timeline
//! committed but a crash kept out of the block files are re-admitted, so
//! timeline and storage answer alike.

use crate::changes::{ChangeGroup, ChangeSet};
use crate::coordinator::commit_transaction;
use crate::executor::{execute_plan, replay_range};
use crate::memory::MemoryManager;
use crate::open_options::{AccessMode, OpenOptions};
use crate::secrets::SecretStore;
use crate::stats::EngineStatsProvider;
use dashmap::DashMap;
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use terrace_concurrency::{
    SnapshotRecord, SnapshotRegistry, TransactionContext, TransactionManager, TxnMetrics,
};
use terrace_core::{
    BlobStore, CancelContext, Clock, ColumnDef, CommitId, EngineConfig, Error, FsBlobStore, Key,
    Record, Result, SchemaCatalog, StorageMode, SystemClock, TableSchema, Timestamp, Value,
    Watermark,
};
use terrace_core::record::{COL_CREATED_AT, COL_UPDATED_AT};
use terrace_planner::{
    cache_key, canonicalize, CacheStats, Planner, PlannerContext, RefreshStrategy, ResultSet,
};
use terrace_planner::{Projection, QueryPlan, ScanKind, ScanPlan};
use terrace_storage::{HybridStore, IndexKind, IndexMeta, StorageCompactionStats, StoredRow};
use terrace_timeline::TableTimeline;
use tracing::{debug, info, warn};

const LOCK_FILE: &str = "LOCK";

/// Per-table runtime: block store plus commit timeline.
pub(crate) struct TableRuntime {
    pub(crate) store: HybridStore,
    pub(crate) timeline: TableTimeline,
}

/// Engine-wide counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineMetrics {
    /// Transaction counters.
    pub txns: TxnMetrics,
    /// Result-cache counters.
    pub cache: CacheStats,
}

/// The transactional lakehouse engine.
pub struct Engine {
    pub(crate) root: PathBuf,
    pub(crate) config: EngineConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) blob: Arc<dyn BlobStore>,
    pub(crate) catalog: SchemaCatalog,
    pub(crate) tables: DashMap<String, Arc<TableRuntime>>,
    pub(crate) txns: TransactionManager,
    pub(crate) snapshots: SnapshotRegistry,
    pub(crate) planner: Planner,
    pub(crate) memory: MemoryManager,
    pub(crate) secrets: SecretStore,
    pub(crate) scan_pool: rayon::ThreadPool,
    access: AccessMode,
    _lock: File,
}

impl Engine {
    /// Open or create a database at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, OpenOptions::new())
    }

    /// Open or create a database at `path`.
    pub fn open_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        for sub in ["schema", "timeline", "blocks", "index", "snapshots", "secrets"] {
            fs::create_dir_all(root.join(sub))?;
        }

        let lock = File::create(root.join(LOCK_FILE))?;
        lock.try_lock_exclusive().map_err(|_| {
            Error::InvalidOperation(format!(
                "database at {} is locked by another process",
                root.display()
            ))
        })?;

        let mut config = EngineConfig::load_or_create(&root)?;
        if let Some(durability) = options.durability {
            config.durability = durability;
        }
        let clock: Arc<dyn Clock> = options
            .clock
            .clone()
            .unwrap_or_else(|| Arc::new(SystemClock));
        let blob: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&root)?);
        let catalog = SchemaCatalog::open(root.join("schema"))?;

        let tables: DashMap<String, Arc<TableRuntime>> = DashMap::new();
        for table in catalog.list_tables() {
            let schema = catalog.current(&table)?;
            let runtime = Self::open_runtime(&root, &table, schema.mode, &blob, &clock, &config)?;
            tables.insert(table, Arc::new(runtime));
        }

        // New commits must sort after everything already on disk.
        let floor = tables
            .iter()
            .filter_map(|entry| entry.value().timeline.latest_timestamp())
            .max()
            .unwrap_or(0);
        let txns = TransactionManager::with_floor(Arc::clone(&clock), floor);

        // Replay the timelines into the version store and reconcile the
        // block stores against the replayed state.
        for entry in tables.iter() {
            let table = entry.key().clone();
            let runtime = entry.value();
            let (entries, _) = runtime.timeline.as_of(Timestamp::MAX);
            let mut latest: std::collections::BTreeMap<String, (Timestamp, Option<Record>)> =
                std::collections::BTreeMap::new();
            for timeline_entry in &entries {
                for change in &timeline_entry.changes {
                    let value = change.record().cloned();
                    latest.insert(change.key().to_string(), (timeline_entry.timestamp, value));
                }
            }
            for (row, (ts, value)) in &latest {
                txns.versions()
                    .install(Key::new(table.clone(), row.clone()), *ts, value.clone());
            }

            let stored: std::collections::HashMap<String, Timestamp> = runtime
                .store
                .reconcile_rows()?
                .into_iter()
                .map(|r| (r.key, r.commit_ts))
                .collect();
            let missing: Vec<StoredRow> = latest
                .iter()
                .filter_map(|(row, (ts, value))| match value {
                    Some(record) if stored.get(row).map_or(true, |have| have < ts) => {
                        Some(StoredRow::live(row.clone(), *ts, record.clone()))
                    }
                    _ => None,
                })
                .collect();
            if !missing.is_empty() {
                warn!(
                    target: "terrace::engine",
                    table = %table,
                    rows = missing.len(),
                    "backfilling block store from timeline after recovery"
                );
                runtime.store.admit_block(
                    terrace_storage::Tier::Hot,
                    terrace_storage::BlockKind::Base,
                    missing,
                    clock.now_micros(),
                )?;
            }
        }

        let snapshots = SnapshotRegistry::open(root.join("snapshots"))?;
        let planner = Planner::new(
            config.result_cache_max_entries,
            config.result_cache_max_age_seconds as i64 * 1_000_000,
        );
        let memory = MemoryManager::new(
            256 * 1024 * 1024,
            64 * 1024 * 1024,
            128 * 1024 * 1024,
        );
        let secrets = SecretStore::open(root.join("secrets"))?;
        let scan_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_parallel_degree)
            .build()
            .map_err(|e| Error::Storage(format!("scan pool: {}", e)))?;

        info!(
            target: "terrace::engine",
            root = %root.display(),
            tables = tables.len(),
            "engine opened"
        );
        Ok(Self {
            root,
            config,
            clock,
            blob,
            catalog,
            tables,
            txns,
            snapshots,
            planner,
            memory,
            secrets,
            scan_pool,
            access: options.access_mode,
            _lock: lock,
        })
    }

    fn open_runtime(
        root: &Path,
        table: &str,
        mode: StorageMode,
        blob: &Arc<dyn BlobStore>,
        clock: &Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Result<TableRuntime> {
        Ok(TableRuntime {
            store: HybridStore::open(
                table,
                mode,
                Arc::clone(blob),
                Arc::clone(clock),
                config.clone(),
            )?,
            timeline: TableTimeline::open(root.join("timeline"), table, config.durability)?,
        })
    }

    pub(crate) fn runtime(&self, table: &str) -> Result<Arc<TableRuntime>> {
        self.tables
            .get(table)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::NotFound(format!("table {}", table)))
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.access == AccessMode::ReadOnly {
            return Err(Error::InvalidOperation(
                "database opened read-only".to_string(),
            ));
        }
        Ok(())
    }

    /// The effective configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The database root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========================================================================
    // DDL
    // ========================================================================

    /// Create a table.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the name is taken; `InvalidOperation` for an
    /// empty column list.
    pub fn create_table(
        &self,
        name: &str,
        columns: Vec<ColumnDef>,
        mode: StorageMode,
    ) -> Result<()> {
        self.ensure_writable()?;
        if columns.is_empty() {
            return Err(Error::InvalidOperation(format!(
                "table {} needs at least one column",
                name
            )));
        }
        let now = self.clock.now_micros();
        let schema = TableSchema::new(name, columns, mode, now);
        self.catalog.create_table(schema, now)?;
        let runtime =
            Self::open_runtime(&self.root, name, mode, &self.blob, &self.clock, &self.config)?;
        self.tables.insert(name.to_string(), Arc::new(runtime));
        info!(target: "terrace::engine", table = name, "table created");
        Ok(())
    }

    /// Drop a table with its timeline, blocks, and indexes.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.ensure_writable()?;
        self.catalog.drop_table(name)?;
        self.tables.remove(name);
        for prefix in ["timeline", "blocks", "index"] {
            let dir = self.root.join(prefix).join(name);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
        }
        self.planner.cache().invalidate_table(name);
        info!(target: "terrace::engine", table = name, "table dropped");
        Ok(())
    }

    /// Add a column. The evolved schema version is recorded in the
    /// catalog history and stamped onto an empty timeline commit, so
    /// time travel sees the version change.
    pub fn add_column(&self, table: &str, column: ColumnDef) -> Result<u32> {
        self.ensure_writable()?;
        let runtime = self.runtime(table)?;
        let ts = self.txns.allocate_commit_ts();
        let version = self.catalog.add_column(table, column, ts)?;
        runtime.timeline.append(ts, Vec::new(), version)?;
        self.planner.cache().invalidate_table(table);
        Ok(version)
    }

    /// Drop a column (see [`add_column`] for versioning behavior).
    ///
    /// [`add_column`]: Engine::add_column
    pub fn drop_column(&self, table: &str, column: &str) -> Result<u32> {
        self.ensure_writable()?;
        let runtime = self.runtime(table)?;
        let ts = self.txns.allocate_commit_ts();
        let version = self.catalog.drop_column(table, column, ts)?;
        runtime.timeline.append(ts, Vec::new(), version)?;
        self.planner.cache().invalidate_table(table);
        Ok(version)
    }

    /// Create a secondary index over `columns`.
    pub fn create_index(
        &self,
        table: &str,
        name: &str,
        columns: Vec<String>,
        kind: IndexKind,
    ) -> Result<()> {
        self.ensure_writable()?;
        let schema = self.catalog.current(table)?;
        for column in &columns {
            if schema.column(column).is_none() {
                return Err(Error::NotFound(format!("column {} on {}", column, table)));
            }
        }
        for entry in self.tables.iter() {
            if entry.value().store.index_names().iter().any(|n| n == name) {
                return Err(Error::AlreadyExists(format!("index {}", name)));
            }
        }
        self.runtime(table)?.store.create_index(IndexMeta {
            name: name.to_string(),
            table: table.to_string(),
            columns,
            kind,
        })
    }

    /// Drop an index by name.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.ensure_writable()?;
        for entry in self.tables.iter() {
            if entry.value().store.index_names().iter().any(|n| n == name) {
                return entry.value().store.drop_index(name);
            }
        }
        Err(Error::NotFound(format!("index {}", name)))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    // The canonical row key: the first schema column for inserts, the
    // caller's key columns for upserts.
    fn row_key(record: &Record, key_columns: &[String]) -> Result<String> {
        let mut parts = Vec::with_capacity(key_columns.len());
        for column in key_columns {
            let value = record.get(column).ok_or_else(|| Error::SchemaMismatch {
                column: column.clone(),
                reason: "key column missing from record".to_string(),
            })?;
            parts.push(value.canonical_string());
        }
        Ok(parts.join("|"))
    }

    /// Insert records in one atomic commit. Rows are keyed by the
    /// table's first column.
    pub fn insert(&self, table: &str, records: Vec<Record>) -> Result<CommitId> {
        self.ensure_writable()?;
        let schema = self.catalog.current(table)?;
        self.runtime(table)?;
        let key_columns = vec![schema.columns[0].name.clone()];
        let now = self.clock.now_micros();

        let mut txn = self.txns.begin();
        for mut record in records {
            schema.validate_record(&record)?;
            record.set(COL_CREATED_AT, Value::Timestamp(now));
            record.set(COL_UPDATED_AT, Value::Timestamp(now));
            let row = Self::row_key(&record, &key_columns)?;
            txn.stage_write(Key::new(table, row), record);
        }
        let (_, commits) = commit_transaction(self, &mut txn)?;
        Ok(commits
            .into_iter()
            .next()
            .map(|(_, id)| id)
            .unwrap_or(CommitId::GENESIS))
    }

    /// Insert-or-update records keyed by `key_columns`, in one atomic
    /// commit. Existing rows are overlaid with the provided columns.
    pub fn upsert(
        &self,
        table: &str,
        records: Vec<Record>,
        key_columns: Vec<String>,
    ) -> Result<CommitId> {
        self.ensure_writable()?;
        if key_columns.is_empty() {
            return Err(Error::InvalidOperation("upsert needs key columns".into()));
        }
        let schema = self.catalog.current(table)?;
        self.runtime(table)?;
        let now = self.clock.now_micros();

        let mut txn = self.txns.begin();
        for record in records {
            let row = Self::row_key(&record, &key_columns)?;
            let key = Key::new(table, row);
            let mut merged = match self.txns.read(&mut txn, &key) {
                Some(existing) => {
                    let mut merged = existing;
                    for (column, value) in record.iter() {
                        merged.set(column.to_string(), value.clone());
                    }
                    merged
                }
                None => {
                    let mut fresh = record;
                    fresh.set(COL_CREATED_AT, Value::Timestamp(now));
                    fresh
                }
            };
            merged.set(COL_UPDATED_AT, Value::Timestamp(now));
            schema.validate_record(&merged)?;
            txn.stage_write(key, merged);
        }
        let (_, commits) = commit_transaction(self, &mut txn)?;
        Ok(commits
            .into_iter()
            .next()
            .map(|(_, id)| id)
            .unwrap_or(CommitId::GENESIS))
    }

    /// Delete rows by key values (keyed by the table's first column), in
    /// one atomic commit.
    pub fn delete(&self, table: &str, keys: Vec<Value>) -> Result<CommitId> {
        self.ensure_writable()?;
        self.runtime(table)?;
        let mut txn = self.txns.begin();
        for value in keys {
            txn.stage_delete(Key::new(table, value.canonical_string()));
        }
        let (_, commits) = commit_transaction(self, &mut txn)?;
        Ok(commits
            .into_iter()
            .next()
            .map(|(_, id)| id)
            .unwrap_or(CommitId::GENESIS))
    }

    // ========================================================================
    // Explicit transactions
    // ========================================================================

    /// Begin a transaction with a fresh snapshot timestamp.
    pub fn begin(&self) -> TransactionContext {
        self.txns.begin()
    }

    /// Read a row under the transaction's snapshot (read-your-writes).
    pub fn txn_read(
        &self,
        txn: &mut TransactionContext,
        table: &str,
        row: &str,
    ) -> Option<Record> {
        self.txns.read(txn, &Key::new(table, row))
    }

    /// Stage a validated write. Nothing is visible until commit.
    pub fn txn_write(
        &self,
        txn: &mut TransactionContext,
        table: &str,
        row: &str,
        record: Record,
    ) -> Result<()> {
        self.ensure_writable()?;
        let schema = self.catalog.current(table)?;
        schema.validate_record(&record)?;
        txn.stage_write(Key::new(table, row), record);
        Ok(())
    }

    /// Stage a delete.
    pub fn txn_delete(&self, txn: &mut TransactionContext, table: &str, row: &str) -> Result<()> {
        self.ensure_writable()?;
        self.runtime(table)?;
        txn.stage_delete(Key::new(table, row));
        Ok(())
    }

    /// Commit; returns the commit timestamp or a `Conflict` under
    /// first-writer-wins.
    pub fn commit(&self, txn: &mut TransactionContext) -> Result<Timestamp> {
        self.ensure_writable()?;
        let (ts, _) = commit_transaction(self, txn)?;
        Ok(ts)
    }

    /// Abort, discarding staged writes.
    pub fn abort(&self, txn: &mut TransactionContext) {
        self.txns.abort(txn, "caller abort");
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn plan_and_execute(
        &self,
        table: &str,
        text: &str,
        as_of: Option<Timestamp>,
        watermark: Option<Watermark>,
        cancel: &CancelContext,
    ) -> Result<ResultSet> {
        self.runtime(table)?;
        let canonical = canonicalize(text);
        let key = cache_key(table, as_of, &canonical);
        let now = self.clock.now_micros();
        // Incremental reads depend on the caller's watermark; they bypass
        // the cache rather than key on it.
        if watermark.is_none() {
            if let Some(cached) = self.planner.cache().get(&key, now) {
                return Ok((*cached).clone());
            }
        }

        let stats = EngineStatsProvider { engine: self };
        let ctx = PlannerContext {
            stats: &stats,
            as_of,
            watermark,
            now,
            parallel_threshold_rows: self.config.parallel_scan_threshold_rows,
            max_parallel_degree: self.config.max_parallel_degree,
        };
        let decision = self.planner.plan(table, text, &ctx);
        debug!(
            target: "terrace::engine",
            table,
            plan = %decision.plan.describe(),
            cost = decision.cost,
            "plan selected"
        );
        if let Some(view) = &decision.refresh_view {
            self.refresh_view(view)?;
        }
        let result = execute_plan(self, &decision, cancel)?;
        if watermark.is_none() {
            self.planner
                .cache()
                .put(key, Arc::new(result.clone()), now);
        }
        Ok(result)
    }

    /// Execute a read query at the present time.
    pub fn query(&self, table: &str, text: &str) -> Result<ResultSet> {
        self.plan_and_execute(table, text, None, None, &CancelContext::none())
    }

    /// Execute a read query with a cancellation context.
    pub fn query_with(
        &self,
        table: &str,
        text: &str,
        cancel: &CancelContext,
    ) -> Result<ResultSet> {
        self.plan_and_execute(table, text, None, None, cancel)
    }

    /// Execute a read query as of timestamp `at`. Future timestamps clamp
    /// to the latest commit.
    pub fn query_as_of(&self, table: &str, at: Timestamp, text: &str) -> Result<ResultSet> {
        self.plan_and_execute(table, text, Some(at), None, &CancelContext::none())
    }

    /// Execute a read query over the net effect of commits in
    /// `[start, end]` (inclusive; `end == 0` unbounded).
    pub fn query_range(
        &self,
        table: &str,
        start: Timestamp,
        end: Timestamp,
        text: &str,
    ) -> Result<ResultSet> {
        let cancel = CancelContext::none();
        let replayed = replay_range(self, table, start, end, &cancel)?;
        let canonical = canonicalize(text);
        let (predicates, projection) = match terrace_planner::parse_query(&canonical) {
            Ok(shape) => (shape.predicates, shape.projection),
            Err(_) => (Vec::new(), Projection::Star),
        };

        let base_columns = self.catalog.current(table)?.column_names();
        let filtered: Vec<Record> = replayed
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| predicates.iter().all(|p| p.matches(record.get(&p.column))))
            .collect();
        let columns = match &projection {
            Projection::Star => base_columns,
            Projection::Columns(cols) => cols.clone(),
        };
        let rows = filtered.into_iter().map(|r| r.project(&columns)).collect();
        Ok(ResultSet::new(columns, rows))
    }

    /// Execute a read query over everything committed after `watermark`
    /// (the incremental-scan path).
    pub fn query_since(
        &self,
        table: &str,
        watermark: Watermark,
        text: &str,
    ) -> Result<ResultSet> {
        self.plan_and_execute(table, text, None, Some(watermark), &CancelContext::none())
    }

    /// Describe the plan the planner would select for `text`, without
    /// executing it.
    pub fn explain(&self, table: &str, text: &str) -> Result<String> {
        self.runtime(table)?;
        let stats = EngineStatsProvider { engine: self };
        let ctx = PlannerContext {
            stats: &stats,
            as_of: None,
            watermark: None,
            now: self.clock.now_micros(),
            parallel_threshold_rows: self.config.parallel_scan_threshold_rows,
            max_parallel_degree: self.config.max_parallel_degree,
        };
        let decision = self.planner.plan(table, text, &ctx);
        Ok(format!(
            "{} (cost {:.4})",
            decision.plan.describe(),
            decision.cost
        ))
    }

    /// Per-tier block usage for `table`, HOT → WARM → COLD.
    pub fn tier_usage(&self, table: &str) -> Result<Vec<terrace_storage::TierUsage>> {
        Ok(self.runtime(table)?.store.tier_usage())
    }

    /// Every change committed to `table` after `watermark`.
    pub fn changes_since(&self, table: &str, watermark: Watermark) -> Result<ChangeSet> {
        let runtime = self.runtime(table)?;
        let entries = runtime.timeline.changes_since(watermark);
        let next = entries.last().map(|e| e.timestamp).unwrap_or(watermark);
        Ok(ChangeSet {
            table: table.to_string(),
            since: watermark,
            watermark: next,
            commits: entries
                .into_iter()
                .map(|e| ChangeGroup {
                    timestamp: e.timestamp,
                    commit: e.commit,
                    changes: e.changes,
                })
                .collect(),
        })
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Create a named snapshot pinned at the current commit frontier.
    pub fn create_snapshot(&self, id: &str) -> Result<SnapshotRecord> {
        self.ensure_writable()?;
        let at = self.txns.oracle().current();
        self.snapshots.create(id, at, self.clock.now_micros())
    }

    /// Roll every table back to a snapshot's visible state by writing
    /// compensating commits. History is preserved: the timeline keeps
    /// both the rolled-back and the restored states.
    pub fn rollback_to(&self, id: &str) -> Result<()> {
        self.ensure_writable()?;
        let snapshot = self.snapshots.get(id)?;
        let cancel = CancelContext::none();

        let tables: Vec<String> = self.catalog.list_tables();
        let mut txn = self.txns.begin();
        for table in &tables {
            let target: std::collections::BTreeMap<String, Record> =
                replay_range(self, table, Timestamp::MIN, snapshot.timestamp.max(1), &cancel)?
                    .into_iter()
                    .collect();
            let current: std::collections::BTreeMap<String, Record> =
                replay_range(self, table, Timestamp::MIN, 0, &cancel)?
                    .into_iter()
                    .collect();

            for (row, record) in &target {
                if current.get(row) != Some(record) {
                    txn.stage_write(Key::new(table.clone(), row.clone()), record.clone());
                }
            }
            for row in current.keys() {
                if !target.contains_key(row) {
                    txn.stage_delete(Key::new(table.clone(), row.clone()));
                }
            }
        }
        if txn.pending_writes() == 0 {
            self.txns.abort(&mut txn, "rollback is a no-op");
            return Ok(());
        }
        commit_transaction(self, &mut txn)?;
        info!(target: "terrace::engine", snapshot = id, "rolled back to snapshot");
        Ok(())
    }

    /// All live snapshots.
    pub fn list_snapshots(&self) -> Vec<SnapshotRecord> {
        self.snapshots.list()
    }

    /// Release a snapshot by id.
    pub fn release_snapshot(&self, id: &str) -> Result<()> {
        self.snapshots.release(id)
    }

    // ========================================================================
    // Materialized views
    // ========================================================================

    /// Create a materialized view and run its first refresh.
    pub fn create_materialized_view(
        &self,
        name: &str,
        query: &str,
        strategy: RefreshStrategy,
    ) -> Result<()> {
        self.ensure_writable()?;
        let canonical = canonicalize(query);
        let shape = terrace_planner::parse_query(&canonical)?;
        if shape.join.is_some() {
            return Err(Error::InvalidOperation(
                "materialized views over joins are not supported".to_string(),
            ));
        }
        self.runtime(&shape.table)?;
        self.planner
            .views()
            .create(name, &canonical, &shape.table, strategy)?;
        self.refresh_view(name)
    }

    /// Re-execute a view's defining query and advance its watermark to
    /// the source's latest commit.
    pub fn refresh_view(&self, name: &str) -> Result<()> {
        let view = self.planner.views().get(name)?;
        let shape = terrace_planner::parse_query(&view.query)?;
        let runtime = self.runtime(&shape.table)?;

        // Plan the source read directly; going through the planner again
        // would rewrite the query straight back to this view.
        let decision = terrace_planner::PlanDecision {
            plan: QueryPlan::Scan(ScanPlan {
                table: shape.table.clone(),
                kind: ScanKind::Table,
                predicates: shape.predicates.clone(),
                projection: shape.projection.clone(),
            }),
            cost: 0.0,
            shape: Some(shape),
            refresh_view: None,
        };
        let result = execute_plan(self, &decision, &CancelContext::none())?;
        let watermark = runtime.timeline.latest_timestamp().unwrap_or(0);
        self.planner
            .views()
            .store_refresh(name, watermark, result.columns, result.rows)
    }

    /// Registered view names.
    pub fn list_views(&self) -> Vec<String> {
        self.planner.views().list()
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Run a full maintenance pass now: storage compaction, timeline
    /// compaction, version GC, snapshot retention.
    pub fn compact_now(&self) -> Result<Vec<(String, StorageCompactionStats)>> {
        self.ensure_writable()?;
        let now = self.clock.now_micros();
        let cancel = CancelContext::none();
        let floor = self.snapshots.oldest_live_ts();

        let mut stats = Vec::new();
        for entry in self.tables.iter() {
            let table = entry.key().clone();
            let runtime = entry.value();
            stats.push((table, runtime.store.compact(now, &cancel)?));
            runtime.timeline.compact(
                self.config.timeline_retention_seconds as i64 * 1_000_000,
                floor,
                now,
            )?;
        }
        if let Some(floor) = floor {
            self.txns.gc_versions(floor);
        }
        self.snapshots.sweep_expired(
            self.config.snapshot_retention_seconds as i64 * 1_000_000,
            now,
        )?;
        Ok(stats)
    }

    /// The sealed-secret store.
    pub fn secrets(&self) -> &SecretStore {
        &self.secrets
    }

    /// Counter snapshot across subsystems.
    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            txns: self.txns.metrics(),
            cache: self.planner.cache().stats(),
        }
    }

    /// Memory pool report.
    pub fn memory_report(&self) -> crate::memory::MemoryReport {
        self.memory.report()
    }

    /// Registered table names.
    pub fn list_tables(&self) -> Vec<String> {
        self.catalog.list_tables()
    }

    /// Current schema for `table`.
    pub fn schema(&self, table: &str) -> Result<TableSchema> {
        self.catalog.current(table)
    }

    /// Schema versions recorded for `table`, oldest first.
    pub fn schema_history(&self, table: &str) -> Result<Vec<u32>> {
        Ok(self
            .catalog
            .history(table)?
            .into_iter()
            .map(|rev| rev.schema.version)
            .collect())
    }
}
