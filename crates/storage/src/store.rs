//! Hybrid table store
//!
//! One `HybridStore` per table. Blocks are persisted through the blob
//! layer under `blocks/<table>/` (file names encode the tier), mirrored in
//! per-tier in-memory lists, and re-loaded on open — a block that fails
//! its checksum there is the partial output of an interrupted compaction
//! and is discarded, leaving its sources authoritative.
//!
//! Writes pick their path adaptively (see `write_path`), update every
//! index in the same guarded call, and leave the table unchanged if block
//! persistence fails. The unified scan walks HOT → WARM → COLD and
//! resolves duplicate keys in favour of the highest commit timestamp.

use crate::block::{decode_block, encode_block, BlockKind, DataBlock, StoredRow};
use crate::index::{IndexMeta, TableIndex};
use crate::tier::Tier;
use crate::workload::WorkloadAnalyzer;
use crate::write_path::{choose_write_path, WritePath};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use terrace_core::{
    BlobStore, CancelContext, Clock, EngineConfig, Error, Result, StorageMode, Timestamp, Value,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-tier usage summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierUsage {
    /// The tier.
    pub tier: Tier,
    /// Blocks resident.
    pub blocks: usize,
    /// Total block bytes.
    pub bytes: u64,
    /// Total row versions.
    pub rows: usize,
}

/// Tiered block store for one table.
pub struct HybridStore {
    table: String,
    mode: StorageMode,
    blob: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    hot: RwLock<Vec<DataBlock>>,
    warm: RwLock<Vec<DataBlock>>,
    cold: RwLock<Vec<DataBlock>>,
    indexes: RwLock<FxHashMap<String, TableIndex>>,
    analyzer: WorkloadAnalyzer,
    pub(crate) last_compaction: Mutex<Timestamp>,
}

impl HybridStore {
    /// Open the store for `table`, loading persisted blocks and index
    /// metadata.
    pub fn open(
        table: &str,
        mode: StorageMode,
        blob: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self> {
        let now = clock.now_micros();
        let store = Self {
            table: table.to_string(),
            mode,
            analyzer: WorkloadAnalyzer::new(config.workload_window_seconds as i64 * 1_000_000),
            blob,
            clock,
            config,
            hot: RwLock::new(Vec::new()),
            warm: RwLock::new(Vec::new()),
            cold: RwLock::new(Vec::new()),
            indexes: RwLock::new(FxHashMap::default()),
            last_compaction: Mutex::new(now),
        };
        store.load_blocks()?;
        store.load_indexes()?;
        Ok(store)
    }

    fn load_blocks(&self) -> Result<()> {
        let prefix = format!("blocks/{}", self.table);
        for key in self.blob.list(&prefix)? {
            let name = key.rsplit('/').next().unwrap_or_default();
            let tier = name
                .split('-')
                .next()
                .and_then(Tier::from_name);
            let Some(tier) = tier else {
                warn!(target: "terrace::storage", table = %self.table, key, "unrecognized block name, skipping");
                continue;
            };
            match self.blob.get(&key).and_then(|bytes| decode_block(&bytes)) {
                Ok(block) => self.tier_lock(tier).write().push(block),
                Err(Error::IntegrityFailure(reason)) => {
                    // Partial compaction output; sources stay authoritative.
                    warn!(
                        target: "terrace::storage",
                        table = %self.table,
                        key,
                        reason,
                        "discarding corrupt block"
                    );
                    self.blob.delete(&key)?;
                }
                Err(e) => return Err(e),
            }
        }
        for tier in Tier::ALL {
            self.tier_lock(tier)
                .write()
                .sort_by_key(|b| b.admitted_at);
        }
        Ok(())
    }

    fn load_indexes(&self) -> Result<()> {
        let prefix = format!("index/{}", self.table);
        let mut metas = Vec::new();
        for key in self.blob.list(&prefix)? {
            let bytes = self.blob.get(&key)?;
            let meta: IndexMeta = serde_json::from_slice(&bytes)?;
            metas.push(meta);
        }
        if metas.is_empty() {
            return Ok(());
        }
        let rows = self.collect_rows(Timestamp::MAX, false)?;
        let mut indexes = self.indexes.write();
        for meta in metas {
            let mut index = TableIndex::new(meta);
            index.rebuild(&rows);
            indexes.insert(index.meta.name.clone(), index);
        }
        Ok(())
    }

    pub(crate) fn tier_lock(&self, tier: Tier) -> &RwLock<Vec<DataBlock>> {
        match tier {
            Tier::Hot => &self.hot,
            Tier::Warm => &self.warm,
            Tier::Cold => &self.cold,
        }
    }

    pub(crate) fn block_key(&self, tier: Tier, id: Uuid) -> String {
        format!("blocks/{}/{}-{}.blk", self.table, tier.name(), id.simple())
    }

    pub(crate) fn blob(&self) -> &Arc<dyn BlobStore> {
        &self.blob
    }

    /// The table this store serves.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The engine configuration this store runs under.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The workload analyzer (planner statistics read it too).
    pub fn analyzer(&self) -> &WorkloadAnalyzer {
        &self.analyzer
    }

    /// Write a batch of row versions, choosing the path adaptively.
    ///
    /// The block is persisted before it becomes visible; a failed
    /// persistence leaves the table unchanged. Index maintenance happens
    /// in the same call, under the caller's commit guard.
    pub fn write_batch(&self, rows: Vec<StoredRow>, now: Timestamp) -> Result<WritePath> {
        if rows.is_empty() {
            return Ok(WritePath::CowHot);
        }
        let path = choose_write_path(self.mode, rows.len(), self.analyzer.read_ratio(now));
        self.admit_block(path.tier(), path.block_kind(), rows, now)?;
        self.analyzer.record_write(now);
        Ok(path)
    }

    /// Admit a block into `tier` with an explicit admission timestamp.
    ///
    /// The normal write path goes through [`write_batch`]; this entry
    /// point exists for recovery backfill and age-controlled tests.
    ///
    /// [`write_batch`]: HybridStore::write_batch
    pub fn admit_block(
        &self,
        tier: Tier,
        kind: BlockKind,
        rows: Vec<StoredRow>,
        admitted_at: Timestamp,
    ) -> Result<Uuid> {
        let block = DataBlock::new(kind, rows, admitted_at);
        let id = block.id;
        self.blob
            .put(&self.block_key(tier, id), &encode_block(&block)?)?;

        {
            let mut indexes = self.indexes.write();
            for row in &block.rows {
                for index in indexes.values_mut() {
                    index.apply(&row.key, (!row.tombstone).then_some(&row.record));
                }
            }
        }
        self.tier_lock(tier).write().push(block);

        debug!(
            target: "terrace::storage",
            table = %self.table,
            tier = %tier,
            block = %id.simple(),
            "block admitted"
        );
        Ok(id)
    }

    // Collect the deduplicated visible rows at `max_ts`. Tier lists are
    // read under the fixed HOT → WARM → COLD order; access counters are
    // bumped afterwards so readers do not serialize on each other.
    fn collect_rows(&self, max_ts: Timestamp, count_access: bool) -> Result<Vec<StoredRow>> {
        let mut best: HashMap<String, StoredRow> = HashMap::new();
        let mut touched: Vec<(Tier, Vec<Uuid>)> = Vec::new();

        for tier in Tier::ALL {
            let blocks = self.tier_lock(tier).read();
            let mut ids = Vec::new();
            for block in blocks.iter() {
                ids.push(block.id);
                for row in &block.rows {
                    if row.commit_ts > max_ts {
                        continue;
                    }
                    match best.get(&row.key) {
                        Some(existing) if existing.commit_ts >= row.commit_ts => {}
                        _ => {
                            best.insert(row.key.clone(), row.clone());
                        }
                    }
                }
            }
            touched.push((tier, ids));
        }

        if count_access {
            let now = self.clock.now_micros();
            for (tier, ids) in touched {
                let mut blocks = self.tier_lock(tier).write();
                for block in blocks.iter_mut() {
                    if ids.contains(&block.id) {
                        block.access_count += 1;
                        block.last_access = now;
                    }
                }
            }
        }

        let mut rows: Vec<StoredRow> = best.into_values().filter(|r| !r.tombstone).collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }

    /// Unified scan: visible rows at `max_ts` (`None` = latest), walking
    /// HOT → WARM → COLD with duplicate keys resolved by highest commit
    /// timestamp and tombstones dropped.
    pub fn scan_at(
        &self,
        max_ts: Option<Timestamp>,
        cancel: &CancelContext,
    ) -> Result<Vec<StoredRow>> {
        cancel.check()?;
        let rows = self.collect_rows(max_ts.unwrap_or(Timestamp::MAX), true)?;
        self.analyzer.record_read(self.clock.now_micros());
        Ok(rows)
    }

    /// Visible rows restricted to `keys` — the index-scan read path.
    pub fn rows_for_keys(
        &self,
        keys: &BTreeSet<String>,
        max_ts: Option<Timestamp>,
        cancel: &CancelContext,
    ) -> Result<Vec<StoredRow>> {
        cancel.check()?;
        let rows = self
            .collect_rows(max_ts.unwrap_or(Timestamp::MAX), true)?
            .into_iter()
            .filter(|r| keys.contains(&r.key))
            .collect();
        self.analyzer.record_read(self.clock.now_micros());
        Ok(rows)
    }

    /// A restartable pull-based cursor over the scan result, yielding row
    /// batches of at most `batch_rows`.
    pub fn scan_cursor(
        &self,
        max_ts: Option<Timestamp>,
        batch_rows: usize,
        cancel: &CancelContext,
    ) -> Result<ScanCursor> {
        let rows = self.scan_at(max_ts, cancel)?;
        Ok(ScanCursor::new(rows, batch_rows.max(1)))
    }

    /// Distinct live rows at the latest timestamp.
    pub fn live_row_count(&self) -> Result<usize> {
        Ok(self.collect_rows(Timestamp::MAX, false)?.len())
    }

    /// Visible rows without touching access counters or the workload
    /// analyzer. Recovery reconciliation reads through here so a restart
    /// does not skew placement decisions.
    pub fn reconcile_rows(&self) -> Result<Vec<StoredRow>> {
        self.collect_rows(Timestamp::MAX, false)
    }

    /// Every row version in every tier, ungrouped — compaction accounting
    /// and invariant tests.
    pub fn raw_row_count(&self) -> usize {
        Tier::ALL
            .iter()
            .map(|&tier| {
                self.tier_lock(tier)
                    .read()
                    .iter()
                    .map(|b| b.row_count())
                    .sum::<usize>()
            })
            .sum()
    }

    /// Usage per tier, in HOT → WARM → COLD order.
    pub fn tier_usage(&self) -> Vec<TierUsage> {
        Tier::ALL
            .iter()
            .map(|&tier| {
                let blocks = self.tier_lock(tier).read();
                TierUsage {
                    tier,
                    blocks: blocks.len(),
                    bytes: blocks.iter().map(|b| b.size_bytes).sum(),
                    rows: blocks.iter().map(|b| b.row_count()).sum(),
                }
            })
            .collect()
    }

    /// The table's logical size: the sum of per-tier block sizes.
    pub fn logical_size(&self) -> u64 {
        self.tier_usage().iter().map(|u| u.bytes).sum()
    }

    /// Create a secondary index and backfill it from current rows.
    pub fn create_index(&self, meta: IndexMeta) -> Result<()> {
        {
            let indexes = self.indexes.read();
            if indexes.contains_key(&meta.name) {
                return Err(Error::AlreadyExists(format!("index {}", meta.name)));
            }
        }
        let rows = self.collect_rows(Timestamp::MAX, false)?;
        let key = format!("index/{}/{}.json", self.table, meta.name);
        self.blob.put(&key, &serde_json::to_vec_pretty(&meta)?)?;

        let mut index = TableIndex::new(meta);
        index.rebuild(&rows);
        self.indexes.write().insert(index.meta.name.clone(), index);
        Ok(())
    }

    /// Drop a secondary index.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        let removed = self.indexes.write().remove(name);
        if removed.is_none() {
            return Err(Error::NotFound(format!("index {}", name)));
        }
        self.blob
            .delete(&format!("index/{}/{}.json", self.table, name))?;
        Ok(())
    }

    /// Row keys matching `values` on index `name`.
    pub fn index_lookup_eq(&self, name: &str, values: &[Value]) -> Result<Vec<String>> {
        let indexes = self.indexes.read();
        let index = indexes
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("index {}", name)))?;
        Ok(index.lookup_eq(values))
    }

    /// Names of the table's indexes.
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// The name of a single-column index on `column`, if one exists.
    pub fn index_on_column(&self, column: &str) -> Option<String> {
        self.indexes
            .read()
            .values()
            .find(|ix| ix.meta.columns.len() == 1 && ix.meta.columns[0] == column)
            .map(|ix| ix.meta.name.clone())
    }
}

/// Restartable batch cursor over a finished scan.
///
/// The cursor owns its row set: callers can drain it, `reset`, and drain
/// again without re-reading the tiers.
pub struct ScanCursor {
    rows: Arc<Vec<StoredRow>>,
    batch_rows: usize,
    pos: usize,
}

impl ScanCursor {
    fn new(rows: Vec<StoredRow>, batch_rows: usize) -> Self {
        Self {
            rows: Arc::new(rows),
            batch_rows,
            pos: 0,
        }
    }

    /// Rewind to the first batch.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Total rows across all batches.
    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for ScanCursor {
    type Item = Vec<StoredRow>;

    fn next(&mut self) -> Option<Vec<StoredRow>> {
        if self.pos >= self.rows.len() {
            return None;
        }
        let end = (self.pos + self.batch_rows).min(self.rows.len());
        let batch = self.rows[self.pos..end].to_vec();
        self.pos = end;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKind;
    use terrace_core::{FsBlobStore, ManualClock, Record};
    use tempfile::TempDir;

    fn rec(v: i64) -> Record {
        Record::from([("x", Value::Int(v))])
    }

    fn rows(range: std::ops::Range<i64>, ts: Timestamp) -> Vec<StoredRow> {
        range
            .map(|i| StoredRow::live(format!("k{:05}", i), ts, rec(i)))
            .collect()
    }

    fn store_with(dir: &TempDir, clock: Arc<ManualClock>) -> HybridStore {
        let blob = Arc::new(FsBlobStore::new(dir.path()).unwrap());
        HybridStore::open(
            "t",
            StorageMode::Hybrid,
            blob,
            clock,
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn small_batch_goes_cow_hot() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, Arc::new(ManualClock::new(1_000)));
        let path = store.write_batch(rows(0..10, 100), 1_000).unwrap();
        assert_eq!(path, WritePath::CowHot);
        let usage = store.tier_usage();
        assert_eq!(usage[0].blocks, 1);
        assert_eq!(usage[1].blocks, 0);
    }

    #[test]
    fn large_batch_goes_mor_warm_when_write_heavy() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, Arc::new(ManualClock::new(1_000)));
        let path = store.write_batch(rows(0..1500, 100), 1_000).unwrap();
        assert_eq!(path, WritePath::MorWarm);
        assert_eq!(store.tier_usage()[1].blocks, 1);
    }

    #[test]
    fn scan_resolves_cross_tier_duplicates() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, Arc::new(ManualClock::new(1_000)));
        // Old version in COLD, newer in HOT.
        store
            .admit_block(
                Tier::Cold,
                BlockKind::Base,
                vec![StoredRow::live("k", 100, rec(1))],
                10,
            )
            .unwrap();
        store
            .admit_block(
                Tier::Hot,
                BlockKind::Base,
                vec![StoredRow::live("k", 200, rec(2))],
                20,
            )
            .unwrap();

        let rows = store.scan_at(None, &CancelContext::none()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].commit_ts, 200);
        assert_eq!(rows[0].record, rec(2));

        // Time travel below the newer version sees the older one.
        let rows = store.scan_at(Some(150), &CancelContext::none()).unwrap();
        assert_eq!(rows[0].commit_ts, 100);
    }

    #[test]
    fn tombstone_hides_row() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, Arc::new(ManualClock::new(1_000)));
        store
            .write_batch(vec![StoredRow::live("k", 100, rec(1))], 1_000)
            .unwrap();
        store
            .write_batch(vec![StoredRow::tombstone("k", 200)], 1_000)
            .unwrap();

        assert!(store.scan_at(None, &CancelContext::none()).unwrap().is_empty());
        let at_150 = store.scan_at(Some(150), &CancelContext::none()).unwrap();
        assert_eq!(at_150.len(), 1);
    }

    #[test]
    fn cursor_is_batched_and_restartable() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, Arc::new(ManualClock::new(1_000)));
        store.write_batch(rows(0..10, 100), 1_000).unwrap();

        let mut cursor = store
            .scan_cursor(None, 4, &CancelContext::none())
            .unwrap();
        let batches: Vec<usize> = cursor.by_ref().map(|b| b.len()).collect();
        assert_eq!(batches, vec![4, 4, 2]);

        cursor.reset();
        assert_eq!(cursor.count(), 3);
    }

    #[test]
    fn indexes_follow_writes() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, Arc::new(ManualClock::new(1_000)));
        store
            .create_index(IndexMeta {
                name: "t_x".into(),
                table: "t".into(),
                columns: vec!["x".into()],
                kind: IndexKind::Hash,
            })
            .unwrap();

        store
            .write_batch(vec![StoredRow::live("a", 100, rec(7))], 1_000)
            .unwrap();
        assert_eq!(
            store.index_lookup_eq("t_x", &[Value::Int(7)]).unwrap(),
            vec!["a".to_string()]
        );

        store
            .write_batch(vec![StoredRow::tombstone("a", 200)], 1_000)
            .unwrap();
        assert!(store.index_lookup_eq("t_x", &[Value::Int(7)]).unwrap().is_empty());
        assert_eq!(store.index_on_column("x"), Some("t_x".to_string()));
    }

    #[test]
    fn blocks_and_indexes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        {
            let store = store_with(&dir, clock.clone());
            store.write_batch(rows(0..5, 100), 1_000).unwrap();
            store
                .create_index(IndexMeta {
                    name: "t_x".into(),
                    table: "t".into(),
                    columns: vec!["x".into()],
                    kind: IndexKind::Hash,
                })
                .unwrap();
        }
        let store = store_with(&dir, clock);
        assert_eq!(store.live_row_count().unwrap(), 5);
        assert_eq!(
            store.index_lookup_eq("t_x", &[Value::Int(3)]).unwrap().len(),
            1
        );
    }

    #[test]
    fn corrupt_block_discarded_on_open() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        {
            let store = store_with(&dir, clock.clone());
            store.write_batch(rows(0..5, 100), 1_000).unwrap();
        }
        // Corrupt one block file in place.
        let blob = FsBlobStore::new(dir.path()).unwrap();
        let keys = blob.list("blocks/t").unwrap();
        assert_eq!(keys.len(), 1);
        let mut bytes = blob.get(&keys[0]).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        blob.put(&keys[0], &bytes).unwrap();

        let store = store_with(&dir, clock);
        assert_eq!(store.live_row_count().unwrap(), 0);
        assert!(blob.list("blocks/t").unwrap().is_empty());
    }

    #[test]
    fn logical_size_is_sum_of_tiers() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, Arc::new(ManualClock::new(1_000)));
        store.write_batch(rows(0..50, 100), 1_000).unwrap();
        store.write_batch(rows(50..1200, 200), 1_000).unwrap();

        let usage = store.tier_usage();
        let total: u64 = usage.iter().map(|u| u.bytes).sum();
        assert_eq!(store.logical_size(), total);
        assert!(total > 0);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, Arc::new(ManualClock::new(1_000)));
        store.write_batch(Vec::new(), 1_000).unwrap();
        assert_eq!(store.raw_row_count(), 0);
        assert_eq!(store.tier_usage()[0].blocks, 0);
    }
}
