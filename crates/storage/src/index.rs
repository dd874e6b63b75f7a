//! Secondary indexes
//!
//! Two kinds: `Hash` (equality lookups) and `Ordered` (equality plus
//! range). Entries map a composite column-value key to the set of row keys
//! carrying it. Indexes are maintained inside the same guarded write as
//! the data, so they are consistent with table state at every commit
//! boundary; only metadata persists, entries are rebuilt from blocks on
//! open.

use crate::block::StoredRow;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use terrace_core::{Error, Record, Result, Value};

/// Index kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Equality lookups only.
    Hash,
    /// Equality and range lookups over the value order.
    Ordered,
}

/// Persistent index description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Index name, unique per engine.
    pub name: String,
    /// Target table.
    pub table: String,
    /// Indexed columns, in key order.
    pub columns: Vec<String>,
    /// Kind.
    pub kind: IndexKind,
}

/// Composite index key with a total order over values.
#[derive(Debug, Clone)]
pub struct IndexKey(pub Vec<Value>);

impl IndexKey {
    /// Extract the key for `record` under `columns`; missing columns read
    /// as null.
    pub fn from_record(record: &Record, columns: &[String]) -> IndexKey {
        IndexKey(
            columns
                .iter()
                .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

/// An in-memory secondary index over one table.
pub struct TableIndex {
    /// The index description.
    pub meta: IndexMeta,
    entries: BTreeMap<IndexKey, BTreeSet<String>>,
    row_keys: FxHashMap<String, IndexKey>,
}

impl TableIndex {
    /// Create an empty index.
    pub fn new(meta: IndexMeta) -> Self {
        Self {
            meta,
            entries: BTreeMap::new(),
            row_keys: FxHashMap::default(),
        }
    }

    /// Apply a row version: `Some(record)` upserts the row's entry,
    /// `None` (a tombstone) removes it.
    pub fn apply(&mut self, row_key: &str, record: Option<&Record>) {
        if let Some(old_key) = self.row_keys.remove(row_key) {
            if let Some(rows) = self.entries.get_mut(&old_key) {
                rows.remove(row_key);
                if rows.is_empty() {
                    self.entries.remove(&old_key);
                }
            }
        }
        if let Some(record) = record {
            let key = IndexKey::from_record(record, &self.meta.columns);
            self.entries
                .entry(key.clone())
                .or_default()
                .insert(row_key.to_string());
            self.row_keys.insert(row_key.to_string(), key);
        }
    }

    /// Rebuild entries from the latest visible version of every row.
    ///
    /// `rows` must be deduplicated already (one version per key, highest
    /// commit timestamp).
    pub fn rebuild(&mut self, rows: &[StoredRow]) {
        self.entries.clear();
        self.row_keys.clear();
        for row in rows {
            if !row.tombstone {
                self.apply(&row.key, Some(&row.record));
            }
        }
    }

    /// Row keys whose indexed columns equal `values`.
    pub fn lookup_eq(&self, values: &[Value]) -> Vec<String> {
        let key = IndexKey(values.to_vec());
        self.entries
            .get(&key)
            .map(|rows| rows.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Row keys whose key falls in `[lo, hi]` (either bound optional).
    ///
    /// # Errors
    ///
    /// `InvalidOperation` on a hash index — only ordered indexes support
    /// range lookups.
    pub fn lookup_range(
        &self,
        lo: Option<&[Value]>,
        hi: Option<&[Value]>,
    ) -> Result<Vec<String>> {
        if self.meta.kind != IndexKind::Ordered {
            return Err(Error::InvalidOperation(format!(
                "range lookup on hash index {}",
                self.meta.name
            )));
        }
        let lo = lo.map(|v| IndexKey(v.to_vec()));
        let hi = hi.map(|v| IndexKey(v.to_vec()));
        let mut out = Vec::new();
        for (key, rows) in &self.entries {
            if let Some(lo) = &lo {
                if key < lo {
                    continue;
                }
            }
            if let Some(hi) = &hi {
                if key > hi {
                    break;
                }
            }
            out.extend(rows.iter().cloned());
        }
        Ok(out)
    }

    /// Number of distinct indexed rows.
    pub fn len(&self) -> usize {
        self.row_keys.len()
    }

    /// Whether the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.row_keys.is_empty()
    }
}
