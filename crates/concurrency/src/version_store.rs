//! MVCC version store
//!
//! Per key, an ordered chain of `(commit_ts, value)` entries, newest first
//! (`VecDeque` for O(1) push_front — updates to a hot key stay cheap).
//! A `None` value is a tombstone. Visibility at timestamp τ is the entry
//! with the greatest `commit_ts ≤ τ`.
//!
//! Garbage collection removes versions dominated by the oldest live
//! snapshot but always keeps the latest entry per key.

use dashmap::DashMap;
use std::collections::VecDeque;
use terrace_core::{Key, Record, Timestamp};

/// One committed version of a key.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionEntry {
    /// Commit timestamp this version became visible at.
    pub commit_ts: Timestamp,
    /// Row content; `None` is a tombstone.
    pub value: Option<Record>,
}

/// Version chain for one key, newest first.
#[derive(Debug, Clone, Default)]
pub struct VersionChain {
    versions: VecDeque<VersionEntry>,
}

impl VersionChain {
    /// Create a chain holding one version.
    pub fn new(entry: VersionEntry) -> Self {
        let mut versions = VecDeque::with_capacity(4);
        versions.push_front(entry);
        Self { versions }
    }

    /// Add a version; must be newer than every existing one.
    #[inline]
    pub fn push(&mut self, entry: VersionEntry) {
        debug_assert!(self
            .versions
            .front()
            .map_or(true, |v| entry.commit_ts > v.commit_ts));
        self.versions.push_front(entry);
    }

    /// The entry with the greatest `commit_ts ≤ max_ts`.
    pub fn visible(&self, max_ts: Timestamp) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.commit_ts <= max_ts)
    }

    /// The newest entry.
    #[inline]
    pub fn latest(&self) -> Option<&VersionEntry> {
        self.versions.front()
    }

    /// Drop versions older than `min_ts`, keeping at least the latest.
    /// Returns how many were pruned.
    pub fn gc(&mut self, min_ts: Timestamp) -> usize {
        let mut pruned = 0;
        while self.versions.len() > 1 {
            match self.versions.back() {
                Some(oldest) if oldest.commit_ts < min_ts => {
                    self.versions.pop_back();
                    pruned += 1;
                }
                _ => break,
            }
        }
        pruned
    }

    /// Number of retained versions.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Sharded multi-version store over all tables.
#[derive(Default)]
pub struct VersionStore {
    chains: DashMap<Key, VersionChain>,
}

impl VersionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a committed version for `key`.
    pub fn install(&self, key: Key, commit_ts: Timestamp, value: Option<Record>) {
        let entry = VersionEntry { commit_ts, value };
        match self.chains.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                occupied.get_mut().push(entry);
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(VersionChain::new(entry));
            }
        }
    }

    /// The record visible at `max_ts`, if any (tombstones read as absent).
    pub fn visible(&self, key: &Key, max_ts: Timestamp) -> Option<Record> {
        self.chains
            .get(key)
            .and_then(|chain| chain.visible(max_ts).and_then(|v| v.value.clone()))
    }

    /// The commit timestamp of the version visible at `max_ts`, counting
    /// tombstones — used to answer "was this key written by then".
    pub fn visible_commit_ts(&self, key: &Key, max_ts: Timestamp) -> Option<Timestamp> {
        self.chains
            .get(key)
            .and_then(|chain| chain.visible(max_ts).map(|v| v.commit_ts))
    }

    /// The newest commit timestamp for `key`, tombstones included.
    pub fn latest_commit_ts(&self, key: &Key) -> Option<Timestamp> {
        self.chains
            .get(key)
            .and_then(|chain| chain.latest().map(|v| v.commit_ts))
    }

    /// All rows of `table` visible at `max_ts`, sorted by key; tombstoned
    /// rows are omitted.
    pub fn scan_table(&self, table: &str, max_ts: Timestamp) -> Vec<(Key, Timestamp, Record)> {
        let mut rows: Vec<(Key, Timestamp, Record)> = self
            .chains
            .iter()
            .filter(|entry| entry.key().table == table)
            .filter_map(|entry| {
                entry.value().visible(max_ts).and_then(|v| {
                    v.value
                        .clone()
                        .map(|record| (entry.key().clone(), v.commit_ts, record))
                })
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    /// GC every chain against `min_ts`; returns total pruned versions.
    pub fn gc(&self, min_ts: Timestamp) -> usize {
        let mut pruned = 0;
        for mut entry in self.chains.iter_mut() {
            pruned += entry.value_mut().gc(min_ts);
        }
        pruned
    }

    /// Number of distinct keys tracked.
    pub fn key_count(&self) -> usize {
        self.chains.len()
    }
}
