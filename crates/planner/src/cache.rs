//! Result cache
//!
//! Bounded LRU keyed by `(table, time-travel timestamp, canonical text)`.
//! Entries expire after a configurable age; eviction removes the entry
//! with the oldest insertion timestamp. One lock, bounded critical
//! sections; reads never fail and writes are best-effort.

use crate::result::ResultSet;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use terrace_core::Timestamp;
use tracing::trace;

/// Derive the cache key for a query execution.
pub fn cache_key(table: &str, as_of: Option<Timestamp>, canonical: &str) -> String {
    match as_of {
        Some(ts) => format!("{}@{}:{}", table, ts, canonical),
        None => format!("{}@latest:{}", table, canonical),
    }
}

struct CacheEntry {
    result: Arc<ResultSet>,
    inserted_at: Timestamp,
    access_count: u64,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Lookups that returned a live entry.
    pub hits: u64,
    /// Lookups that found nothing (or an expired entry).
    pub misses: u64,
    /// Entries currently resident.
    pub entries: usize,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    // Insertion order; eviction pops the front.
    order: VecDeque<String>,
}

/// Bounded LRU result cache.
pub struct ResultCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
    max_age_micros: i64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    /// Create a cache bounded by `max_entries` with the given TTL.
    pub fn new(max_entries: usize, max_age_micros: i64) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            max_entries: max_entries.max(1),
            max_age_micros,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up `key` at `now`. An entry past its TTL counts as a miss and
    /// is dropped.
    pub fn get(&self, key: &str, now: Timestamp) -> Option<Arc<ResultSet>> {
        let mut inner = self.inner.lock();
        let hit = match inner.entries.get_mut(key) {
            Some(entry) if now.saturating_sub(entry.inserted_at) <= self.max_age_micros => {
                entry.access_count += 1;
                Some(Arc::clone(&entry.result))
            }
            _ => None,
        };
        if hit.is_none() && inner.entries.contains_key(key) {
            // Expired: drop rather than serve stale.
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
        }
        drop(inner);
        match hit {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace `key`. Eviction removes the oldest-inserted
    /// entry once the bound is exceeded.
    pub fn put(&self, key: String, result: Arc<ResultSet>, now: Timestamp) {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                result,
                inserted_at: now,
                access_count: 0,
            },
        );
        while inner.entries.len() > self.max_entries {
            match inner.order.pop_front() {
                Some(oldest) => {
                    trace!(target: "terrace::cache", key = %oldest, "evicted by insertion age");
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Drop every entry touching `table` — called after a commit so a hit
    /// can never observe a stale result.
    pub fn invalidate_table(&self, table: &str) {
        let prefix = format!("{}@", table);
        let mut inner = self.inner.lock();
        inner.entries.retain(|k, _| !k.starts_with(&prefix));
        inner.order.retain(|k| !k.starts_with(&prefix));
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.inner.lock().entries.len(),
        }
    }
}
