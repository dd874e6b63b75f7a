//! Hybrid tiered table storage for Terrace
//!
//! Rows live in `DataBlock`s spread across three tiers:
//! HOT (copy-on-write, read-optimized recent data) → WARM (balanced) →
//! COLD (merge-on-read, write-optimized old data).
//!
//! - Write-path selection is adaptive: batch size and the windowed
//!   read/write ratio decide CoW-into-HOT versus MoR-into-WARM
//! - The unified scan walks HOT → WARM → COLD and resolves duplicates by
//!   `(key, highest commit_ts)`
//! - Background compaction promotes blocks by age and merges small
//!   neighbors, atomically with respect to readers
//! - Secondary indexes (hash and ordered) are maintained inside the same
//!   guarded write as the data

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod compaction;
pub mod index;
pub mod store;
pub mod tier;
pub mod workload;
pub mod write_path;

pub use block::{BlockKind, DataBlock, StoredRow};
pub use compaction::StorageCompactionStats;
pub use index::{IndexKey, IndexKind, IndexMeta, TableIndex};
pub use store::{HybridStore, ScanCursor, TierUsage};
pub use tier::Tier;
pub use workload::WorkloadAnalyzer;
pub use write_path::{choose_write_path, WritePath};
