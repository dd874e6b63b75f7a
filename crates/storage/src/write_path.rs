//! Adaptive write-path selection
//!
//! Placement rules for a batch of rows:
//! - batch under 100 rows: always CoW into HOT
//! - batch over 1000 rows: MoR into WARM, unless the workload is
//!   read-heavy (read ratio above 0.7), then CoW into HOT
//! - otherwise: CoW into HOT when the read ratio exceeds 0.5, else MoR
//!
//! A table's declared storage mode overrides adaptivity: CopyOnWrite
//! always takes the CoW path, MergeOnRead always the MoR path.

use crate::block::BlockKind;
use crate::tier::Tier;
use terrace_core::StorageMode;

/// Thresholds from the placement rules.
const SMALL_BATCH_ROWS: usize = 100;
const LARGE_BATCH_ROWS: usize = 1000;
const READ_HEAVY_RATIO: f64 = 0.7;
const READ_LEANING_RATIO: f64 = 0.5;

/// A resolved write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePath {
    /// Copy-on-write into the HOT tier.
    CowHot,
    /// Merge-on-read delta into the WARM tier.
    MorWarm,
}

impl WritePath {
    /// The tier this path admits blocks into.
    pub fn tier(&self) -> Tier {
        match self {
            WritePath::CowHot => Tier::Hot,
            WritePath::MorWarm => Tier::Warm,
        }
    }

    /// The block kind this path produces.
    pub fn block_kind(&self) -> BlockKind {
        match self {
            WritePath::CowHot => BlockKind::Base,
            WritePath::MorWarm => BlockKind::Delta,
        }
    }
}

/// Decide the write path for a batch.
pub fn choose_write_path(mode: StorageMode, batch_rows: usize, read_ratio: f64) -> WritePath {
    match mode {
        StorageMode::CopyOnWrite => WritePath::CowHot,
        StorageMode::MergeOnRead => WritePath::MorWarm,
        StorageMode::Hybrid => {
            if batch_rows < SMALL_BATCH_ROWS {
                WritePath::CowHot
            } else if batch_rows > LARGE_BATCH_ROWS {
                if read_ratio > READ_HEAVY_RATIO {
                    WritePath::CowHot
                } else {
                    WritePath::MorWarm
                }
            } else if read_ratio > READ_LEANING_RATIO {
                WritePath::CowHot
            } else {
                WritePath::MorWarm
            }
        }
    }
}
