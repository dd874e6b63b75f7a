//! Tier compaction
//!
//! Triggered when any of these holds:
//! (a) the compaction interval has elapsed,
//! (b) the HOT tier exceeds its size threshold,
//! (c) the WARM tier exceeds its size threshold.
//!
//! A pass does two things:
//! 1. *Tier promotion*: HOT blocks older than `hot_tier_max_age` move to
//!    WARM; WARM blocks older than `warm_tier_max_age` move to COLD.
//! 2. *Intra-tier merge*: adjacent small blocks are combined until the
//!    merged block reaches `min_compaction_size_bytes` or the group hits
//!    `max_blocks_per_compaction`.
//!
//! All three tier locks are taken in the fixed HOT → WARM → COLD order for
//! the duration of the pass, so migrations are atomic with respect to
//! readers and no lock-order inversion is possible. Merged output is
//! persisted (checksummed) before any source block is dropped; a crash in
//! between leaves either the sources or a verified merged block.

use crate::block::{BlockKind, DataBlock};
use crate::store::HybridStore;
use crate::tier::Tier;
use terrace_core::{CancelContext, Result, Timestamp};
use tracing::{debug, info};

/// Outcome of one storage compaction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageCompactionStats {
    /// Blocks promoted HOT → WARM.
    pub promoted_to_warm: usize,
    /// Blocks promoted WARM → COLD.
    pub promoted_to_cold: usize,
    /// Merge groups executed.
    pub merges: usize,
    /// Source blocks consumed by merges.
    pub blocks_merged: usize,
}

impl HybridStore {
    /// Whether a compaction pass should run at `now`.
    pub fn compaction_due(&self, now: Timestamp) -> bool {
        let interval = self.config().compaction_interval_seconds as i64 * 1_000_000;
        let since_last = now.saturating_sub(*self.last_compaction.lock());
        if since_last > interval {
            return true;
        }
        let usage = self.tier_usage();
        usage[0].bytes > self.config().hot_tier_max_bytes
            || usage[1].bytes > self.config().warm_tier_max_bytes
    }

    /// Run one compaction pass: promotions by age, then intra-tier merges.
    pub fn compact(&self, now: Timestamp, cancel: &CancelContext) -> Result<StorageCompactionStats> {
        cancel.check()?;
        let mut stats = StorageCompactionStats::default();

        {
            // Fixed acquisition order; held for the whole pass.
            let mut hot = self.tier_lock(Tier::Hot).write();
            let mut warm = self.tier_lock(Tier::Warm).write();
            let mut cold = self.tier_lock(Tier::Cold).write();

            let hot_cutoff = now.saturating_sub(self.config().hot_tier_max_age_micros());
            stats.promoted_to_warm =
                self.promote(&mut hot, &mut warm, Tier::Hot, Tier::Warm, hot_cutoff)?;

            let warm_cutoff = now.saturating_sub(self.config().warm_tier_max_age_micros());
            stats.promoted_to_cold =
                self.promote(&mut warm, &mut cold, Tier::Warm, Tier::Cold, warm_cutoff)?;

            cancel.check()?;

            for (tier, blocks) in [
                (Tier::Hot, &mut *hot),
                (Tier::Warm, &mut *warm),
                (Tier::Cold, &mut *cold),
            ] {
                let (merges, merged) = self.merge_small_blocks(tier, blocks)?;
                stats.merges += merges;
                stats.blocks_merged += merged;
            }
        }

        *self.last_compaction.lock() = now;
        info!(
            target: "terrace::storage",
            table = %self.table(),
            promoted_to_warm = stats.promoted_to_warm,
            promoted_to_cold = stats.promoted_to_cold,
            merges = stats.merges,
            "compaction pass complete"
        );
        Ok(stats)
    }

    // Move blocks admitted before `cutoff` from `from` to `to`. The blob
    // object is rewritten under the destination tier's name before the
    // source object is removed.
    fn promote(
        &self,
        from_blocks: &mut Vec<DataBlock>,
        to_blocks: &mut Vec<DataBlock>,
        from: Tier,
        to: Tier,
        cutoff: Timestamp,
    ) -> Result<usize> {
        let mut promoted = 0;
        let mut idx = 0;
        while idx < from_blocks.len() {
            if from_blocks[idx].admitted_at < cutoff {
                let block = from_blocks.remove(idx);
                let bytes = crate::block::encode_block(&block)?;
                self.blob().put(&self.block_key(to, block.id), &bytes)?;
                self.blob().delete(&self.block_key(from, block.id))?;
                debug!(
                    target: "terrace::storage",
                    table = %self.table(),
                    block = %block.id.simple(),
                    from = %from,
                    to = %to,
                    "block promoted"
                );
                to_blocks.push(block);
                promoted += 1;
            } else {
                idx += 1;
            }
        }
        if promoted > 0 {
            to_blocks.sort_by_key(|b| b.admitted_at);
        }
        Ok(promoted)
    }

    // Combine adjacent small blocks within one tier. Groups grow until
    // the accumulated size reaches the minimum target or the group hits
    // the per-pass block bound; singleton groups are left alone.
    fn merge_small_blocks(
        &self,
        tier: Tier,
        blocks: &mut Vec<DataBlock>,
    ) -> Result<(usize, usize)> {
        let min_size = self.config().min_compaction_size_bytes;
        let max_group = self.config().max_blocks_per_compaction;

        blocks.sort_by_key(|b| b.admitted_at);
        let mut merges = 0;
        let mut merged_sources = 0;
        let mut out: Vec<DataBlock> = Vec::with_capacity(blocks.len());
        let mut group: Vec<DataBlock> = Vec::new();
        let mut group_bytes = 0u64;

        let drained: Vec<DataBlock> = std::mem::take(blocks);
        for block in drained {
            let small = block.size_bytes < min_size;
            if small && group.len() < max_group && group_bytes < min_size {
                group_bytes += block.size_bytes;
                group.push(block);
                if group.len() == max_group || group_bytes >= min_size {
                    self.flush_group(tier, &mut group, &mut group_bytes, &mut out, &mut merges, &mut merged_sources)?;
                }
            } else {
                self.flush_group(tier, &mut group, &mut group_bytes, &mut out, &mut merges, &mut merged_sources)?;
                out.push(block);
            }
        }
        self.flush_group(tier, &mut group, &mut group_bytes, &mut out, &mut merges, &mut merged_sources)?;

        out.sort_by_key(|b| b.admitted_at);
        *blocks = out;
        Ok((merges, merged_sources))
    }

    fn flush_group(
        &self,
        tier: Tier,
        group: &mut Vec<DataBlock>,
        group_bytes: &mut u64,
        out: &mut Vec<DataBlock>,
        merges: &mut usize,
        merged_sources: &mut usize,
    ) -> Result<()> {
        *group_bytes = 0;
        match group.len() {
            0 => Ok(()),
            1 => {
                out.push(group.pop().expect("group has one block"));
                Ok(())
            }
            _ => {
                let sources: Vec<DataBlock> = std::mem::take(group);
                let admitted_at = sources
                    .iter()
                    .map(|b| b.admitted_at)
                    .min()
                    .expect("group is non-empty");
                let rows: Vec<_> = sources.iter().flat_map(|b| b.rows.clone()).collect();
                let merged = DataBlock::new(BlockKind::Base, rows, admitted_at);

                // Persist the merged block before dropping sources.
                let bytes = crate::block::encode_block(&merged)?;
                self.blob().put(&self.block_key(tier, merged.id), &bytes)?;
                for source in &sources {
                    self.blob().delete(&self.block_key(tier, source.id))?;
                }

                debug!(
                    target: "terrace::storage",
                    table = %self.table(),
                    tier = %tier,
                    sources = sources.len(),
                    merged = %merged.id.simple(),
                    "blocks merged"
                );
                *merges += 1;
                *merged_sources += sources.len();
                out.push(merged);
                Ok(())
            }
        }
    }
}
