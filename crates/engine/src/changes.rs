//! Change feeds

use serde::{Deserialize, Serialize};
use terrace_core::{CommitId, Timestamp, Watermark};
use terrace_timeline::ChangeDescriptor;

/// The changes of one commit (or one compacted segment slot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeGroup {
    /// Commit timestamp.
    pub timestamp: Timestamp,
    /// Originating commit id; `None` once compacted into a segment.
    pub commit: Option<CommitId>,
    /// The changes, in application order.
    pub changes: Vec<ChangeDescriptor>,
}

/// Everything committed to a table after a watermark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Source table.
    pub table: String,
    /// The watermark the caller asked from (exclusive).
    pub since: Watermark,
    /// Watermark to use for the next incremental call: the highest
    /// timestamp included, or `since` when nothing changed.
    pub watermark: Watermark,
    /// Change groups in commit order.
    pub commits: Vec<ChangeGroup>,
}

impl ChangeSet {
    /// Total change descriptors across all groups.
    pub fn change_count(&self) -> usize {
        self.commits.iter().map(|g| g.changes.len()).sum()
    }

    /// Whether nothing was committed after the watermark.
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}
