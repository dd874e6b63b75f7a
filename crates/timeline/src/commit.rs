//! Commit and change-descriptor types
//!
//! A commit is an immutable, hash-linked record of the changes one
//! transaction applied to one table. Change descriptors carry full records
//! for inserts and updates and just the key for deletes; replaying a
//! table's descriptors in timeline order reconstructs its state at any
//! timestamp.

use serde::{Deserialize, Serialize};
use terrace_core::{CommitId, Record, Timestamp};

/// One change within a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeDescriptor {
    /// A new row.
    Insert {
        /// Canonical primary-key rendering.
        key: String,
        /// Full row content.
        record: Record,
    },
    /// A replaced row.
    Update {
        /// Canonical primary-key rendering.
        key: String,
        /// Full new row content.
        record: Record,
    },
    /// A removed row.
    Delete {
        /// Canonical primary-key rendering.
        key: String,
    },
}

impl ChangeDescriptor {
    /// The row key this change touches.
    pub fn key(&self) -> &str {
        match self {
            ChangeDescriptor::Insert { key, .. }
            | ChangeDescriptor::Update { key, .. }
            | ChangeDescriptor::Delete { key } => key,
        }
    }

    /// The row content, if this change carries one.
    pub fn record(&self) -> Option<&Record> {
        match self {
            ChangeDescriptor::Insert { record, .. } | ChangeDescriptor::Update { record, .. } => {
                Some(record)
            }
            ChangeDescriptor::Delete { .. } => None,
        }
    }

    /// Whether this change removes the row.
    pub fn is_delete(&self) -> bool {
        matches!(self, ChangeDescriptor::Delete { .. })
    }
}

/// An immutable commit in a table's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Content address: the Merkle root of this commit.
    pub id: CommitId,
    /// Parent commit id (genesis for the first commit).
    pub parent: CommitId,
    /// Table this commit belongs to.
    pub table: String,
    /// Commit timestamp, strictly increasing per table.
    pub timestamp: Timestamp,
    /// Ordered changes applied by the commit.
    pub changes: Vec<ChangeDescriptor>,
    /// Schema version the changes were validated against.
    pub schema_version: u32,
}

/// A logical timeline entry: the time-travel view of either a live commit
/// or a per-timestamp slot inside a compacted segment.
///
/// Entries are what `as_of` and `range` return; compaction collapses the
/// hash chain but never the logical history, so entries survive it
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Commit timestamp.
    pub timestamp: Timestamp,
    /// Schema version active for these changes.
    pub schema_version: u32,
    /// The changes, in application order.
    pub changes: Vec<ChangeDescriptor>,
    /// The originating commit id; `None` once the commit has been
    /// coalesced into a segment.
    pub commit: Option<CommitId>,
}

impl TimelineEntry {
    /// Build an entry from a live commit.
    pub fn from_commit(commit: &Commit) -> Self {
        Self {
            timestamp: commit.timestamp,
            schema_version: commit.schema_version,
            changes: commit.changes.clone(),
            commit: Some(commit.id),
        }
    }
}
