//! Identifier and timestamp types shared across the engine
//!
//! This module defines:
//! - Timestamp: the single logical time unit (microseconds since epoch)
//! - CommitId: content address of a timeline commit (its Merkle root)
//! - Key: fully qualified row address (table + primary key)
//! - Watermark: commit timestamp boundary for incremental consumers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical timestamp in microseconds since the Unix epoch.
///
/// The engine uses exactly one unit everywhere; conversion from seconds or
/// ISO-8601 strings happens only at the parsing boundary
/// ([`crate::clock::parse_timestamp`]). Negative values denote pre-epoch
/// instants and are valid input for time travel.
pub type Timestamp = i64;

/// Commit timestamp marking the boundary of already-processed data.
///
/// Used by incremental scans, change feeds, and materialized-view refresh.
pub type Watermark = Timestamp;

/// Content address of a commit: the 256-bit Merkle root of its payload.
///
/// A commit's id is `SHA256(parent_root ‖ canonical_payload ‖ schema_version)`,
/// so equal ids imply equal history prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitId(pub [u8; 32]);

impl CommitId {
    /// The id linked as parent by the first commit of a table.
    pub const GENESIS: CommitId = CommitId([0u8; 32]);

    /// Raw bytes of the id.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering of the full id.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in self.0 {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
        }
        s
    }

    /// First eight hex characters, for logs and diagnostics.
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }

    /// Whether this is the genesis (all-zero) id.
    pub fn is_genesis(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fully qualified row address: table name plus primary-key rendering.
///
/// The version store, transaction write sets, and conflict diagnostics all
/// speak in terms of `Key`. Ordering is lexicographic on (table, row), which
/// groups a table's rows together for scans.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    /// Table the row belongs to.
    pub table: String,
    /// Canonical primary-key rendering for the row.
    pub row: String,
}

impl Key {
    /// Create a key from table and row identifiers.
    pub fn new(table: impl Into<String>, row: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            row: row.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.row)
    }
}
