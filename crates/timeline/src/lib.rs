//! Merkle timeline for Terrace
//!
//! An append-only, hash-chained commit log per table:
//! - Commit / ChangeDescriptor: what changed, at which timestamp, under
//!   which schema version
//! - Merkle rule: `root = SHA256(parent_root ‖ canonical_payload ‖ schema_version)`
//! - Framed on-disk records with CRC32 and torn-tail recovery
//! - `as_of` / `range` time travel in O(log N) over the commit index
//! - Segment compaction that preserves exact time-travel answers and the
//!   chain's endpoint verifiability

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commit;
pub mod compaction;
pub mod framing;
pub mod log;
pub mod merkle;

pub use commit::{ChangeDescriptor, Commit, TimelineEntry};
pub use compaction::{CompactionReport, Segment, SegmentEntry};
pub use log::TableTimeline;
pub use merkle::{canonical_payload, compute_root};
