//! Timeline segment compaction
//!
//! Contiguous commits older than the retention threshold and below the
//! oldest live snapshot are coalesced into a `Segment`. A segment keeps:
//!
//! - the endpoint roots (`start_parent`, `end_root`), so the chain stays
//!   verifiable end to end after the member commits are dropped, and
//! - a per-timestamp logical diff index (`entries`), so `as_of` at any
//!   timestamp inside the segment answers exactly as it did before.
//!
//! Segments persist in `segments.log`, framed as
//! `[u32 length][bincode segment][u32 crc32]`.

use crate::commit::{Commit, TimelineEntry};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use terrace_core::{CommitId, Error, Result, Timestamp};

/// Per-timestamp logical diff inside a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentEntry {
    /// The coalesced commit's timestamp.
    pub timestamp: Timestamp,
    /// Schema version active for that commit.
    pub schema_version: u32,
    /// The commit's changes, in original order.
    pub changes: Vec<crate::commit::ChangeDescriptor>,
}

/// A compacted run of commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Table the segment belongs to.
    pub table: String,
    /// Timestamp of the first coalesced commit.
    pub start_ts: Timestamp,
    /// Timestamp of the last coalesced commit.
    pub end_ts: Timestamp,
    /// Parent root of the first coalesced commit.
    pub start_parent: CommitId,
    /// Root of the last coalesced commit; the next live commit links here.
    pub end_root: CommitId,
    /// How many commits were coalesced.
    pub commit_count: u64,
    /// Per-timestamp diff index, ascending by timestamp.
    pub entries: Vec<SegmentEntry>,
}

impl Segment {
    /// Build a segment from a contiguous run of verified commits.
    pub fn from_commits(commits: &[Commit]) -> Segment {
        debug_assert!(!commits.is_empty());
        let first = &commits[0];
        let last = &commits[commits.len() - 1];
        Segment {
            table: first.table.clone(),
            start_ts: first.timestamp,
            end_ts: last.timestamp,
            start_parent: first.parent,
            end_root: last.id,
            commit_count: commits.len() as u64,
            entries: commits
                .iter()
                .map(|c| SegmentEntry {
                    timestamp: c.timestamp,
                    schema_version: c.schema_version,
                    changes: c.changes.clone(),
                })
                .collect(),
        }
    }

    /// Timeline entries for this segment's slots with timestamp ≤ `at`.
    pub fn entries_up_to(&self, at: Timestamp) -> impl Iterator<Item = TimelineEntry> + '_ {
        self.entries
            .iter()
            .take_while(move |e| e.timestamp <= at)
            .map(|e| TimelineEntry {
                timestamp: e.timestamp,
                schema_version: e.schema_version,
                changes: e.changes.clone(),
                commit: None,
            })
    }
}

/// Outcome of one compaction pass, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactionReport {
    /// Segments written this pass.
    pub segments_created: usize,
    /// Commits coalesced this pass.
    pub commits_compacted: usize,
}

/// Encode one segment record.
pub fn encode_segment(segment: &Segment) -> Result<Vec<u8>> {
    let payload = bincode::serialize(segment)?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let mut out = Vec::with_capacity(payload.len() + 8);
    out.write_u32::<LittleEndian>(payload.len() as u32)
        .expect("vec write is infallible");
    out.extend_from_slice(&payload);
    out.write_u32::<LittleEndian>(crc)
        .expect("vec write is infallible");
    Ok(out)
}

/// Decode the segment record starting at `offset`.
///
/// Returns `Ok(None)` at a clean end of buffer; `IntegrityFailure` on a
/// truncated or corrupt record.
pub fn decode_segment(buf: &[u8], offset: usize) -> Result<Option<(Segment, usize)>> {
    if offset == buf.len() {
        return Ok(None);
    }
    let remaining = &buf[offset..];
    if remaining.len() < 8 {
        return Err(Error::IntegrityFailure(
            "truncated segment header".to_string(),
        ));
    }
    let mut cursor = Cursor::new(remaining);
    let len = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| Error::IntegrityFailure(e.to_string()))? as usize;
    let total = 4 + len + 4;
    if remaining.len() < total {
        return Err(Error::IntegrityFailure(format!(
            "truncated segment: need {} bytes, have {}",
            total,
            remaining.len()
        )));
    }
    let payload = &remaining[4..4 + len];
    let stored_crc = {
        let mut c = Cursor::new(&remaining[4 + len..total]);
        c.read_u32::<LittleEndian>()
            .map_err(|e| Error::IntegrityFailure(e.to_string()))?
    };
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    if hasher.finalize() != stored_crc {
        return Err(Error::IntegrityFailure("segment CRC mismatch".to_string()));
    }
    let segment: Segment = bincode::deserialize(payload)?;
    Ok(Some((segment, offset + total)))
}
