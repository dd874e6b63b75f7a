//! Data blocks
//!
//! A block is the persistence unit of the tiered store: a batch of rows
//! admitted together, plus access bookkeeping the compactor reads. Block
//! bodies are bincode with a CRC32 trailer; a corrupt or partially
//! written body fails decoding and the block is discarded on open, leaving
//! the source blocks of an interrupted compaction authoritative.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use terrace_core::{Error, Record, Result, Timestamp};
use uuid::Uuid;

/// How the rows in a block were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// Copy-on-write output: self-contained row images.
    Base,
    /// Merge-on-read delta: change records reconciled at scan time.
    Delta,
}

/// One versioned row as stored in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    /// Canonical primary-key rendering.
    pub key: String,
    /// Commit timestamp of this row version.
    pub commit_ts: Timestamp,
    /// Whether this version deletes the row.
    pub tombstone: bool,
    /// Row content (empty for tombstones).
    pub record: Record,
}

impl StoredRow {
    /// A live row version.
    pub fn live(key: impl Into<String>, commit_ts: Timestamp, record: Record) -> Self {
        Self {
            key: key.into(),
            commit_ts,
            tombstone: false,
            record,
        }
    }

    /// A deletion marker.
    pub fn tombstone(key: impl Into<String>, commit_ts: Timestamp) -> Self {
        Self {
            key: key.into(),
            commit_ts,
            tombstone: true,
            record: Record::new(),
        }
    }
}

/// A batch of rows admitted to a tier together.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    /// Block id, stable across tier migrations.
    pub id: Uuid,
    /// Base (CoW) or Delta (MoR).
    pub kind: BlockKind,
    /// The rows, in admission order.
    pub rows: Vec<StoredRow>,
    /// When the block was admitted (engine microseconds). Promotion ages
    /// blocks by this; merges keep the earliest.
    pub admitted_at: Timestamp,
    /// Approximate payload size in bytes.
    pub size_bytes: u64,
    /// Scans that touched this block.
    pub access_count: u64,
    /// Timestamp of the most recent scan touch.
    pub last_access: Timestamp,
}

impl DataBlock {
    /// Build a block from rows, computing its size.
    pub fn new(kind: BlockKind, rows: Vec<StoredRow>, admitted_at: Timestamp) -> Self {
        let size_bytes = rows
            .iter()
            .map(|r| r.key.len() as u64 + 16 + r.record.approx_size())
            .sum();
        Self {
            id: Uuid::new_v4(),
            kind,
            rows,
            admitted_at,
            size_bytes,
            access_count: 0,
            last_access: 0,
        }
    }

    /// Number of row versions in the block.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Serialize, Deserialize)]
struct BlockBody {
    id: Uuid,
    kind: BlockKind,
    admitted_at: Timestamp,
    rows: Vec<StoredRow>,
}

/// Encode a block body with its CRC32 trailer.
pub fn encode_block(block: &DataBlock) -> Result<Vec<u8>> {
    let body = BlockBody {
        id: block.id,
        kind: block.kind,
        admitted_at: block.admitted_at,
        rows: block.rows.clone(),
    };
    let payload = bincode::serialize(&body)?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let mut out = payload;
    out.write_u32::<LittleEndian>(crc)
        .expect("vec write is infallible");
    Ok(out)
}

/// Decode and checksum-verify a block body.
///
/// # Errors
///
/// `IntegrityFailure` on a short buffer or CRC mismatch — the signature of
/// a partially written compaction output.
pub fn decode_block(bytes: &[u8]) -> Result<DataBlock> {
    if bytes.len() < 4 {
        return Err(Error::IntegrityFailure("block body too short".to_string()));
    }
    let (payload, trailer) = bytes.split_at(bytes.len() - 4);
    let stored_crc = Cursor::new(trailer)
        .read_u32::<LittleEndian>()
        .map_err(|e| Error::IntegrityFailure(e.to_string()))?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    if hasher.finalize() != stored_crc {
        return Err(Error::IntegrityFailure("block CRC mismatch".to_string()));
    }
    let body: BlockBody = bincode::deserialize(payload)?;
    let mut block = DataBlock::new(body.kind, body.rows, body.admitted_at);
    block.id = body.id;
    Ok(block)
}
