//! Commit record framing
//!
//! On-disk layout of one commit record, all integers little-endian:
//!
//! ```text
//! [u32 length][payload bytes][u64 timestamp][32 merkle_root][32 parent_root]
//! [u32 schema_version][u32 crc32]
//! ```
//!
//! `length` is the payload byte count; the CRC32 covers everything between
//! the length field and the CRC itself. The length prefix makes variable
//! records scannable, the CRC detects bit flips and partial writes at the
//! log tail.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use terrace_core::{CommitId, Error, Result, Timestamp};

/// Fixed overhead past the payload: timestamp + two roots + schema version
/// + CRC.
const TRAILER_LEN: usize = 8 + 32 + 32 + 4 + 4;

/// A decoded on-disk commit record.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Canonical payload bytes (encoded change list).
    pub payload: Vec<u8>,
    /// Commit timestamp.
    pub timestamp: Timestamp,
    /// Merkle root (= commit id).
    pub root: CommitId,
    /// Parent root.
    pub parent: CommitId,
    /// Schema version the payload was validated against.
    pub schema_version: u32,
}

/// Encode one commit record.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut body = Vec::with_capacity(frame.payload.len() + TRAILER_LEN - 4);
    body.extend_from_slice(&frame.payload);
    body.write_u64::<LittleEndian>(frame.timestamp as u64)
        .expect("vec write is infallible");
    body.extend_from_slice(frame.root.as_bytes());
    body.extend_from_slice(frame.parent.as_bytes());
    body.write_u32::<LittleEndian>(frame.schema_version)
        .expect("vec write is infallible");

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&body);
    let crc = hasher.finalize();

    let mut out = Vec::with_capacity(4 + body.len() + 4);
    out.write_u32::<LittleEndian>(frame.payload.len() as u32)
        .expect("vec write is infallible");
    out.extend_from_slice(&body);
    out.write_u32::<LittleEndian>(crc)
        .expect("vec write is infallible");
    out
}

/// Decode the record starting at `offset`.
///
/// Returns `Ok(None)` at a clean end of buffer. A truncated or corrupt
/// record returns `IntegrityFailure`; during recovery the caller truncates
/// the log there.
pub fn decode_frame(buf: &[u8], offset: usize) -> Result<Option<(Frame, usize)>> {
    if offset == buf.len() {
        return Ok(None);
    }
    let remaining = &buf[offset..];
    if remaining.len() < 4 {
        return Err(Error::IntegrityFailure(
            "truncated frame header at log tail".to_string(),
        ));
    }

    let mut cursor = Cursor::new(remaining);
    let payload_len = cursor.read_u32::<LittleEndian>().map_err(io_integrity)? as usize;
    let total = 4 + payload_len + TRAILER_LEN;
    if remaining.len() < total {
        return Err(Error::IntegrityFailure(format!(
            "truncated frame: need {} bytes, have {}",
            total,
            remaining.len()
        )));
    }

    let body = &remaining[4..total - 4];
    let stored_crc = {
        let mut c = Cursor::new(&remaining[total - 4..total]);
        c.read_u32::<LittleEndian>().map_err(io_integrity)?
    };
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(body);
    if hasher.finalize() != stored_crc {
        return Err(Error::IntegrityFailure(
            "frame CRC mismatch".to_string(),
        ));
    }

    let payload = body[..payload_len].to_vec();
    let mut cursor = Cursor::new(&body[payload_len..]);
    let timestamp = cursor.read_u64::<LittleEndian>().map_err(io_integrity)? as i64;
    let mut root = [0u8; 32];
    let mut parent = [0u8; 32];
    std::io::Read::read_exact(&mut cursor, &mut root).map_err(io_integrity)?;
    std::io::Read::read_exact(&mut cursor, &mut parent).map_err(io_integrity)?;
    let schema_version = cursor.read_u32::<LittleEndian>().map_err(io_integrity)?;

    Ok(Some((
        Frame {
            payload,
            timestamp,
            root: CommitId(root),
            parent: CommitId(parent),
            schema_version,
        },
        offset + total,
    )))
}

fn io_integrity(e: std::io::Error) -> Error {
    Error::IntegrityFailure(format!("frame decode: {}", e))
}
