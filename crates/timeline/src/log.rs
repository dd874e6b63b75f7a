//! Per-table commit log
//!
//! `TableTimeline` owns one table's append-only log on disk plus an
//! in-memory index of live commits and compacted segments. Appends go
//! through a single writer lock; reads come from the index and never touch
//! the file.
//!
//! ## Recovery
//!
//! On open the log is re-scanned. A torn tail frame (bad length or CRC) is
//! truncated. A frame whose Merkle link or root does not verify is
//! discarded along with everything after it, and a repair advisory is
//! logged. A leftover compaction temp file means the pass never renamed
//! into place; it is rolled back by deletion.

use crate::commit::{ChangeDescriptor, Commit, TimelineEntry};
use crate::compaction::{
    decode_segment, encode_segment, CompactionReport, Segment,
};
use crate::framing::{decode_frame, encode_frame, Frame};
use crate::merkle::{canonical_payload, compute_root, verify_chain};
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use terrace_core::{CommitId, DurabilityLevel, Error, Result, Timestamp};
use tracing::{debug, info, warn};

const COMMITS_FILE: &str = "commits.log";
const SEGMENTS_FILE: &str = "segments.log";

/// In batched durability, fsync every this many appends.
const BATCHED_SYNC_EVERY: u64 = 64;

struct TimelineState {
    segments: Vec<Segment>,
    commits: Vec<Commit>,
    head: CommitId,
}

impl TimelineState {
    fn last_timestamp(&self) -> Option<Timestamp> {
        self.commits
            .last()
            .map(|c| c.timestamp)
            .or_else(|| self.segments.last().map(|s| s.end_ts))
    }

    fn segment_anchor(&self) -> CommitId {
        self.segments
            .last()
            .map(|s| s.end_root)
            .unwrap_or(CommitId::GENESIS)
    }
}

/// Append-only, hash-chained commit log for one table.
pub struct TableTimeline {
    table: String,
    commits_path: PathBuf,
    segments_path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    durability: DurabilityLevel,
    appends_since_sync: AtomicU64,
    state: RwLock<TimelineState>,
}

impl TableTimeline {
    /// Open or create the timeline for `table` under `timeline_dir`.
    pub fn open(
        timeline_dir: impl AsRef<Path>,
        table: &str,
        durability: DurabilityLevel,
    ) -> Result<Self> {
        let dir = timeline_dir.as_ref().join(table);
        fs::create_dir_all(&dir)?;
        let commits_path = dir.join(COMMITS_FILE);
        let segments_path = dir.join(SEGMENTS_FILE);

        // A temp file means a compaction pass died before its rename;
        // the originals are still authoritative.
        for stale in [
            commits_path.with_extension("log.tmp"),
            segments_path.with_extension("log.tmp"),
        ] {
            if stale.exists() {
                warn!(
                    target: "terrace::timeline",
                    table,
                    path = %stale.display(),
                    "rolling back interrupted compaction"
                );
                fs::remove_file(&stale)?;
            }
        }

        let segments = Self::load_segments(&segments_path, table)?;
        let anchor = segments
            .last()
            .map(|s| s.end_root)
            .unwrap_or(CommitId::GENESIS);
        let commits = Self::load_commits(&commits_path, table, anchor)?;
        let head = commits.last().map(|c| c.id).unwrap_or(anchor);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&commits_path)?;

        debug!(
            target: "terrace::timeline",
            table,
            commits = commits.len(),
            segments = segments.len(),
            "timeline opened"
        );

        Ok(Self {
            table: table.to_string(),
            commits_path,
            segments_path,
            writer: Mutex::new(BufWriter::new(file)),
            durability,
            appends_since_sync: AtomicU64::new(0),
            state: RwLock::new(TimelineState {
                segments,
                commits,
                head,
            }),
        })
    }

    fn load_segments(path: &Path, table: &str) -> Result<Vec<Segment>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let buf = fs::read(path)?;
        let mut segments = Vec::new();
        let mut offset = 0usize;
        loop {
            match decode_segment(&buf, offset) {
                Ok(Some((segment, next))) => {
                    segments.push(segment);
                    offset = next;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        target: "terrace::timeline",
                        table,
                        offset,
                        error = %e,
                        "discarding unreadable segment tail; repair advisory"
                    );
                    break;
                }
            }
        }
        Ok(segments)
    }

    fn load_commits(path: &Path, table: &str, anchor: CommitId) -> Result<Vec<Commit>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let buf = fs::read(path)?;
        let mut commits: Vec<Commit> = Vec::new();
        let mut offset = 0usize;
        let mut parent = anchor;
        let mut truncate_at = None;

        loop {
            match decode_frame(&buf, offset) {
                Ok(None) => break,
                Ok(Some((frame, next))) => {
                    match Self::frame_to_commit(table, &frame, parent) {
                        Ok(commit) => {
                            parent = commit.id;
                            commits.push(commit);
                            offset = next;
                        }
                        Err(e) => {
                            warn!(
                                target: "terrace::timeline",
                                table,
                                offset,
                                error = %e,
                                "unverifiable commit; truncating log tail; repair advisory"
                            );
                            truncate_at = Some(offset);
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        target: "terrace::timeline",
                        table,
                        offset,
                        error = %e,
                        "torn frame at log tail; truncating"
                    );
                    truncate_at = Some(offset);
                    break;
                }
            }
        }

        if let Some(at) = truncate_at {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(at as u64)?;
            file.sync_all()?;
        }
        Ok(commits)
    }

    fn frame_to_commit(table: &str, frame: &Frame, expected_parent: CommitId) -> Result<Commit> {
        if frame.parent != expected_parent {
            return Err(Error::IntegrityFailure(format!(
                "parent {} does not link to {}",
                frame.parent.short(),
                expected_parent.short()
            )));
        }
        let recomputed = compute_root(&frame.parent, &frame.payload, frame.schema_version);
        if recomputed != frame.root {
            return Err(Error::IntegrityFailure(format!(
                "stored root {} does not match recomputed {}",
                frame.root.short(),
                recomputed.short()
            )));
        }
        let changes: Vec<ChangeDescriptor> = bincode::deserialize(&frame.payload)?;
        Ok(Commit {
            id: frame.root,
            parent: frame.parent,
            table: table.to_string(),
            timestamp: frame.timestamp,
            changes,
            schema_version: frame.schema_version,
        })
    }

    /// Append a commit at `timestamp`, persisting it atomically.
    ///
    /// The caller (the commit coordinator) supplies the timestamp from the
    /// global oracle; per-table timestamps must be strictly increasing.
    pub fn append(
        &self,
        timestamp: Timestamp,
        changes: Vec<ChangeDescriptor>,
        schema_version: u32,
    ) -> Result<Commit> {
        let mut state = self.state.write();
        if let Some(last) = state.last_timestamp() {
            if timestamp <= last {
                return Err(Error::InvalidOperation(format!(
                    "commit timestamp {} is not after {} on table {}",
                    timestamp, last, self.table
                )));
            }
        }

        let parent = state.head;
        let payload = canonical_payload(&changes)?;
        let root = compute_root(&parent, &payload, schema_version);
        let frame = Frame {
            payload,
            timestamp,
            root,
            parent,
            schema_version,
        };
        let bytes = encode_frame(&frame);

        {
            let mut writer = self.writer.lock();
            writer.write_all(&bytes)?;
            writer.flush()?;
            match self.durability {
                DurabilityLevel::Strict => writer.get_ref().sync_all()?,
                DurabilityLevel::Batched => {
                    let n = self.appends_since_sync.fetch_add(1, Ordering::Relaxed) + 1;
                    if n >= BATCHED_SYNC_EVERY {
                        self.appends_since_sync.store(0, Ordering::Relaxed);
                        writer.get_ref().sync_all()?;
                    }
                }
            }
        }

        let commit = Commit {
            id: root,
            parent,
            table: self.table.clone(),
            timestamp,
            changes,
            schema_version,
        };
        state.head = root;
        state.commits.push(commit.clone());

        debug!(
            target: "terrace::timeline",
            table = %self.table,
            commit = %commit.id.short(),
            timestamp,
            changes = commit.changes.len(),
            "commit appended"
        );
        Ok(commit)
    }

    /// Current head commit id.
    pub fn head(&self) -> CommitId {
        self.state.read().head
    }

    /// Timestamp of the latest commit, if any.
    pub fn latest_timestamp(&self) -> Option<Timestamp> {
        self.state.read().last_timestamp()
    }

    /// Total commits recorded, including those coalesced into segments.
    pub fn commit_count(&self) -> u64 {
        let state = self.state.read();
        state.segments.iter().map(|s| s.commit_count).sum::<u64>()
            + state.commits.len() as u64
    }

    /// The commit prefix visible at `at`, plus the schema version active
    /// then.
    ///
    /// The cut point is found by binary search over the timestamp-ordered
    /// index; collection is proportional to the answer.
    pub fn as_of(&self, at: Timestamp) -> (Vec<TimelineEntry>, u32) {
        let state = self.state.read();
        let mut entries: Vec<TimelineEntry> = Vec::new();
        for segment in &state.segments {
            if segment.start_ts > at {
                break;
            }
            entries.extend(segment.entries_up_to(at));
        }
        let cut = state.commits.partition_point(|c| c.timestamp <= at);
        entries.extend(state.commits[..cut].iter().map(TimelineEntry::from_commit));

        let schema_version = entries.last().map(|e| e.schema_version).unwrap_or(1);
        (entries, schema_version)
    }

    /// Entries with timestamps in `[start, end]`, both inclusive.
    ///
    /// `end == 0` means unbounded; an inverted non-zero range is
    /// normalized by swapping.
    pub fn range(&self, start: Timestamp, end: Timestamp) -> Vec<TimelineEntry> {
        let (start, end) = if end == 0 {
            (start, Timestamp::MAX)
        } else if start > end {
            (end, start)
        } else {
            (start, end)
        };

        let state = self.state.read();
        let mut entries: Vec<TimelineEntry> = Vec::new();
        for segment in &state.segments {
            if segment.start_ts > end {
                break;
            }
            entries.extend(
                segment
                    .entries_up_to(end)
                    .filter(|e| e.timestamp >= start),
            );
        }
        let lo = state.commits.partition_point(|c| c.timestamp < start);
        let hi = state.commits.partition_point(|c| c.timestamp <= end);
        entries.extend(state.commits[lo..hi].iter().map(TimelineEntry::from_commit));
        entries
    }

    /// Entries with timestamps strictly after `watermark`.
    pub fn changes_since(&self, watermark: Timestamp) -> Vec<TimelineEntry> {
        if watermark == Timestamp::MAX {
            return Vec::new();
        }
        self.range(watermark + 1, 0)
    }

    /// Coalesce old commits into a segment.
    ///
    /// Eligible commits are a contiguous prefix with timestamps before both
    /// `now - retention` and `snapshot_floor` (the oldest live snapshot).
    /// The pass writes the new segment file and the trimmed commit log to
    /// temp files, fsyncs, then renames — either both land or the pass
    /// rolls back on the next open.
    pub fn compact(
        &self,
        retention_micros: i64,
        snapshot_floor: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<CompactionReport> {
        let mut state = self.state.write();
        let cutoff = now.saturating_sub(retention_micros);
        let floor = snapshot_floor.map_or(cutoff, |s| s.min(cutoff));
        let eligible = state.commits.partition_point(|c| c.timestamp < floor);
        if eligible < 2 {
            return Ok(CompactionReport::default());
        }

        let segment = Segment::from_commits(&state.commits[..eligible]);

        // Write both files aside, fsync, then swap.
        let seg_tmp = self.segments_path.with_extension("log.tmp");
        {
            let mut buf = Vec::new();
            for existing in &state.segments {
                buf.extend(encode_segment(existing)?);
            }
            buf.extend(encode_segment(&segment)?);
            let mut file = File::create(&seg_tmp)?;
            file.write_all(&buf)?;
            file.sync_all()?;
        }

        let commits_tmp = self.commits_path.with_extension("log.tmp");
        {
            let mut buf = Vec::new();
            for commit in &state.commits[eligible..] {
                let frame = Frame {
                    payload: canonical_payload(&commit.changes)?,
                    timestamp: commit.timestamp,
                    root: commit.id,
                    parent: commit.parent,
                    schema_version: commit.schema_version,
                };
                buf.extend(encode_frame(&frame));
            }
            let mut file = File::create(&commits_tmp)?;
            file.write_all(&buf)?;
            file.sync_all()?;
        }

        fs::rename(&seg_tmp, &self.segments_path)?;
        fs::rename(&commits_tmp, &self.commits_path)?;

        // The append handle still points at the replaced inode.
        {
            let mut writer = self.writer.lock();
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.commits_path)?;
            *writer = BufWriter::new(file);
        }

        let compacted = eligible;
        state.commits.drain(..eligible);
        state.segments.push(segment);

        info!(
            target: "terrace::timeline",
            table = %self.table,
            commits = compacted,
            "timeline compaction complete"
        );
        Ok(CompactionReport {
            segments_created: 1,
            commits_compacted: compacted,
        })
    }

    /// Verify the full chain: segment endpoints link, live commits link and
    /// hash correctly.
    pub fn verify(&self) -> Result<()> {
        let state = self.state.read();
        let mut parent = CommitId::GENESIS;
        for segment in &state.segments {
            if segment.start_parent != parent {
                return Err(Error::IntegrityFailure(format!(
                    "segment at {} on table {} does not link to {}",
                    segment.start_ts,
                    self.table,
                    parent.short()
                )));
            }
            parent = segment.end_root;
        }
        verify_chain(&state.commits, parent)
    }

    /// The anchor a fresh commit would link to; exposed for diagnostics.
    pub fn segment_anchor(&self) -> CommitId {
        self.state.read().segment_anchor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrace_core::{Record, Value};
    use tempfile::TempDir;

    fn insert(key: &str, v: i64) -> ChangeDescriptor {
        ChangeDescriptor::Insert {
            key: key.to_string(),
            record: Record::from([("v", Value::Int(v))]),
        }
    }

    fn open(dir: &TempDir) -> TableTimeline {
        TableTimeline::open(dir.path(), "users", DurabilityLevel::Strict).unwrap()
    }

    #[test]
    fn append_links_chain() {
        let dir = TempDir::new().unwrap();
        let tl = open(&dir);
        let c1 = tl.append(100, vec![insert("1", 1)], 1).unwrap();
        let c2 = tl.append(200, vec![insert("2", 2)], 1).unwrap();
        assert_eq!(c1.parent, CommitId::GENESIS);
        assert_eq!(c2.parent, c1.id);
        assert_eq!(tl.head(), c2.id);
        assert_eq!(tl.commit_count(), 2);
        tl.verify().unwrap();
    }

    #[test]
    fn timestamps_strictly_increase() {
        let dir = TempDir::new().unwrap();
        let tl = open(&dir);
        tl.append(100, vec![insert("1", 1)], 1).unwrap();
        assert!(tl.append(100, vec![insert("2", 2)], 1).is_err());
        assert!(tl.append(50, vec![insert("2", 2)], 1).is_err());
    }

    #[test]
    fn as_of_cuts_by_timestamp() {
        let dir = TempDir::new().unwrap();
        let tl = open(&dir);
        tl.append(200, vec![insert("1", 1)], 1).unwrap();
        tl.append(300, vec![insert("2", 2)], 1).unwrap();

        let (entries, v) = tl.as_of(250);
        assert_eq!(entries.len(), 1);
        assert_eq!(v, 1);
        let (entries, _) = tl.as_of(350);
        assert_eq!(entries.len(), 2);
        let (entries, _) = tl.as_of(0);
        assert!(entries.is_empty());
    }

    #[test]
    fn range_inclusive_and_normalized() {
        let dir = TempDir::new().unwrap();
        let tl = open(&dir);
        tl.append(200, vec![insert("1", 1)], 1).unwrap();
        tl.append(300, vec![insert("2", 2)], 1).unwrap();

        assert_eq!(tl.range(150, 250).len(), 1);
        assert_eq!(tl.range(200, 300).len(), 2);
        // Inverted bounds swap.
        assert_eq!(tl.range(300, 200).len(), 2);
        // Zero end means unbounded.
        assert_eq!(tl.range(250, 0).len(), 1);
    }

    #[test]
    fn changes_since_watermark_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let tl = open(&dir);
        tl.append(200, vec![insert("1", 1)], 1).unwrap();
        tl.append(300, vec![insert("2", 2)], 1).unwrap();

        assert_eq!(tl.changes_since(0).len(), 2);
        assert_eq!(tl.changes_since(200).len(), 1);
        assert_eq!(tl.changes_since(300).len(), 0);
    }

    #[test]
    fn reopen_recovers_chain() {
        let dir = TempDir::new().unwrap();
        let head = {
            let tl = open(&dir);
            tl.append(100, vec![insert("1", 1)], 1).unwrap();
            tl.append(200, vec![insert("2", 2)], 1).unwrap();
            tl.head()
        };
        let tl = open(&dir);
        assert_eq!(tl.head(), head);
        assert_eq!(tl.commit_count(), 2);
        tl.verify().unwrap();
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let tl = open(&dir);
            tl.append(100, vec![insert("1", 1)], 1).unwrap();
            tl.append(200, vec![insert("2", 2)], 1).unwrap();
        }
        // Chop bytes off the tail to simulate a crash mid-append.
        let path = dir.path().join("users").join(COMMITS_FILE);
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 5).unwrap();

        let tl = open(&dir);
        assert_eq!(tl.commit_count(), 1);
        tl.verify().unwrap();
        // The log accepts appends again after truncation.
        tl.append(300, vec![insert("3", 3)], 1).unwrap();
        assert_eq!(tl.commit_count(), 2);
    }

    #[test]
    fn compaction_preserves_time_travel() {
        let dir = TempDir::new().unwrap();
        let tl = open(&dir);
        for i in 1..=5 {
            tl.append(i * 100, vec![insert(&i.to_string(), i)], 1).unwrap();
        }
        let before_250 = tl.as_of(250).0;
        let before_all = tl.as_of(1_000).0;

        // Commits at 100..=300 are older than the retention window.
        let report = tl.compact(600, None, 1_000).unwrap();
        assert_eq!(report.commits_compacted, 3);
        tl.verify().unwrap();

        let after_250 = tl.as_of(250).0;
        let after_all = tl.as_of(1_000).0;
        assert_eq!(
            before_250.iter().map(|e| &e.changes).collect::<Vec<_>>(),
            after_250.iter().map(|e| &e.changes).collect::<Vec<_>>()
        );
        assert_eq!(before_all.len(), after_all.len());
        assert_eq!(tl.commit_count(), 5);
    }

    #[test]
    fn compaction_respects_snapshot_floor() {
        let dir = TempDir::new().unwrap();
        let tl = open(&dir);
        for i in 1..=5 {
            tl.append(i * 100, vec![insert(&i.to_string(), i)], 1).unwrap();
        }
        // A live snapshot at 150 pins commits from 150 on.
        let report = tl.compact(0, Some(150), 10_000).unwrap();
        assert_eq!(report.commits_compacted, 0);

        let report = tl.compact(0, Some(350), 10_000).unwrap();
        assert_eq!(report.commits_compacted, 3);
    }

    #[test]
    fn compaction_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let tl = open(&dir);
            for i in 1..=4 {
                tl.append(i * 100, vec![insert(&i.to_string(), i)], 1).unwrap();
            }
            tl.compact(150, None, 500).unwrap();
        }
        let tl = open(&dir);
        assert_eq!(tl.commit_count(), 4);
        tl.verify().unwrap();
        assert_eq!(tl.as_of(1_000).0.len(), 4);
        tl.append(900, vec![insert("9", 9)], 1).unwrap();
        tl.verify().unwrap();
    }

    #[test]
    fn interrupted_compaction_rolls_back() {
        let dir = TempDir::new().unwrap();
        {
            let tl = open(&dir);
            tl.append(100, vec![insert("1", 1)], 1).unwrap();
            tl.append(200, vec![insert("2", 2)], 1).unwrap();
        }
        // Simulate a crash between writing temp files and renaming.
        fs::write(
            dir.path().join("users").join("segments.log.tmp"),
            b"partial",
        )
        .unwrap();

        let tl = open(&dir);
        assert_eq!(tl.commit_count(), 2);
        tl.verify().unwrap();
        assert!(!dir.path().join("users").join("segments.log.tmp").exists());
    }

    #[test]
    fn empty_commit_payload_is_legal() {
        let dir = TempDir::new().unwrap();
        let tl = open(&dir);
        let c = tl.append(100, Vec::new(), 1).unwrap();
        assert!(c.changes.is_empty());
        tl.verify().unwrap();
        assert_eq!(tl.as_of(100).0.len(), 1);
    }
}
