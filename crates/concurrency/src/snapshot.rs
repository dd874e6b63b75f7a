//! Named snapshot registry
//!
//! A snapshot pins a timestamp: readers resolve per-key visibility through
//! the version store at that timestamp, so the descriptor itself stays
//! O(1). Descriptors persist as JSON files under `snapshots/` and survive
//! restarts; releasing a snapshot deletes its file.
//!
//! The oldest live snapshot is the floor for version-store GC and
//! timeline compaction.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use terrace_core::{Error, Result, Timestamp};
use tracing::{debug, info};

/// A named, persistable snapshot descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Caller-chosen snapshot id.
    pub id: String,
    /// Timestamp whose visible versions the snapshot captures.
    pub timestamp: Timestamp,
    /// When the snapshot was created.
    pub created_at: Timestamp,
}

/// Registry of live snapshots.
pub struct SnapshotRegistry {
    dir: PathBuf,
    snapshots: RwLock<BTreeMap<String, SnapshotRecord>>,
}

impl SnapshotRegistry {
    /// Load descriptors from `dir`, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let mut snapshots = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path)?;
            let record: SnapshotRecord = serde_json::from_slice(&bytes)?;
            snapshots.insert(record.id.clone(), record);
        }
        Ok(Self {
            dir,
            snapshots: RwLock::new(snapshots),
        })
    }

    /// Create a snapshot pinned at `timestamp`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the id is taken.
    pub fn create(&self, id: &str, timestamp: Timestamp, now: Timestamp) -> Result<SnapshotRecord> {
        let record = SnapshotRecord {
            id: id.to_string(),
            timestamp,
            created_at: now,
        };
        {
            let mut snapshots = self.snapshots.write();
            if snapshots.contains_key(id) {
                return Err(Error::AlreadyExists(format!("snapshot {}", id)));
            }
            snapshots.insert(id.to_string(), record.clone());
        }
        let bytes = serde_json::to_vec_pretty(&record)?;
        fs::write(self.descriptor_path(id), bytes)?;
        debug!(target: "terrace::snapshot", id, timestamp, "snapshot created");
        Ok(record)
    }

    /// Fetch a snapshot by id.
    pub fn get(&self, id: &str) -> Result<SnapshotRecord> {
        self.snapshots
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("snapshot {}", id)))
    }

    /// Release a snapshot, unpinning its timestamp.
    pub fn release(&self, id: &str) -> Result<()> {
        {
            let mut snapshots = self.snapshots.write();
            if snapshots.remove(id).is_none() {
                return Err(Error::NotFound(format!("snapshot {}", id)));
            }
        }
        let path = self.descriptor_path(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        debug!(target: "terrace::snapshot", id, "snapshot released");
        Ok(())
    }

    /// All live snapshots, ordered by id.
    pub fn list(&self) -> Vec<SnapshotRecord> {
        self.snapshots.read().values().cloned().collect()
    }

    /// The smallest pinned timestamp, if any snapshot is live. GC and
    /// timeline compaction must not cross this floor.
    pub fn oldest_live_ts(&self) -> Option<Timestamp> {
        self.snapshots.read().values().map(|s| s.timestamp).min()
    }

    /// Release snapshots older than the retention window. Returns the ids
    /// released.
    pub fn sweep_expired(&self, retention_micros: i64, now: Timestamp) -> Result<Vec<String>> {
        let cutoff = now.saturating_sub(retention_micros);
        let expired: Vec<String> = self
            .snapshots
            .read()
            .values()
            .filter(|s| s.created_at < cutoff)
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            self.release(id)?;
            info!(target: "terrace::snapshot", id, "snapshot expired by retention");
        }
        Ok(expired)
    }

    fn descriptor_path(&self, id: &str) -> PathBuf {
        // Snapshot ids become file names; keep them path-safe.
        let safe: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}
