//! Blob/block I/O abstraction
//!
//! The timeline and the block store persist through `BlobStore` rather than
//! touching the filesystem directly, which keeps the storage substrate
//! swappable and concentrates the transient-failure retry policy in one
//! place: a single retry with a short backoff, then surface.

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::warn;

const RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Keyed byte-blob storage.
///
/// Keys are relative slash-separated paths (`blocks/users/hot-...`).
/// Implementations must be safe for concurrent use.
pub trait BlobStore: Send + Sync {
    /// Write a blob atomically, replacing any existing content.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Read a blob in full.
    ///
    /// # Errors
    ///
    /// `NotFound` if no blob exists at `key`.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Whether a blob exists at `key`.
    fn exists(&self, key: &str) -> bool;

    /// Keys under `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete a blob. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// Filesystem-backed blob store rooted at the database directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.split('/').any(|seg| seg.is_empty() || seg == "..") {
            return Err(Error::InvalidOperation(format!("bad blob key: {:?}", key)));
        }
        Ok(self.root.join(key))
    }

    // One retry with backoff for transient failures, then surface.
    fn retry_io<T>(&self, key: &str, mut op: impl FnMut() -> io::Result<T>) -> Result<T> {
        match op() {
            Ok(v) => Ok(v),
            Err(first) if first.kind() == io::ErrorKind::NotFound => {
                Err(Error::NotFound(key.to_string()))
            }
            Err(first) => {
                warn!(target: "terrace::blob", key, error = %first, "I/O failed, retrying once");
                thread::sleep(RETRY_BACKOFF);
                op().map_err(|second| Error::Storage(format!("{}: {}", key, second)))
            }
        }
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        self.retry_io(key, || {
            fs::write(&tmp, bytes)?;
            fs::rename(&tmp, &path)
        })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        self.retry_io(key, || fs::read(&path))
    }

    fn exists(&self, key: &str) -> bool {
        self.resolve(key).map(|p| p.exists()).unwrap_or(false)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let name = entry.file_name().to_string_lossy().into_owned();
                // Abandoned temp files from interrupted writes are not data.
                if name.ends_with(".tmp") {
                    continue;
                }
                keys.push(format!("{}/{}", prefix, name));
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("{}: {}", key, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        store.put("blocks/t/a.blk", b"hello").unwrap();
        assert_eq!(store.get("blocks/t/a.blk").unwrap(), b"hello");
        assert!(store.exists("blocks/t/a.blk"));
    }

    #[test]
    fn missing_blob_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        assert!(matches!(store.get("nope"), Err(Error::NotFound(_))));
        assert!(!store.exists("nope"));
    }

    #[test]
    fn list_is_sorted_and_skips_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        store.put("blocks/t/b.blk", b"2").unwrap();
        store.put("blocks/t/a.blk", b"1").unwrap();
        fs::write(dir.path().join("blocks/t/orphan.tmp"), b"junk").unwrap();

        let keys = store.list("blocks/t").unwrap();
        assert_eq!(keys, vec!["blocks/t/a.blk", "blocks/t/b.blk"]);
    }

    #[test]
    fn list_missing_prefix_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        assert!(store.list("blocks/none").unwrap().is_empty());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        store.put("x", b"1").unwrap();
        store.delete("x").unwrap();
        store.delete("x").unwrap();
        assert!(!store.exists("x"));
    }

    #[test]
    fn traversal_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        assert!(store.put("../escape", b"x").is_err());
        assert!(store.put("", b"x").is_err());
        assert!(store.put("a//b", b"x").is_err());
    }

    #[test]
    fn put_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        store.put("k", b"old").unwrap();
        store.put("k", b"new").unwrap();
        assert_eq!(store.get("k").unwrap(), b"new");
    }
}
