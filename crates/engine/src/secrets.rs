//! Sealed secret records
//!
//! Opaque named secrets stored under `secrets/`. Records are sealed with
//! a SHA-256 keystream derived from a per-database key file and encoded
//! as base64; the engine treats the contents as opaque bytes.

use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use terrace_core::{Error, Result};
use uuid::Uuid;

const KEY_FILE: &str = ".keyring";

/// Store of sealed secret records.
pub struct SecretStore {
    dir: PathBuf,
    key: [u8; 32],
}

impl SecretStore {
    /// Open the store under `dir`, creating the key file on first use.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let key_path = dir.join(KEY_FILE);
        let key = if key_path.exists() {
            let bytes = fs::read(&key_path)?;
            let mut key = [0u8; 32];
            if bytes.len() != 32 {
                return Err(Error::IntegrityFailure("secret key file malformed".into()));
            }
            key.copy_from_slice(&bytes);
            key
        } else {
            let seed = Uuid::new_v4();
            let mut hasher = Sha256::new();
            hasher.update(seed.as_bytes());
            hasher.update(b"terrace-secret-key");
            let digest = hasher.finalize();
            let mut key = [0u8; 32];
            key.copy_from_slice(&digest);
            fs::write(&key_path, key)?;
            key
        };
        Ok(Self { dir, key })
    }

    fn keystream_xor(&self, name: &str, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        for (block_idx, chunk) in data.chunks(32).enumerate() {
            let mut hasher = Sha256::new();
            hasher.update(self.key);
            hasher.update(name.as_bytes());
            hasher.update((block_idx as u64).to_le_bytes());
            let pad = hasher.finalize();
            out.extend(chunk.iter().zip(pad.iter()).map(|(b, p)| b ^ p));
        }
        out
    }

    fn record_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(Error::InvalidOperation(format!("bad secret name {:?}", name)));
        }
        Ok(self.dir.join(format!("{}.sec", name)))
    }

    /// Seal and store a secret.
    pub fn put(&self, name: &str, value: &[u8]) -> Result<()> {
        let sealed = self.keystream_xor(name, value);
        let encoded = base64::engine::general_purpose::STANDARD.encode(sealed);
        fs::write(self.record_path(name)?, encoded)?;
        Ok(())
    }

    /// Fetch and unseal a secret.
    pub fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.record_path(name)?;
        if !path.exists() {
            return Err(Error::NotFound(format!("secret {}", name)));
        }
        let encoded = fs::read_to_string(&path)?;
        let sealed = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::IntegrityFailure(format!("secret {}: {}", name, e)))?;
        Ok(self.keystream_xor(name, &sealed))
    }

    /// Remove a secret. Removing a missing one is not an error.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.record_path(name)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Names of stored secrets, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file = entry.file_name().to_string_lossy().into_owned();
            if let Some(name) = file.strip_suffix(".sec") {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
