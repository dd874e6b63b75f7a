//! Merkle chain rules
//!
//! `root_i = SHA256(root_{i-1} ‖ canonical_payload_i ‖ schema_version_i)`
//!
//! The canonical payload is the bincode encoding of the ordered change
//! list. Records hold their columns in a `BTreeMap`, so the encoding is
//! deterministic; equal logical payloads always hash to equal roots.

use crate::commit::{ChangeDescriptor, Commit};
use sha2::{Digest, Sha256};
use terrace_core::{CommitId, Error, Result};

/// Deterministic byte encoding of a commit's change list.
pub fn canonical_payload(changes: &[ChangeDescriptor]) -> Result<Vec<u8>> {
    Ok(bincode::serialize(changes)?)
}

/// Compute a commit root from its parent root, payload bytes, and schema
/// version.
pub fn compute_root(parent: &CommitId, payload: &[u8], schema_version: u32) -> CommitId {
    let mut hasher = Sha256::new();
    hasher.update(parent.as_bytes());
    hasher.update(payload);
    hasher.update(schema_version.to_le_bytes());
    let digest = hasher.finalize();
    let mut root = [0u8; 32];
    root.copy_from_slice(&digest);
    CommitId(root)
}

/// Verify that a commit's stored id matches its recomputed root.
pub fn verify_commit(commit: &Commit) -> Result<()> {
    let payload = canonical_payload(&commit.changes)?;
    let expected = compute_root(&commit.parent, &payload, commit.schema_version);
    if expected != commit.id {
        return Err(Error::IntegrityFailure(format!(
            "commit {} on table {}: stored root does not match recomputed root {}",
            commit.id.short(),
            commit.table,
            expected.short()
        )));
    }
    Ok(())
}

/// Verify parent links and roots across a contiguous run of commits.
///
/// `expected_parent` anchors the first commit — genesis for a fresh table,
/// or the end root of the preceding compacted segment.
pub fn verify_chain(commits: &[Commit], expected_parent: CommitId) -> Result<()> {
    let mut parent = expected_parent;
    for commit in commits {
        if commit.parent != parent {
            return Err(Error::IntegrityFailure(format!(
                "commit {} on table {}: parent {} does not link to {}",
                commit.id.short(),
                commit.table,
                commit.parent.short(),
                parent.short()
            )));
        }
        verify_commit(commit)?;
        parent = commit.id;
    }
    Ok(())
}
