//! Error types for the Terrace engine
//!
//! One `thiserror`-derived enum covers every layer. Conflicts and schema
//! violations are normal outcomes surfaced to the caller; integrity
//! failures are fatal to the affected read; transient I/O is retried once
//! inside the blob layer before surfacing as `Storage`.

use crate::types::Timestamp;
use std::io;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Terrace engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Table, column, index, snapshot, or view does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Entity already exists (table, index, snapshot, or view name taken).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Write-write conflict at commit: another transaction committed the
    /// key after this transaction started. First writer wins; the later
    /// committer receives this error and is aborted.
    #[error("write-write conflict on {key}: committed at {committed_ts}")]
    Conflict {
        /// The contested key, rendered as `table/row`.
        key: String,
        /// Commit timestamp of the competing transaction.
        committed_ts: Timestamp,
    },

    /// Operation cancelled via its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Operation exceeded its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Record violates column type or nullability.
    #[error("schema mismatch on column {column}: {reason}")]
    SchemaMismatch {
        /// The offending column.
        column: String,
        /// What was violated.
        reason: String,
    },

    /// Schema evolution is not backward-compatible and requires an
    /// explicit migration.
    #[error("breaking schema change: {0}")]
    BreakingChange(String),

    /// CRC or Merkle mismatch detected on read. Fatal to the affected
    /// read; a repair advisory is logged at the detection site.
    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    /// Underlying storage failure that persisted past the retry.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error from the filesystem layer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration, surfaced at initialization.
    #[error("config error: {0}")]
    Config(String),

    /// Operation not valid in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Whether this error is a commit conflict.
    ///
    /// Conflicts are normal outcomes under first-writer-wins; callers that
    /// want retry semantics key off this predicate. No retry is automatic.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Whether the operation was cut short by cancellation or deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }

    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. } | Error::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_identifiers() {
        let err = Error::NotFound("users".to_string());
        assert!(err.to_string().contains("users"));

        let err = Error::Conflict {
            key: "users/1".to_string(),
            committed_ts: 42,
        };
        assert!(err.to_string().contains("users/1"));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn conflict_predicates() {
        let conflict = Error::Conflict {
            key: "t/k".to_string(),
            committed_ts: 1,
        };
        assert!(conflict.is_conflict());
        assert!(conflict.is_retryable());
        assert!(!conflict.is_cancellation());
        assert!(!Error::NotFound("x".into()).is_conflict());
    }

    #[test]
    fn cancellation_predicates() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(Error::DeadlineExceeded.is_cancellation());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn bincode_error_converts() {
        let bad = [0xFFu8; 2];
        let result: std::result::Result<String, bincode::Error> = bincode::deserialize(&bad);
        let err: Error = result.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
