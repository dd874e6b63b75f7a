//! Transaction and concurrency core for Terrace
//!
//! Multi-version timestamped transactions with snapshot isolation:
//! - TimestampOracle: single global monotonic counter
//! - VersionStore: per-key version chains with tombstones and GC
//! - TransactionContext: private read/write sets and the status machine
//! - TransactionManager: begin/read/validate/install with
//!   first-writer-wins conflict resolution at commit
//! - SnapshotRegistry: named persistent snapshots and the GC floor

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod oracle;
pub mod snapshot;
pub mod transaction;
pub mod version_store;

pub use manager::{TransactionManager, TxnMetrics};
pub use oracle::TimestampOracle;
pub use snapshot::{SnapshotRecord, SnapshotRegistry};
pub use transaction::{TransactionContext, TxnStatus};
pub use version_store::{VersionChain, VersionEntry, VersionStore};
