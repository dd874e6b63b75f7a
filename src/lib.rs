//! # TerraceDB
//!
//! An embedded transactional lakehouse engine: ACID table operations,
//! columnar tiered persistence, time-travel queries, and incremental
//! change processing.
//!
//! # Quick Start
//!
//! ```no_run
//! use terracedb::prelude::*;
//!
//! fn main() -> terracedb::Result<()> {
//!     let db = Terrace::open("./my-data")?;
//!
//!     db.create_table(
//!         "users",
//!         vec![
//!             ColumnDef::new("id", ColumnType::Int, false),
//!             ColumnDef::new("name", ColumnType::String, false),
//!         ],
//!         StorageMode::Hybrid,
//!     )?;
//!
//!     db.insert(
//!         "users",
//!         vec![Record::from([("id", Value::Int(1)), ("name", Value::String("A".into()))])],
//!     )?;
//!
//!     let result = db.query("users", "SELECT name FROM users WHERE id = 1")?;
//!     assert_eq!(result.rows.len(), 1);
//!
//!     // Time travel: the table as it was at an earlier timestamp.
//!     let then = parse_timestamp("2024-01-01T00:00:00Z")?;
//!     let _historical = db.query_as_of("users", then, "SELECT * FROM users")?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The [`Terrace`] struct is the main entry point; all operations go
//! through it. Underneath sit four subsystems, owned by the engine by
//! value:
//!
//! | Subsystem | Crate | Job |
//! |-----------|-------|-----|
//! | Transaction core | `terrace-concurrency` | timestamped MVCC, snapshot isolation, first-writer-wins |
//! | Merkle timeline | `terrace-timeline` | hash-chained commit log, time travel, segment compaction |
//! | Hybrid storage | `terrace-storage` | tiered CoW/MoR blocks, adaptive placement, indexes |
//! | Query planner | `terrace-planner` | cost-based plan selection, MV rewrite, result cache |
//!
//! Internal crates are not exposed; only the surface in this crate is
//! stable.

pub mod database;
pub mod prelude;

pub use database::Terrace;

pub use terrace_concurrency::{SnapshotRecord, TransactionContext};
pub use terrace_core::{
    parse_timestamp, Clock, ColumnDef, ColumnType, CommitId, EngineConfig, Error, ManualClock,
    Record, Result, StorageMode, SystemClock, Timestamp, Value, Watermark,
};
pub use terrace_engine::{
    AccessMode, ChangeGroup, ChangeSet, EngineMetrics, OpenOptions, RefreshStrategy, ResultSet,
};
pub use terrace_storage::{Tier, TierUsage};
pub use terrace_timeline::ChangeDescriptor;
