//! Engine facade for Terrace
//!
//! [`Engine`] is the coordinator that owns every subsystem by value: the
//! schema catalog, per-table hybrid stores and timelines, the transaction
//! manager, the snapshot registry, the planner, and the memory manager.
//! The planner borrows read-only statistics handles; nothing holds a
//! reference back into the engine.
//!
//! One directory on disk is one database:
//!
//! ```text
//! <root>/
//!   terrace.toml       engine configuration
//!   schema/            schema catalog (canonical JSON)
//!   timeline/<table>/  framed commit records + segments
//!   blocks/<table>/    data block files (name encodes tier)
//!   index/<table>/     index metadata
//!   snapshots/         snapshot descriptors
//!   secrets/           sealed secret records
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod changes;
mod coordinator;
pub mod database;
mod executor;
pub mod memory;
pub mod open_options;
pub mod secrets;
mod stats;

pub use changes::{ChangeGroup, ChangeSet};
pub use database::{Engine, EngineMetrics};
pub use memory::{MemoryManager, MemoryReport, MemoryReservation, PoolKind};
pub use open_options::{AccessMode, OpenOptions};
pub use secrets::SecretStore;

// The facade's callers speak these types.
pub use terrace_core::{
    ColumnDef, ColumnType, EngineConfig, Error, Record, Result, StorageMode, Timestamp, Value,
};
pub use terrace_planner::{RefreshStrategy, ResultSet};
