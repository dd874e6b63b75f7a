//! Core types for the Terrace lakehouse engine
//!
//! This crate defines the vocabulary shared by every layer:
//! - Value: unified sum type for column data
//! - Record: ordered column-to-value mapping
//! - TableSchema / SchemaCatalog: versioned table schemas
//! - Error / Result: unified error handling
//! - Clock: injectable time source (real wall-clock or manual for tests)
//! - EngineConfig: configuration loaded from `terrace.toml`
//! - CancelContext: cancellation and deadline propagation
//! - BlobStore: block/blob I/O abstraction over the database directory
//!
//! Layering: core has no knowledge of transactions, the timeline, tiers,
//! or the planner. Upper crates depend on core, never the reverse.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blob;
pub mod cancel;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod record;
pub mod schema;
pub mod types;
pub mod value;

pub use blob::{BlobStore, FsBlobStore};
pub use cancel::{CancelContext, CancelToken};
pub use catalog::{SchemaCatalog, SchemaRevision};
pub use clock::{parse_timestamp, Clock, ManualClock, SystemClock};
pub use config::{DurabilityLevel, EngineConfig};
pub use error::{Error, Result};
pub use record::Record;
pub use schema::{ColumnDef, ColumnType, StorageMode, TableSchema};
pub use types::{CommitId, Key, Timestamp, Watermark};
pub use value::Value;
