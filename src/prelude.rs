//! Convenience re-exports for callers
//!
//! ```
//! use terracedb::prelude::*;
//! ```

pub use crate::database::Terrace;
pub use terrace_core::{
    parse_timestamp, ColumnDef, ColumnType, CommitId, Error, Record, Result, StorageMode,
    Timestamp, Value,
};
pub use terrace_engine::{AccessMode, OpenOptions, RefreshStrategy, ResultSet};
