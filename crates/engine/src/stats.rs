//! Planner statistics handle
//!
//! The planner sees the engine only through this read-only adapter,
//! keeping the ownership graph acyclic: the engine owns storage and the
//! planner by value, and lends this borrow per planning call.

use crate::database::Engine;
use terrace_core::Timestamp;
use terrace_planner::{StatsProvider, TableStats};

pub(crate) struct EngineStatsProvider<'a> {
    pub(crate) engine: &'a Engine,
}

impl StatsProvider for EngineStatsProvider<'_> {
    fn table_stats(&self, table: &str) -> Option<TableStats> {
        let runtime = self.engine.tables.get(table)?;
        let row_count = runtime.store.live_row_count().ok()? as u64;
        Some(TableStats {
            row_count,
            total_bytes: runtime.store.logical_size(),
        })
    }

    fn latest_commit_ts(&self, table: &str) -> Option<Timestamp> {
        self.engine.tables.get(table)?.timeline.latest_timestamp()
    }

    fn index_on(&self, table: &str, column: &str) -> Option<String> {
        self.engine.tables.get(table)?.store.index_on_column(column)
    }
}
