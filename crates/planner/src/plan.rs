//! Physical plan nodes
//!
//! The plan space is a closed dispatch set: five scan kinds, three join
//! algorithms, and the materialized-view rewrite. The engine's executor
//! matches exhaustively over these — there is no open-ended operator
//! registry.

use crate::query::{JoinShape, Predicate, Projection};
use serde::{Deserialize, Serialize};
use terrace_core::{Timestamp, Value};

/// How a base table is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScanKind {
    /// Full scan of the visible rows.
    Table,
    /// Point lookup through a secondary index.
    Index {
        /// Index name.
        index: String,
        /// Indexed column.
        column: String,
        /// Equality value.
        value: Value,
    },
    /// Full scan split across a bounded worker pool.
    Parallel {
        /// Worker degree chosen by the planner.
        degree: usize,
    },
    /// Historical scan at a time-travel timestamp.
    Timeline {
        /// The as-of timestamp.
        as_of: Timestamp,
    },
    /// Changes after a watermark, for incremental consumers.
    Incremental {
        /// Exclusive lower bound.
        watermark: Timestamp,
    },
}

/// A single-table scan plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPlan {
    /// Table to read.
    pub table: String,
    /// Access path.
    pub kind: ScanKind,
    /// Residual predicates applied after the access path.
    pub predicates: Vec<Predicate>,
    /// Output columns.
    pub projection: Projection,
}

/// Join algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinAlgorithm {
    /// Works for any condition; quadratic.
    NestedLoop,
    /// Equi-join via a hash table built on the smaller side.
    Hash {
        /// Whether the build side is the left input.
        build_left: bool,
    },
    /// Equi-join over both inputs sorted on the join key.
    Merge,
}

/// A two-table join plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPlan {
    /// Left input.
    pub left: ScanPlan,
    /// Right input.
    pub right: ScanPlan,
    /// Join condition.
    pub on: JoinShape,
    /// Selected algorithm.
    pub algorithm: JoinAlgorithm,
    /// Output columns (qualified).
    pub projection: Projection,
}

/// A complete query plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryPlan {
    /// Single-table read.
    Scan(ScanPlan),
    /// Two-table join.
    Join(JoinPlan),
    /// Rewritten to read a materialized view.
    ViewScan {
        /// View name.
        view: String,
        /// Output columns.
        projection: Projection,
    },
}

impl QueryPlan {
    /// One-line description for logs and EXPLAIN-style diagnostics.
    pub fn describe(&self) -> String {
        match self {
            QueryPlan::Scan(scan) => match &scan.kind {
                ScanKind::Table => format!("table_scan({})", scan.table),
                ScanKind::Index { index, column, .. } => {
                    format!("index_scan({} via {} on {})", scan.table, index, column)
                }
                ScanKind::Parallel { degree } => {
                    format!("parallel_scan({}, degree={})", scan.table, degree)
                }
                ScanKind::Timeline { as_of } => {
                    format!("timeline_scan({} as_of={})", scan.table, as_of)
                }
                ScanKind::Incremental { watermark } => {
                    format!("incremental_scan({} since={})", scan.table, watermark)
                }
            },
            QueryPlan::Join(join) => {
                let name = match join.algorithm {
                    JoinAlgorithm::NestedLoop => "nested_loop_join",
                    JoinAlgorithm::Hash { .. } => "hash_join",
                    JoinAlgorithm::Merge => "merge_join",
                };
                format!(
                    "{}({} ⋈ {} on {}={})",
                    name,
                    join.left.table,
                    join.right.table,
                    join.on.left_column,
                    join.on.right_column
                )
            }
            QueryPlan::ViewScan { view, .. } => format!("materialized_view_scan({})", view),
        }
    }
}
