//! Cost model
//!
//! `cost = 0.60·IO + 0.20·CPU + 0.15·TIMELINE + 0.05·NETWORK`
//!
//! - IO: per-operation base × size factor × selectivity
//! - CPU: per-operation base, +10% per WHERE predicate, +5% per parallel
//!   degree, plus the join algorithm's term
//! - TIMELINE: recency factor for time-travel reads (1.0 within the hour,
//!   1.3 within the day, 1.6 within the week, 2.0 older)
//! - NETWORK: `1.0 + 0.1·degree`, ×1.1 when parallel
//!
//! Selectivity: equality 0.01, range 0.10, LIKE 0.50, IN 0.05, unknown
//! 0.30; multiplicative across conjuncts; floored at 0.001.

use crate::join::join_cpu_cost;
use crate::plan::{JoinPlan, QueryPlan, ScanKind, ScanPlan};
use crate::query::{Predicate, PredicateOp};
use terrace_core::Timestamp;

const W_IO: f64 = 0.60;
const W_CPU: f64 = 0.20;
const W_TIMELINE: f64 = 0.15;
const W_NETWORK: f64 = 0.05;

const SELECTIVITY_FLOOR: f64 = 0.001;

const MICROS_PER_HOUR: i64 = 3_600 * 1_000_000;
const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;
const MICROS_PER_WEEK: i64 = 7 * MICROS_PER_DAY;

/// Planner-visible statistics for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableStats {
    /// Distinct live rows.
    pub row_count: u64,
    /// Logical size in bytes.
    pub total_bytes: u64,
}

/// Read-only statistics handle the engine lends to the planner.
///
/// The planner borrows this instead of holding storage or the catalog,
/// keeping the ownership graph acyclic.
pub trait StatsProvider {
    /// Statistics for `table`, if it exists.
    fn table_stats(&self, table: &str) -> Option<TableStats>;

    /// Latest commit timestamp of `table`, if it has commits.
    fn latest_commit_ts(&self, table: &str) -> Option<Timestamp>;

    /// Name of a single-column index on (`table`, `column`), if any.
    fn index_on(&self, table: &str, column: &str) -> Option<String>;
}

/// Weighted cost terms for one plan.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostBreakdown {
    /// IO term (pre-weight).
    pub io: f64,
    /// CPU term (pre-weight).
    pub cpu: f64,
    /// Timeline term (pre-weight).
    pub timeline: f64,
    /// Network term (pre-weight).
    pub network: f64,
}

impl CostBreakdown {
    /// The weighted total.
    pub fn total(&self) -> f64 {
        W_IO * self.io + W_CPU * self.cpu + W_TIMELINE * self.timeline + W_NETWORK * self.network
    }
}

/// Estimated selectivity of one predicate.
pub fn predicate_selectivity(predicate: &Predicate) -> f64 {
    match predicate.op {
        PredicateOp::Eq => 0.01,
        PredicateOp::In => 0.05,
        PredicateOp::Like => 0.50,
        op if op.is_range() => 0.10,
        _ => 0.30,
    }
}

/// Combined selectivity of a conjunction, floored.
pub fn combined_selectivity(predicates: &[Predicate]) -> f64 {
    if predicates.is_empty() {
        return 1.0;
    }
    let product: f64 = predicates.iter().map(predicate_selectivity).product();
    product.max(SELECTIVITY_FLOOR)
}

/// Cost model evaluated at a fixed "now" (for timeline recency).
#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    now: Timestamp,
}

impl CostModel {
    /// A model evaluated at `now`.
    pub fn new(now: Timestamp) -> Self {
        Self { now }
    }

    fn size_factor(rows: u64) -> f64 {
        ((rows + 1) as f64).log10().max(1.0)
    }

    fn io_base(kind: &ScanKind) -> f64 {
        match kind {
            ScanKind::Index { .. } => 0.3,
            ScanKind::Table => 1.0,
            ScanKind::Timeline { .. } => 1.5,
            ScanKind::Incremental { .. } => 0.2,
            ScanKind::Parallel { .. } => 0.8,
        }
    }

    fn cpu_base(kind: &ScanKind) -> f64 {
        match kind {
            ScanKind::Index { .. } => 0.2,
            ScanKind::Table => 0.5,
            ScanKind::Timeline { .. } => 0.6,
            ScanKind::Incremental { .. } => 0.15,
            ScanKind::Parallel { .. } => 0.5,
        }
    }

    fn timeline_factor(&self, as_of: Timestamp) -> f64 {
        let age = self.now.saturating_sub(as_of);
        if age <= MICROS_PER_HOUR {
            1.0
        } else if age <= MICROS_PER_DAY {
            1.3
        } else if age <= MICROS_PER_WEEK {
            1.6
        } else {
            2.0
        }
    }

    /// Cost a single-table scan given the table's row count.
    pub fn scan_cost(&self, plan: &ScanPlan, rows: u64) -> CostBreakdown {
        let selectivity = combined_selectivity(&plan.predicates);
        let degree = match plan.kind {
            ScanKind::Parallel { degree } => degree,
            _ => 0,
        };

        let io = Self::io_base(&plan.kind) * Self::size_factor(rows) * selectivity;
        let mut cpu = Self::cpu_base(&plan.kind);
        cpu *= 1.0 + 0.10 * plan.predicates.len() as f64;
        cpu *= 1.0 + 0.05 * degree as f64;

        let timeline = match plan.kind {
            ScanKind::Timeline { as_of } => self.timeline_factor(as_of),
            _ => 0.0,
        };

        let mut network = 1.0 + 0.1 * degree as f64;
        if degree > 0 {
            network *= 1.1;
        }

        CostBreakdown {
            io,
            cpu,
            timeline,
            network,
        }
    }

    /// Cost a join: both inputs plus the algorithm's CPU term.
    pub fn join_cost(&self, plan: &JoinPlan, left_rows: u64, right_rows: u64) -> CostBreakdown {
        let left = self.scan_cost(&plan.left, left_rows);
        let right = self.scan_cost(&plan.right, right_rows);
        CostBreakdown {
            io: left.io + right.io,
            cpu: left.cpu + right.cpu + join_cpu_cost(plan.algorithm, left_rows, right_rows),
            timeline: left.timeline + right.timeline,
            network: left.network.max(right.network),
        }
    }

    /// Cost an arbitrary plan, given a row-count lookup.
    pub fn plan_cost(&self, plan: &QueryPlan, rows_of: impl Fn(&str) -> u64) -> f64 {
        match plan {
            QueryPlan::Scan(scan) => self.scan_cost(scan, rows_of(&scan.table)).total(),
            QueryPlan::Join(join) => self
                .join_cost(join, rows_of(&join.left.table), rows_of(&join.right.table))
                .total(),
            // Reading the precomputed view is the cheap index-like path.
            QueryPlan::ViewScan { .. } => {
                CostBreakdown {
                    io: 0.3,
                    cpu: 0.2,
                    timeline: 0.0,
                    network: 1.0,
                }
                .total()
            }
        }
    }
}
