//! Cost-based query planner for Terrace
//!
//! Given a canonicalized query shape, the planner enumerates candidate
//! plans (table scan, index scan, parallel scan, timeline scan,
//! incremental scan; nested-loop, hash, and merge joins), prices them with
//! a weighted cost model, rewrites to materialized views when the
//! normalized text matches and the view is fresh, and serves repeated
//! queries from a bounded LRU result cache.
//!
//! Statistics come through the read-only [`StatsProvider`] handle — the
//! planner never holds the storage layer directly.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod cost;
pub mod join;
pub mod plan;
pub mod planner;
pub mod query;
pub mod result;
pub mod view;

pub use cache::{cache_key, CacheStats, ResultCache};
pub use cost::{CostBreakdown, CostModel, StatsProvider, TableStats};
pub use join::select_join_algorithm;
pub use plan::{JoinAlgorithm, JoinPlan, QueryPlan, ScanKind, ScanPlan};
pub use planner::{PlanDecision, Planner, PlannerContext};
pub use query::{
    canonicalize, parse_query, JoinShape, Predicate, PredicateOp, Projection, QueryShape,
};
pub use result::ResultSet;
pub use view::{MaterializedView, RefreshStrategy, ViewRegistry};
