//! Plan selection
//!
//! Candidate generation and cost ranking. Failures never surface to the
//! caller: a query the recognizer cannot shape, or a statistics gap,
//! degrades to a safe full table scan.

use crate::cache::ResultCache;
use crate::cost::{CostModel, StatsProvider};
use crate::join::select_join_algorithm;
use crate::plan::{JoinPlan, QueryPlan, ScanKind, ScanPlan};
use crate::query::{canonicalize, parse_query, PredicateOp, Projection, QueryShape};
use crate::view::{RefreshStrategy, ViewRegistry};
use terrace_core::Timestamp;
use tracing::{debug, warn};

/// Inputs the engine lends to one planning call.
pub struct PlannerContext<'a> {
    /// Read-only statistics handle.
    pub stats: &'a dyn StatsProvider,
    /// Time-travel timestamp, if the caller asked for one.
    pub as_of: Option<Timestamp>,
    /// Incremental watermark, if the caller asked for one.
    pub watermark: Option<Timestamp>,
    /// Current time, for timeline recency costing.
    pub now: Timestamp,
    /// Row count above which a parallel scan is considered.
    pub parallel_threshold_rows: u64,
    /// Ceiling on the parallel degree.
    pub max_parallel_degree: usize,
}

/// The planner's answer for one query.
#[derive(Debug, Clone)]
pub struct PlanDecision {
    /// Selected plan.
    pub plan: QueryPlan,
    /// Its modeled cost.
    pub cost: f64,
    /// Recognized shape; `None` means the recognizer bailed and the plan
    /// is the fallback scan.
    pub shape: Option<QueryShape>,
    /// An incremental view that must be refreshed before the plan's view
    /// scan is sound.
    pub refresh_view: Option<String>,
}

/// Cost-based plan selector with its view registry and result cache.
pub struct Planner {
    views: ViewRegistry,
    cache: ResultCache,
}

impl Planner {
    /// Create a planner with the given result-cache bounds.
    pub fn new(cache_max_entries: usize, cache_max_age_micros: i64) -> Self {
        Self {
            views: ViewRegistry::new(),
            cache: ResultCache::new(cache_max_entries, cache_max_age_micros),
        }
    }

    /// The materialized-view registry.
    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    /// The result cache.
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Choose a plan for `text` against `table`.
    pub fn plan(&self, table: &str, text: &str, ctx: &PlannerContext<'_>) -> PlanDecision {
        let canonical = canonicalize(text);
        let shape = match parse_query(&canonical) {
            Ok(shape) => shape,
            Err(e) => {
                warn!(
                    target: "terrace::planner",
                    table,
                    error = %e,
                    "query outside the recognized shape; falling back to table scan"
                );
                return self.fallback(table, ctx);
            }
        };

        // Materialized-view rewrite applies only to present-time reads.
        if ctx.as_of.is_none() && ctx.watermark.is_none() {
            if let Some(view) = self.views.find_rewrite(&canonical) {
                let latest = ctx.stats.latest_commit_ts(&view.table);
                let fresh = view.is_fresh(latest);
                match (fresh, view.strategy) {
                    (true, _) => {
                        let plan = QueryPlan::ViewScan {
                            view: view.name.clone(),
                            projection: shape.projection.clone(),
                        };
                        let model = CostModel::new(ctx.now);
                        let cost = model.plan_cost(&plan, |t| self.rows_of(ctx, t));
                        debug!(target: "terrace::planner", view = %view.name, "rewrite to fresh view");
                        return PlanDecision {
                            plan,
                            cost,
                            shape: Some(shape),
                            refresh_view: None,
                        };
                    }
                    (false, RefreshStrategy::Incremental) => {
                        let plan = QueryPlan::ViewScan {
                            view: view.name.clone(),
                            projection: shape.projection.clone(),
                        };
                        let model = CostModel::new(ctx.now);
                        let cost = model.plan_cost(&plan, |t| self.rows_of(ctx, t));
                        debug!(
                            target: "terrace::planner",
                            view = %view.name,
                            "stale incremental view; refresh before scan"
                        );
                        return PlanDecision {
                            plan,
                            cost,
                            shape: Some(shape),
                            refresh_view: Some(view.name),
                        };
                    }
                    // A stale full-refresh view refuses the rewrite.
                    (false, RefreshStrategy::Full) => {
                        debug!(target: "terrace::planner", view = %view.name, "stale full view; rewrite refused");
                    }
                }
            }
        }

        if shape.join.is_some() {
            return self.plan_join(&shape, ctx);
        }
        self.plan_single(&shape, ctx)
    }

    fn rows_of(&self, ctx: &PlannerContext<'_>, table: &str) -> u64 {
        ctx.stats
            .table_stats(table)
            .map(|s| s.row_count)
            .unwrap_or(0)
    }

    fn fallback(&self, table: &str, ctx: &PlannerContext<'_>) -> PlanDecision {
        let kind = match (ctx.as_of, ctx.watermark) {
            (Some(as_of), _) => ScanKind::Timeline { as_of },
            (None, Some(watermark)) => ScanKind::Incremental { watermark },
            (None, None) => ScanKind::Table,
        };
        let plan = QueryPlan::Scan(ScanPlan {
            table: table.to_string(),
            kind,
            predicates: Vec::new(),
            projection: Projection::Star,
        });
        let model = CostModel::new(ctx.now);
        let cost = model.plan_cost(&plan, |t| self.rows_of(ctx, t));
        PlanDecision {
            plan,
            cost,
            shape: None,
            refresh_view: None,
        }
    }

    fn plan_single(&self, shape: &QueryShape, ctx: &PlannerContext<'_>) -> PlanDecision {
        let model = CostModel::new(ctx.now);
        let rows = self.rows_of(ctx, &shape.table);

        // Time travel and change feeds fix the access path; costing still
        // reports what the read will spend.
        if let Some(as_of) = ctx.as_of {
            return self.decide(shape, ScanKind::Timeline { as_of }, &model, rows);
        }
        if let Some(watermark) = ctx.watermark {
            return self.decide(shape, ScanKind::Incremental { watermark }, &model, rows);
        }

        let mut candidates = vec![ScanKind::Table];
        for predicate in &shape.predicates {
            if predicate.op == PredicateOp::Eq {
                if let Some(index) = ctx.stats.index_on(&shape.table, &predicate.column) {
                    if let Some(value) = predicate.values.first() {
                        candidates.push(ScanKind::Index {
                            index,
                            column: predicate.column.clone(),
                            value: value.clone(),
                        });
                    }
                }
            }
        }
        if rows > ctx.parallel_threshold_rows && ctx.max_parallel_degree > 1 {
            candidates.push(ScanKind::Parallel {
                degree: ctx.max_parallel_degree,
            });
        }

        let mut best: Option<PlanDecision> = None;
        for kind in candidates {
            let decision = self.decide(shape, kind, &model, rows);
            match &best {
                Some(current) if current.cost <= decision.cost => {}
                _ => best = Some(decision),
            }
        }
        best.expect("candidate list is never empty")
    }

    fn decide(
        &self,
        shape: &QueryShape,
        kind: ScanKind,
        model: &CostModel,
        rows: u64,
    ) -> PlanDecision {
        let scan = ScanPlan {
            table: shape.table.clone(),
            kind,
            predicates: shape.predicates.clone(),
            projection: shape.projection.clone(),
        };
        let cost = model.scan_cost(&scan, rows).total();
        PlanDecision {
            plan: QueryPlan::Scan(scan),
            cost,
            shape: Some(shape.clone()),
            refresh_view: None,
        }
    }

    fn plan_join(&self, shape: &QueryShape, ctx: &PlannerContext<'_>) -> PlanDecision {
        let join = shape.join.clone().expect("caller checked the join");
        let model = CostModel::new(ctx.now);
        let left_rows = self.rows_of(ctx, &join.left_table);
        let right_rows = self.rows_of(ctx, &join.right_table);

        let algorithm = select_join_algorithm(join.is_equi(), left_rows, right_rows);
        let plan = JoinPlan {
            left: ScanPlan {
                table: join.left_table.clone(),
                kind: ScanKind::Table,
                predicates: Vec::new(),
                projection: Projection::Star,
            },
            right: ScanPlan {
                table: join.right_table.clone(),
                kind: ScanKind::Table,
                predicates: Vec::new(),
                projection: Projection::Star,
            },
            on: join,
            algorithm,
            projection: shape.projection.clone(),
        };
        let cost = model.join_cost(&plan, left_rows, right_rows).total();
        debug!(
            target: "terrace::planner",
            plan = %QueryPlan::Join(plan.clone()).describe(),
            cost,
            "join planned"
        );
        PlanDecision {
            plan: QueryPlan::Join(plan),
            cost,
            shape: Some(shape.clone()),
            refresh_view: None,
        }
    }
}
