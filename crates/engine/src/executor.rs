//! Plan execution
//!
//! Executes the planner's closed operator set against storage, the
//! timeline, and the view registry. Every scan loop passes a cancellation
//! check point; parallel scans run on the engine's bounded worker pool at
//! the planner-selected degree.

use crate::database::Engine;
use crate::memory::PoolKind;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::collections::HashMap;
use terrace_core::{CancelContext, Error, Record, Result, Timestamp, Value};
use terrace_planner::{
    JoinAlgorithm, JoinPlan, PlanDecision, Predicate, Projection, QueryPlan, ResultSet, ScanKind,
    ScanPlan,
};
use terrace_timeline::{ChangeDescriptor, TimelineEntry};

/// Approximate per-row working-memory charge for pool accounting.
const ROW_MEMORY_BYTES: u64 = 96;

pub(crate) fn execute_plan(
    engine: &Engine,
    decision: &PlanDecision,
    cancel: &CancelContext,
) -> Result<ResultSet> {
    cancel.check()?;
    match &decision.plan {
        QueryPlan::Scan(scan) => execute_scan(engine, scan, cancel),
        QueryPlan::Join(join) => execute_join(engine, join, cancel),
        QueryPlan::ViewScan { view, projection } => {
            let view = engine.planner.views().get(view)?;
            let rows = apply_projection(view.rows.clone(), projection, &view.columns);
            Ok(ResultSet::new(
                projected_columns(projection, &view.columns),
                rows,
            ))
        }
    }
}

fn execute_scan(engine: &Engine, scan: &ScanPlan, cancel: &CancelContext) -> Result<ResultSet> {
    let runtime = engine.runtime(&scan.table)?;
    let keyed: Vec<(String, Record)> = match &scan.kind {
        ScanKind::Table => runtime
            .store
            .scan_at(None, cancel)?
            .into_iter()
            .map(|r| (r.key, r.record))
            .collect(),
        ScanKind::Parallel { .. } => runtime
            .store
            .scan_at(None, cancel)?
            .into_iter()
            .map(|r| (r.key, r.record))
            .collect(),
        ScanKind::Index { index, value, .. } => {
            let keys = runtime
                .store
                .index_lookup_eq(index, std::slice::from_ref(value))?
                .into_iter()
                .collect();
            runtime
                .store
                .rows_for_keys(&keys, None, cancel)?
                .into_iter()
                .map(|r| (r.key, r.record))
                .collect()
        }
        ScanKind::Timeline { as_of } => {
            let (entries, _) = runtime.timeline.as_of(*as_of);
            replay_entries(&entries, cancel)?
        }
        ScanKind::Incremental { watermark } => {
            let entries = runtime.timeline.changes_since(*watermark);
            replay_entries(&entries, cancel)?
        }
    };

    let _reservation = engine
        .memory
        .reserve(PoolKind::Query, keyed.len() as u64 * ROW_MEMORY_BYTES)?;

    let rows: Vec<Record> = if let ScanKind::Parallel { .. } = scan.kind {
        let predicates = scan.predicates.clone();
        engine.scan_pool.install(|| {
            keyed
                .into_par_iter()
                .map(|(_, record)| record)
                .filter(|record| matches_all(&predicates, record))
                .collect()
        })
    } else {
        let mut out = Vec::new();
        for (i, (_, record)) in keyed.into_iter().enumerate() {
            if i % 1024 == 0 {
                cancel.check()?;
            }
            if matches_all(&scan.predicates, &record) {
                out.push(record);
            }
        }
        out
    };

    let base_columns = star_columns(engine, &scan.table)?;
    let rows = apply_projection(rows, &scan.projection, &base_columns);
    Ok(ResultSet::new(
        projected_columns(&scan.projection, &base_columns),
        rows,
    ))
}

fn matches_all(predicates: &[Predicate], record: &Record) -> bool {
    predicates
        .iter()
        .all(|p| p.matches(record.get(&p.column)))
}

/// Fold timeline entries into the latest state, keyed by row key.
fn replay_entries(
    entries: &[TimelineEntry],
    cancel: &CancelContext,
) -> Result<Vec<(String, Record)>> {
    let mut state: BTreeMap<String, Record> = BTreeMap::new();
    for (i, entry) in entries.iter().enumerate() {
        if i % 256 == 0 {
            cancel.check()?;
        }
        for change in &entry.changes {
            match change {
                ChangeDescriptor::Insert { key, record }
                | ChangeDescriptor::Update { key, record } => {
                    state.insert(key.clone(), record.clone());
                }
                ChangeDescriptor::Delete { key } => {
                    state.remove(key);
                }
            }
        }
    }
    Ok(state.into_iter().collect())
}

/// Rows visible within a closed timestamp range: the net effect of just
/// the commits inside it.
pub(crate) fn replay_range(
    engine: &Engine,
    table: &str,
    start: Timestamp,
    end: Timestamp,
    cancel: &CancelContext,
) -> Result<Vec<(String, Record)>> {
    let runtime = engine.runtime(table)?;
    let entries = runtime.timeline.range(start, end);
    replay_entries(&entries, cancel)
}

fn star_columns(engine: &Engine, table: &str) -> Result<Vec<String>> {
    Ok(engine.catalog.current(table)?.column_names())
}

fn projected_columns(projection: &Projection, base: &[String]) -> Vec<String> {
    match projection {
        Projection::Star => base.to_vec(),
        Projection::Columns(cols) => cols.clone(),
    }
}

fn apply_projection(rows: Vec<Record>, projection: &Projection, base: &[String]) -> Vec<Record> {
    match projection {
        Projection::Star => rows
            .into_iter()
            .map(|r| r.project(base))
            .collect(),
        Projection::Columns(cols) => rows.into_iter().map(|r| r.project(cols)).collect(),
    }
}

// ============================================================================
// Joins
// ============================================================================

fn execute_join(engine: &Engine, join: &JoinPlan, cancel: &CancelContext) -> Result<ResultSet> {
    let left_rt = engine.runtime(&join.left.table)?;
    let right_rt = engine.runtime(&join.right.table)?;
    let left: Vec<Record> = left_rt
        .store
        .scan_at(None, cancel)?
        .into_iter()
        .map(|r| r.record)
        .collect();
    let right: Vec<Record> = right_rt
        .store
        .scan_at(None, cancel)?
        .into_iter()
        .map(|r| r.record)
        .collect();

    let _reservation = engine.memory.reserve(
        PoolKind::Query,
        (left.len() + right.len()) as u64 * ROW_MEMORY_BYTES,
    )?;
    cancel.check()?;

    let lcol = &join.on.left_column;
    let rcol = &join.on.right_column;
    let pairs: Vec<(&Record, &Record)> = match join.algorithm {
        JoinAlgorithm::NestedLoop => nested_loop_join(&left, &right, join, cancel)?,
        JoinAlgorithm::Hash { build_left } => hash_join(&left, &right, lcol, rcol, build_left),
        JoinAlgorithm::Merge => merge_join(&left, &right, lcol, rcol),
    };

    let left_cols = star_columns(engine, &join.left.table)?;
    let right_cols = star_columns(engine, &join.right.table)?;
    let mut combined_cols: Vec<String> = Vec::new();
    for c in &left_cols {
        combined_cols.push(format!("{}.{}", join.left.table, c));
    }
    for c in &right_cols {
        combined_cols.push(format!("{}.{}", join.right.table, c));
    }

    let mut rows = Vec::with_capacity(pairs.len());
    for (l, r) in pairs {
        let mut record = Record::new();
        for c in &left_cols {
            record.set(
                format!("{}.{}", join.left.table, c),
                l.get(c).cloned().unwrap_or(Value::Null),
            );
        }
        for c in &right_cols {
            record.set(
                format!("{}.{}", join.right.table, c),
                r.get(c).cloned().unwrap_or(Value::Null),
            );
        }
        rows.push(record);
    }

    let rows = match &join.projection {
        Projection::Star => rows,
        Projection::Columns(cols) => {
            let resolved: Vec<String> = cols
                .iter()
                .map(|c| resolve_join_column(c, &join.left.table, &join.right.table, &combined_cols))
                .collect::<Result<_>>()?;
            rows.into_iter().map(|r| r.project(&resolved)).collect()
        }
    };
    let columns = match &join.projection {
        Projection::Star => combined_cols,
        Projection::Columns(cols) => cols
            .iter()
            .map(|c| resolve_join_column(c, &join.left.table, &join.right.table, &combined_cols))
            .collect::<Result<_>>()?,
    };
    Ok(ResultSet::new(columns, rows))
}

// A projection column in a join may arrive qualified or bare; bare names
// resolve left table first.
fn resolve_join_column(
    column: &str,
    left: &str,
    right: &str,
    combined: &[String],
) -> Result<String> {
    if combined.iter().any(|c| c == column) {
        return Ok(column.to_string());
    }
    for table in [left, right] {
        let qualified = format!("{}.{}", table, column);
        if combined.iter().any(|c| c == &qualified) {
            return Ok(qualified);
        }
    }
    Err(Error::NotFound(format!("column {}", column)))
}

fn nested_loop_join<'a>(
    left: &'a [Record],
    right: &'a [Record],
    join: &JoinPlan,
    cancel: &CancelContext,
) -> Result<Vec<(&'a Record, &'a Record)>> {
    let lcol = &join.on.left_column;
    let rcol = &join.on.right_column;
    let mut out = Vec::new();
    for (i, l) in left.iter().enumerate() {
        if i % 256 == 0 {
            cancel.check()?;
        }
        let Some(lv) = l.get(lcol) else { continue };
        for r in right {
            let Some(rv) = r.get(rcol) else { continue };
            let ord = lv.total_cmp(rv);
            let keep = match join.on.op {
                terrace_planner::PredicateOp::Eq => ord == std::cmp::Ordering::Equal,
                terrace_planner::PredicateOp::Ne => ord != std::cmp::Ordering::Equal,
                terrace_planner::PredicateOp::Lt => ord == std::cmp::Ordering::Less,
                terrace_planner::PredicateOp::Le => ord != std::cmp::Ordering::Greater,
                terrace_planner::PredicateOp::Gt => ord == std::cmp::Ordering::Greater,
                terrace_planner::PredicateOp::Ge => ord != std::cmp::Ordering::Less,
                _ => false,
            };
            if keep {
                out.push((l, r));
            }
        }
    }
    Ok(out)
}

fn hash_join<'a>(
    left: &'a [Record],
    right: &'a [Record],
    lcol: &str,
    rcol: &str,
    build_left: bool,
) -> Vec<(&'a Record, &'a Record)> {
    let (build, probe, build_col, probe_col) = if build_left {
        (left, right, lcol, rcol)
    } else {
        (right, left, rcol, lcol)
    };

    let mut table: HashMap<String, Vec<&Record>> = HashMap::new();
    for record in build {
        if let Some(v) = record.get(build_col) {
            table
                .entry(v.canonical_string())
                .or_default()
                .push(record);
        }
    }

    let mut out = Vec::new();
    for probe_record in probe {
        let Some(v) = probe_record.get(probe_col) else {
            continue;
        };
        if let Some(matches) = table.get(&v.canonical_string()) {
            for build_record in matches {
                if build_left {
                    out.push((*build_record, probe_record));
                } else {
                    out.push((probe_record, *build_record));
                }
            }
        }
    }
    out
}

fn merge_join<'a>(
    left: &'a [Record],
    right: &'a [Record],
    lcol: &str,
    rcol: &str,
) -> Vec<(&'a Record, &'a Record)> {
    let mut ls: Vec<&Record> = left.iter().filter(|r| r.get(lcol).is_some()).collect();
    let mut rs: Vec<&Record> = right.iter().filter(|r| r.get(rcol).is_some()).collect();
    ls.sort_by(|a, b| {
        a.get(lcol)
            .expect("filtered above")
            .total_cmp(b.get(lcol).expect("filtered above"))
    });
    rs.sort_by(|a, b| {
        a.get(rcol)
            .expect("filtered above")
            .total_cmp(b.get(rcol).expect("filtered above"))
    });

    let mut out = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < ls.len() && j < rs.len() {
        let lv = ls[i].get(lcol).expect("filtered above");
        let rv = rs[j].get(rcol).expect("filtered above");
        match lv.total_cmp(rv) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                // Cross-product over the equal runs on both sides.
                let mut i_end = i;
                while i_end < ls.len()
                    && ls[i_end]
                        .get(lcol)
                        .expect("filtered above")
                        .total_cmp(rv)
                        == std::cmp::Ordering::Equal
                {
                    i_end += 1;
                }
                let mut j_end = j;
                while j_end < rs.len()
                    && rs[j_end]
                        .get(rcol)
                        .expect("filtered above")
                        .total_cmp(lv)
                        == std::cmp::Ordering::Equal
                {
                    j_end += 1;
                }
                for l in &ls[i..i_end] {
                    for r in &rs[j..j_end] {
                        out.push((*l, *r));
                    }
                }
                i = i_end;
                j = j_end;
            }
        }
    }
    out
}
