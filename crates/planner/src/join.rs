//! Join algorithm selection
//!
//! The rule:
//! - equi-join with both sides small → merge join
//! - equi-join with either side large → hash join, building on the
//!   smaller input
//! - non-equi condition → nested loop (the only algorithm that can
//!   evaluate it)
//!
//! The CPU constants are chosen so the rule's pick is also the cheapest
//! under the cost model: nested loop is quadratic, hash is linear with a
//! build surcharge, merge is linear with a sort surcharge that overtakes
//! hashing once an input stops being small.

use crate::plan::JoinAlgorithm;

/// "Small" for the merge-join rule.
pub const SMALL_JOIN_ROWS: u64 = 1_000;

const NESTED_LOOP_FACTOR: f64 = 0.004;
const HASH_PROBE_FACTOR: f64 = 0.012;
const HASH_BUILD_FACTOR: f64 = 0.01;
const MERGE_SCAN_FACTOR: f64 = 0.008;
const MERGE_SORT_FACTOR: f64 = 0.001;

/// Pick the join algorithm for the given shape and input sizes.
pub fn select_join_algorithm(equi: bool, left_rows: u64, right_rows: u64) -> JoinAlgorithm {
    if !equi {
        return JoinAlgorithm::NestedLoop;
    }
    if left_rows < SMALL_JOIN_ROWS && right_rows < SMALL_JOIN_ROWS {
        JoinAlgorithm::Merge
    } else {
        JoinAlgorithm::Hash {
            build_left: left_rows <= right_rows,
        }
    }
}

/// CPU term of a join algorithm at the given input sizes.
pub fn join_cpu_cost(algorithm: JoinAlgorithm, left_rows: u64, right_rows: u64) -> f64 {
    let l = left_rows as f64;
    let r = right_rows as f64;
    match algorithm {
        JoinAlgorithm::NestedLoop => NESTED_LOOP_FACTOR * l * r,
        JoinAlgorithm::Hash { build_left } => {
            let build = if build_left { l } else { r };
            HASH_PROBE_FACTOR * (l + r) + HASH_BUILD_FACTOR * build
        }
        JoinAlgorithm::Merge => {
            let sort = |n: f64| if n > 1.0 { n * n.log2() } else { 0.0 };
            MERGE_SCAN_FACTOR * (l + r) + MERGE_SORT_FACTOR * (sort(l) + sort(r))
        }
    }
}
