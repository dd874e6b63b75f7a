//! Commit coordinator
//!
//! Runs the commit pipeline for one transaction:
//!
//! ```text
//! 1. acquire per-table commit guards, sorted table order
//! 2. first-writer-wins validation (abort on conflict)
//! 3. allocate the commit timestamp
//! 4. per table: timeline append (commit point), block write + index
//!    update
//! 5. install versions, mark committed, invalidate cached results
//! ```
//!
//! Commit is atomic per table and not cancelable once the guards are
//! held. A transaction spanning several tables commits once per table in
//! sorted order; there is no cross-table atomicity.

use crate::database::Engine;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use terrace_concurrency::TransactionContext;
use terrace_core::{CommitId, Result, Timestamp};
use terrace_storage::StoredRow;
use terrace_timeline::ChangeDescriptor;
use tracing::debug;

pub(crate) fn commit_transaction(
    engine: &Engine,
    txn: &mut TransactionContext,
) -> Result<(Timestamp, Vec<(String, CommitId)>)> {
    let tables = txn.tables_touched();
    if tables.is_empty() {
        let commit_ts = engine.txns.allocate_commit_ts();
        engine.txns.finish_commit(txn, commit_ts);
        return Ok((commit_ts, Vec::new()));
    }

    // Guards in sorted table order; tables_touched is already sorted.
    let locks: Vec<Arc<Mutex<()>>> = tables
        .iter()
        .map(|table| engine.txns.commit_guard(table))
        .collect();
    let _guards: Vec<MutexGuard<'_, ()>> = locks.iter().map(|lock| lock.lock()).collect();

    if let Err(conflict) = engine.txns.validate(txn) {
        engine.txns.abort(txn, conflict.to_string());
        return Err(conflict);
    }

    let commit_ts = engine.txns.allocate_commit_ts();
    let now = engine.clock.now_micros();
    let mut commits = Vec::with_capacity(tables.len());

    for table in &tables {
        let runtime = engine.runtime(table)?;
        let schema_version = engine.catalog.current(table)?.version;

        let mut changes = Vec::new();
        let mut rows = Vec::new();
        for (key, staged) in txn.writes_for_table(table) {
            match staged {
                Some(record) => {
                    let exists = engine
                        .txns
                        .versions()
                        .visible(&key, Timestamp::MAX)
                        .is_some();
                    let change = if exists {
                        ChangeDescriptor::Update {
                            key: key.row.clone(),
                            record: record.clone(),
                        }
                    } else {
                        ChangeDescriptor::Insert {
                            key: key.row.clone(),
                            record: record.clone(),
                        }
                    };
                    changes.push(change);
                    rows.push(StoredRow::live(key.row, commit_ts, record));
                }
                None => {
                    changes.push(ChangeDescriptor::Delete {
                        key: key.row.clone(),
                    });
                    rows.push(StoredRow::tombstone(key.row, commit_ts));
                }
            }
        }

        // Durability point for this table.
        let commit = runtime.timeline.append(commit_ts, changes, schema_version)?;
        runtime.store.write_batch(rows, now)?;
        commits.push((table.clone(), commit.id));
    }

    engine.txns.install(txn, commit_ts);
    engine.txns.finish_commit(txn, commit_ts);
    for table in &tables {
        engine.planner.cache().invalidate_table(table);
    }

    debug!(
        target: "terrace::engine",
        txn_id = txn.txn_id,
        commit_ts,
        tables = tables.len(),
        "transaction committed"
    );
    Ok((commit_ts, commits))
}
