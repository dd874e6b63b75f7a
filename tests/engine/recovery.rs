//! Restart and recovery behavior

use crate::support::{user, users_columns};
use std::sync::Arc;
use tempfile::TempDir;
use terracedb::{
    Clock, Error, ManualClock, OpenOptions, StorageMode, Terrace, Value,
};

fn reopenable() -> (TempDir, Arc<ManualClock>) {
    (
        TempDir::new().unwrap(),
        Arc::new(ManualClock::new(crate::support::T0)),
    )
}

fn open(dir: &TempDir, clock: &Arc<ManualClock>) -> Terrace {
    Terrace::open_with(
        dir.path(),
        OpenOptions::new().clock(Arc::clone(clock) as Arc<dyn Clock>),
    )
    .unwrap()
}

#[test]
fn data_survives_reopen() {
    let (dir, clock) = reopenable();
    {
        let db = open(&dir, &clock);
        db.create_table("users", users_columns(), StorageMode::Hybrid)
            .unwrap();
        db.insert("users", vec![user(1, "A"), user(2, "B")]).unwrap();
    }
    clock.advance(1_000_000);

    let db = open(&dir, &clock);
    let result = db.query("users", "select * from users").unwrap();
    assert_eq!(result.rows.len(), 2);
    assert_eq!(db.changes_since("users", 0).unwrap().commits.len(), 1);
}

#[test]
fn new_commits_sort_after_replayed_ones() {
    let (dir, clock) = reopenable();
    let first_ts = {
        let db = open(&dir, &clock);
        db.create_table("users", users_columns(), StorageMode::Hybrid)
            .unwrap();
        db.insert("users", vec![user(1, "A")]).unwrap();
        db.changes_since("users", 0).unwrap().watermark
    };

    // Even with the clock unchanged, a reopened engine issues later
    // timestamps than anything on disk.
    let db = open(&dir, &clock);
    db.insert("users", vec![user(2, "B")]).unwrap();
    let changes = db.changes_since("users", 0).unwrap();
    assert_eq!(changes.commits.len(), 2);
    assert!(changes.commits[1].timestamp > first_ts);
}

#[test]
fn snapshots_and_schema_survive_reopen() {
    let (dir, clock) = reopenable();
    {
        let db = open(&dir, &clock);
        db.create_table("users", users_columns(), StorageMode::Hybrid)
            .unwrap();
        db.add_column(
            "users",
            terracedb::ColumnDef::new("bio", terracedb::ColumnType::String, true),
        )
        .unwrap();
        db.insert("users", vec![user(1, "A")]).unwrap();
        db.create_snapshot("s1").unwrap();
    }

    let db = open(&dir, &clock);
    assert_eq!(db.engine().schema("users").unwrap().version, 2);
    assert_eq!(db.list_snapshots().len(), 1);

    // Rollback works against the recovered state.
    db.insert("users", vec![user(2, "B")]).unwrap();
    db.rollback_to("s1").unwrap();
    assert_eq!(db.query("users", "select * from users").unwrap().rows.len(), 1);
}

#[test]
fn second_process_is_locked_out() {
    let (dir, clock) = reopenable();
    let _held = open(&dir, &clock);
    let err = Terrace::open(dir.path()).unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)));
}

#[test]
fn time_travel_survives_reopen() {
    let (dir, clock) = reopenable();
    let mid = {
        let db = open(&dir, &clock);
        db.create_table("users", users_columns(), StorageMode::Hybrid)
            .unwrap();
        db.insert("users", vec![user(1, "A")]).unwrap();
        clock.advance(10_000_000);
        db.insert("users", vec![user(2, "B")]).unwrap();
        let changes = db.changes_since("users", 0).unwrap();
        (changes.commits[0].timestamp + changes.commits[1].timestamp) / 2
    };

    let db = open(&dir, &clock);
    let result = db.query_as_of("users", mid, "select * from users").unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get("id"), Some(&Value::Int(1)));
}

#[test]
fn secrets_survive_reopen() {
    let (dir, clock) = reopenable();
    {
        let db = open(&dir, &clock);
        db.engine().secrets().put("token", b"opaque-bytes").unwrap();
    }
    let db = open(&dir, &clock);
    assert_eq!(db.engine().secrets().get("token").unwrap(), b"opaque-bytes");
}
