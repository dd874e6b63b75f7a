//! Snapshot isolation and first-writer-wins

use crate::support::{create_users, open_db, user};
use terracedb::Value;

#[test]
fn snapshot_isolation_and_conflict() {
    let t = open_db();
    create_users(&t.db);

    // T1 starts first and stages a write to the shared key.
    let mut t1 = t.db.begin();
    t.db.txn_write(&mut t1, "users", "k", user(1, "v1")).unwrap();

    // T2 starts later, writes the same key, and commits.
    let mut t2 = t.db.begin();
    t.db.txn_write(&mut t2, "users", "k", user(1, "v2")).unwrap();
    t.db.commit(&mut t2).unwrap();

    // T1's snapshot predates T2's commit: it still sees nothing.
    // (Its own staged write is visible to itself.)
    assert_eq!(
        t.db.txn_read(&mut t1, "users", "k").unwrap().get("name"),
        Some(&Value::String("v1".into()))
    );

    // T1 commits second and loses the shared key.
    let err = t.db.commit(&mut t1).unwrap_err();
    assert!(err.is_conflict());

    // T2's value stands.
    let mut probe = t.db.begin();
    assert_eq!(
        t.db.txn_read(&mut probe, "users", "k").unwrap().get("name"),
        Some(&Value::String("v2".into()))
    );
}

#[test]
fn reader_does_not_observe_later_commit() {
    let t = open_db();
    create_users(&t.db);

    let mut reader = t.db.begin();
    t.db.insert("users", vec![user(1, "A")]).unwrap();

    // The insert committed after the reader's snapshot.
    assert!(t.db.txn_read(&mut reader, "users", "i:1").is_none());

    // A fresh transaction sees it.
    let mut fresh = t.db.begin();
    assert!(t.db.txn_read(&mut fresh, "users", "i:1").is_some());
}

#[test]
fn abort_discards_staged_writes() {
    let t = open_db();
    create_users(&t.db);

    let mut txn = t.db.begin();
    t.db.txn_write(&mut txn, "users", "k", user(9, "ghost")).unwrap();
    t.db.abort(&mut txn);

    assert!(t.db.query("users", "select * from users").unwrap().is_empty());
    assert_eq!(t.db.metrics().txns.aborted, 1);
}

#[test]
fn disjoint_keys_commit_concurrently() {
    let t = open_db();
    create_users(&t.db);

    let mut a = t.db.begin();
    let mut b = t.db.begin();
    t.db.txn_write(&mut a, "users", "ka", user(1, "A")).unwrap();
    t.db.txn_write(&mut b, "users", "kb", user(2, "B")).unwrap();

    t.db.commit(&mut a).unwrap();
    t.db.commit(&mut b).unwrap();
    assert_eq!(t.db.query("users", "select * from users").unwrap().rows.len(), 2);
}

#[test]
fn commit_timestamps_strictly_increase() {
    let t = open_db();
    create_users(&t.db);
    for i in 0..5 {
        t.db.insert("users", vec![user(i, "x")]).unwrap();
    }
    let changes = t.db.changes_since("users", 0).unwrap();
    let timestamps: Vec<i64> = changes.commits.iter().map(|c| c.timestamp).collect();
    assert_eq!(timestamps.len(), 5);
    assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn conflict_error_names_the_key_and_commit() {
    let t = open_db();
    create_users(&t.db);

    let mut t1 = t.db.begin();
    t.db.txn_write(&mut t1, "users", "shared", user(1, "first")).unwrap();
    let mut t2 = t.db.begin();
    t.db.txn_write(&mut t2, "users", "shared", user(1, "second")).unwrap();
    let winner_ts = t.db.commit(&mut t2).unwrap();

    match t.db.commit(&mut t1).unwrap_err() {
        terracedb::Error::Conflict { key, committed_ts } => {
            assert_eq!(key, "users/shared");
            assert_eq!(committed_ts, winner_ts);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn transaction_spanning_two_tables_commits_each() {
    let t = open_db();
    create_users(&t.db);
    t.db.create_table(
        "events",
        vec![terracedb::ColumnDef::new(
            "id",
            terracedb::ColumnType::Int,
            false,
        )],
        terracedb::StorageMode::Hybrid,
    )
    .unwrap();

    let mut txn = t.db.begin();
    t.db.txn_write(&mut txn, "users", "u1", user(1, "A")).unwrap();
    t.db.txn_write(
        &mut txn,
        "events",
        "e1",
        terracedb::Record::from([("id", Value::Int(100))]),
    )
    .unwrap();
    t.db.commit(&mut txn).unwrap();

    // One commit appears in each table's timeline.
    assert_eq!(t.db.changes_since("users", 0).unwrap().commits.len(), 1);
    assert_eq!(t.db.changes_since("events", 0).unwrap().commits.len(), 1);
}
