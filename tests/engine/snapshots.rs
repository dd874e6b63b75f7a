//! Snapshots and rollback

use crate::support::{create_users, open_db, user};
use terracedb::{Error, Value};

#[test]
fn rollback_restores_pre_insert_state() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();

    let before = t.db.query("users", "select * from users").unwrap();
    t.db.create_snapshot("s1").unwrap();

    t.db.insert("users", vec![user(2, "B")]).unwrap();
    assert_eq!(t.db.query("users", "select * from users").unwrap().rows.len(), 2);

    t.db.rollback_to("s1").unwrap();
    let after = t.db.query("users", "select * from users").unwrap();
    assert_eq!(after.rows.len(), before.rows.len());
    assert_eq!(after.rows[0].get("id"), Some(&Value::Int(1)));
}

#[test]
fn rollback_restores_overwritten_values() {
    let t = open_db();
    create_users(&t.db);
    let keys = vec!["id".to_string()];
    t.db.upsert("users", vec![user(1, "old")], keys.clone()).unwrap();
    t.db.create_snapshot("s1").unwrap();
    t.db.upsert("users", vec![user(1, "new")], keys).unwrap();

    t.db.rollback_to("s1").unwrap();
    let result = t.db.query("users", "select name from users where id = 1").unwrap();
    assert_eq!(result.single_value("name"), Some(&Value::String("old".into())));
}

#[test]
fn rollback_preserves_history() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();
    t.db.create_snapshot("s1").unwrap();
    t.db.insert("users", vec![user(2, "B")]).unwrap();

    let commits_before = t.db.changes_since("users", 0).unwrap().commits.len();
    t.db.rollback_to("s1").unwrap();

    // Rollback appends a compensating commit; nothing is erased.
    let commits_after = t.db.changes_since("users", 0).unwrap().commits.len();
    assert_eq!(commits_after, commits_before + 1);

    // The rolled-back state is still reachable by time travel.
    let changes = t.db.changes_since("users", 0).unwrap();
    let pre_rollback_ts = changes.commits[commits_before - 1].timestamp;
    let historical =
        t.db.query_as_of("users", pre_rollback_ts, "select * from users")
            .unwrap();
    assert_eq!(historical.rows.len(), 2);
}

#[test]
fn snapshot_lifecycle() {
    let t = open_db();
    create_users(&t.db);
    t.db.create_snapshot("a").unwrap();
    t.db.create_snapshot("b").unwrap();

    assert!(matches!(
        t.db.create_snapshot("a"),
        Err(Error::AlreadyExists(_))
    ));
    assert_eq!(t.db.list_snapshots().len(), 2);

    t.db.release_snapshot("a").unwrap();
    assert_eq!(t.db.list_snapshots().len(), 1);
    assert!(matches!(t.db.rollback_to("a"), Err(Error::NotFound(_))));
}

#[test]
fn empty_rollback_is_a_no_op() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();
    t.db.create_snapshot("s1").unwrap();

    // Nothing changed since the snapshot.
    t.db.rollback_to("s1").unwrap();
    assert_eq!(t.db.query("users", "select * from users").unwrap().rows.len(), 1);
}

#[test]
fn snapshot_retention_releases_old_snapshots() {
    let t = open_db();
    create_users(&t.db);
    t.db.create_snapshot("old").unwrap();

    // Default retention is thirty days.
    t.tick_seconds(31 * 86_400);
    t.db.create_snapshot("fresh").unwrap();
    t.db.compact_now().unwrap();

    let names: Vec<String> = t.db.list_snapshots().into_iter().map(|s| s.id).collect();
    assert_eq!(names, vec!["fresh".to_string()]);
}
