//! Time travel and change feeds

use crate::support::{create_users, open_db, user};
use terracedb::Value;

#[test]
fn as_of_returns_the_visible_prefix() {
    let t = open_db();
    create_users(&t.db);

    t.db.insert("users", vec![user(1, "first")]).unwrap();
    t.tick_seconds(10);
    t.db.insert("users", vec![user(2, "second")]).unwrap();

    let changes = t.db.changes_since("users", 0).unwrap();
    let ts1 = changes.commits[0].timestamp;
    let ts2 = changes.commits[1].timestamp;
    assert!(ts1 < ts2);

    // Between the commits: only the first row.
    let mid = (ts1 + ts2) / 2;
    let result = t.db.query_as_of("users", mid, "select * from users").unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get("id"), Some(&Value::Int(1)));

    // After both: both rows.
    let result = t.db.query_as_of("users", ts2, "select * from users").unwrap();
    assert_eq!(result.rows.len(), 2);
}

#[test]
fn as_of_boundaries() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();

    // τ = 0 predates everything.
    assert!(t.db.query_as_of("users", 0, "select * from users").unwrap().is_empty());

    // A far-future τ clamps to the latest commit.
    let result =
        t.db.query_as_of("users", i64::MAX, "select * from users")
            .unwrap();
    assert_eq!(result.rows.len(), 1);
}

#[test]
fn as_of_sees_overwritten_values() {
    let t = open_db();
    create_users(&t.db);
    let keys = vec!["id".to_string()];

    t.db.upsert("users", vec![user(1, "old")], keys.clone()).unwrap();
    t.tick_seconds(5);
    t.db.upsert("users", vec![user(1, "new")], keys).unwrap();

    let changes = t.db.changes_since("users", 0).unwrap();
    let ts1 = changes.commits[0].timestamp;

    let result = t.db.query_as_of("users", ts1, "select name from users").unwrap();
    assert_eq!(result.single_value("name"), Some(&Value::String("old".into())));

    let now = t.db.query("users", "select name from users").unwrap();
    assert_eq!(now.single_value("name"), Some(&Value::String("new".into())));
}

#[test]
fn range_is_inclusive_and_normalized() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();
    t.tick_seconds(10);
    t.db.insert("users", vec![user(2, "B")]).unwrap();

    let changes = t.db.changes_since("users", 0).unwrap();
    let ts1 = changes.commits[0].timestamp;
    let ts2 = changes.commits[1].timestamp;

    // A window covering only the first commit.
    let result =
        t.db.query_range("users", ts1 - 10, ts2 - 1, "select * from users")
            .unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get("id"), Some(&Value::Int(1)));

    // Inverted bounds normalize by swapping.
    let swapped =
        t.db.query_range("users", ts2 - 1, ts1 - 10, "select * from users")
            .unwrap();
    assert_eq!(swapped.rows.len(), 1);

    // end == 0 means unbounded.
    let unbounded = t.db.query_range("users", ts1, 0, "select * from users").unwrap();
    assert_eq!(unbounded.rows.len(), 2);
}

#[test]
fn changes_since_watermark_is_exclusive() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();
    t.db.insert("users", vec![user(2, "B")]).unwrap();

    let all = t.db.changes_since("users", 0).unwrap();
    assert_eq!(all.commits.len(), 2);
    assert_eq!(all.change_count(), 2);

    // From the first commit's timestamp: only the second remains.
    let rest = t.db.changes_since("users", all.commits[0].timestamp).unwrap();
    assert_eq!(rest.commits.len(), 1);

    // From the returned watermark: nothing.
    let none = t.db.changes_since("users", all.watermark).unwrap();
    assert!(none.is_empty());
    assert_eq!(none.watermark, all.watermark);
}

#[test]
fn query_since_returns_only_new_state() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();
    let watermark = t.db.changes_since("users", 0).unwrap().watermark;

    t.db.insert("users", vec![user(2, "B")]).unwrap();
    let result = t.db.query_since("users", watermark, "select * from users").unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get("id"), Some(&Value::Int(2)));
}

#[test]
fn timeline_chain_verifies() {
    let t = open_db();
    create_users(&t.db);
    for i in 0..10 {
        t.db.insert("users", vec![user(i, "x")]).unwrap();
    }
    // Every commit id is distinct and the feed is ordered.
    let changes = t.db.changes_since("users", 0).unwrap();
    let mut ids: Vec<String> = changes
        .commits
        .iter()
        .filter_map(|c| c.commit.map(|id| id.to_hex()))
        .collect();
    assert_eq!(ids.len(), 10);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 10);
}
