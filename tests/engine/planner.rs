//! Plan selection and result caching through the engine surface

use crate::support::{create_users, open_db, user};
use terracedb::{ColumnDef, ColumnType, Record, StorageMode, Value};

fn create_pair(db: &terracedb::Terrace, a_rows: i64, b_rows: i64) {
    db.create_table(
        "a",
        vec![ColumnDef::new("x", ColumnType::Int, false)],
        StorageMode::Hybrid,
    )
    .unwrap();
    db.create_table(
        "b",
        vec![ColumnDef::new("y", ColumnType::Int, false)],
        StorageMode::Hybrid,
    )
    .unwrap();
    db.insert(
        "a",
        (0..a_rows)
            .map(|i| Record::from([("x", Value::Int(i % 10))]))
            .collect(),
    )
    .unwrap();
    db.insert(
        "b",
        (0..b_rows)
            .map(|i| Record::from([("y", Value::Int(i))]))
            .collect(),
    )
    .unwrap();
}

#[test]
fn join_selection_follows_input_sizes() {
    let t = open_db();
    create_pair(&t.db, 1000, 10);

    // Equi-join, small × large: hash join.
    let plan = t.db.engine().explain("a", "select * from a join b on a.x = b.y").unwrap();
    assert!(plan.starts_with("hash_join"), "got {plan}");

    // Non-equi: nested loop.
    let plan = t.db.engine().explain("a", "select * from a join b on a.x < b.y").unwrap();
    assert!(plan.starts_with("nested_loop_join"), "got {plan}");
}

#[test]
fn small_small_equi_join_merges() {
    let t = open_db();
    create_pair(&t.db, 10, 10);
    let plan = t.db.engine().explain("a", "select * from a join b on a.x = b.y").unwrap();
    assert!(plan.starts_with("merge_join"), "got {plan}");
}

#[test]
fn equi_join_returns_matching_pairs() {
    let t = open_db();
    create_pair(&t.db, 1000, 10);

    // a.x cycles 0..10 over 1000 rows; b.y is 0..10 once.
    let result = t.db.query("a", "select * from a join b on a.x = b.y").unwrap();
    assert_eq!(result.rows.len(), 1000);
    // Output columns are qualified.
    assert!(result.columns.iter().any(|c| c == "a.x"));
    assert!(result.columns.iter().any(|c| c == "b.y"));
}

#[test]
fn index_scan_is_used_and_correct() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", (0..500).map(|i| user(i, "x")).collect()).unwrap();
    t.db.create_index("users", "users_id", vec!["id".to_string()]).unwrap();

    let plan = t.db.engine().explain("users", "select * from users where id = 7").unwrap();
    assert!(plan.starts_with("index_scan"), "got {plan}");

    let via_index = t.db.query("users", "select * from users where id = 7").unwrap();
    assert_eq!(via_index.rows.len(), 1);
    assert_eq!(via_index.rows[0].get("id"), Some(&Value::Int(7)));

    // The index answers match a full scan with the same predicate.
    t.db.drop_index("users_id").unwrap();
    let via_scan = t.db.query("users", "select * from users where id = 7").unwrap();
    assert_eq!(via_index.rows, via_scan.rows);
}

#[test]
fn unshaped_query_falls_back_to_full_scan() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A"), user(2, "B")]).unwrap();

    // The recognizer cannot shape this; the planner degrades to a full
    // table scan rather than erroring.
    let result = t.db.query("users", "show me everything please").unwrap();
    assert_eq!(result.rows.len(), 2);
}

#[test]
fn repeated_query_hits_the_cache() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();

    let first = t.db.query("users", "select * from users").unwrap();
    let second = t.db.query("users", "SELECT  *  FROM users").unwrap();
    assert_eq!(first, second);
    assert!(t.db.metrics().cache.hits >= 1);
}

#[test]
fn commit_invalidates_cached_results() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();

    assert_eq!(t.db.query("users", "select * from users").unwrap().rows.len(), 1);
    t.db.insert("users", vec![user(2, "B")]).unwrap();

    // A cache hit may never return the pre-commit answer.
    assert_eq!(t.db.query("users", "select * from users").unwrap().rows.len(), 2);
}

#[test]
fn cache_entries_expire_by_age() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();
    t.db.query("users", "select * from users").unwrap();

    // Default TTL is one hour.
    t.tick_seconds(3 * 3600);
    t.db.query("users", "select * from users").unwrap();
    let stats = t.db.metrics().cache;
    assert!(stats.misses >= 2);
}

#[test]
fn predicate_evaluation_matches_semantics() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert(
        "users",
        vec![user(1, "alice"), user(2, "bob"), user(3, "carol")],
    )
    .unwrap();

    let like = t.db.query("users", "select * from users where name like 'b%'").unwrap();
    assert_eq!(like.rows.len(), 1);

    let range = t.db.query("users", "select * from users where id >= 2").unwrap();
    assert_eq!(range.rows.len(), 2);

    let inlist = t.db.query("users", "select * from users where id in (1, 3)").unwrap();
    assert_eq!(inlist.rows.len(), 2);

    let conj = t
        .db
        .query("users", "select * from users where id >= 2 and name like 'b%'")
        .unwrap();
    assert_eq!(conj.rows.len(), 1);
}
