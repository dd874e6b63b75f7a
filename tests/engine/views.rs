//! Materialized-view rewrite, freshness, and refresh

use crate::support::{create_users, open_db, user};
use terracedb::{Error, RefreshStrategy, Value};

#[test]
fn matching_query_is_rewritten_to_the_view() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();

    t.db.create_materialized_view("vw", "select * from users", RefreshStrategy::Full)
        .unwrap();

    let plan = t.db.engine().explain("users", "SELECT * FROM users").unwrap();
    assert!(plan.starts_with("materialized_view_scan"), "got {plan}");

    let result = t.db.query("users", "select * from users").unwrap();
    assert_eq!(result.rows.len(), 1);
}

#[test]
fn stale_full_view_refuses_the_rewrite() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();
    t.db.create_materialized_view("vw", "select * from users", RefreshStrategy::Full)
        .unwrap();

    // A new commit makes the view stale.
    t.db.insert("users", vec![user(2, "B")]).unwrap();
    let plan = t.db.engine().explain("users", "select * from users").unwrap();
    assert!(!plan.starts_with("materialized_view_scan"), "got {plan}");

    // The query still answers with post-insert state.
    assert_eq!(t.db.query("users", "select * from users").unwrap().rows.len(), 2);

    // An explicit refresh restores the rewrite.
    t.db.refresh_view("vw").unwrap();
    let plan = t.db.engine().explain("users", "select * from users").unwrap();
    assert!(plan.starts_with("materialized_view_scan"), "got {plan}");
}

#[test]
fn stale_incremental_view_refreshes_on_demand() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();
    t.db.create_materialized_view(
        "vw",
        "select name from users",
        RefreshStrategy::Incremental,
    )
    .unwrap();

    t.db.insert("users", vec![user(2, "B")]).unwrap();

    // The planner rewrites to the view and triggers a refresh first, so
    // the answer includes the post-insert state.
    let result = t.db.query("users", "select name from users").unwrap();
    assert_eq!(result.rows.len(), 2);
    let names: Vec<&Value> = result.rows.iter().filter_map(|r| r.get("name")).collect();
    assert!(names.contains(&&Value::String("B".into())));
}

#[test]
fn view_projection_is_materialized() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A"), user(2, "B")]).unwrap();
    t.db.create_materialized_view(
        "names",
        "select name from users where id = 1",
        RefreshStrategy::Full,
    )
    .unwrap();

    let result = t.db.query("users", "select name from users where id = 1").unwrap();
    assert_eq!(result.columns, vec!["name".to_string()]);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.single_value("name"), Some(&Value::String("A".into())));
}

#[test]
fn duplicate_view_name_rejected() {
    let t = open_db();
    create_users(&t.db);
    t.db.create_materialized_view("vw", "select * from users", RefreshStrategy::Full)
        .unwrap();
    assert!(matches!(
        t.db.create_materialized_view("vw", "select * from users", RefreshStrategy::Full),
        Err(Error::AlreadyExists(_))
    ));
    assert_eq!(t.db.list_views(), vec!["vw".to_string()]);
}

#[test]
fn view_over_missing_table_rejected() {
    let t = open_db();
    assert!(matches!(
        t.db.create_materialized_view("vw", "select * from ghost", RefreshStrategy::Full),
        Err(Error::NotFound(_))
    ));
}
