//! Basic DDL, DML, and read-back behavior

use crate::support::{create_users, open_db, user, users_columns};
use terracedb::{ColumnDef, ColumnType, Error, Record, StorageMode, Value};

#[test]
fn insert_and_read_back() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();

    let result =
        t.db.query("users", "SELECT name FROM users WHERE id = 1")
            .unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(
        result.single_value("name"),
        Some(&Value::String("A".into()))
    );

    // One commit so far, under schema version 1.
    let changes = t.db.changes_since("users", 0).unwrap();
    assert_eq!(changes.commits.len(), 1);
    assert_eq!(t.db.engine().schema("users").unwrap().version, 1);
}

#[test]
fn insert_query_roundtrip_law() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(7, "G")]).unwrap();

    let result =
        t.db.query("users", "SELECT id, name FROM users WHERE id = 7")
            .unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get("id"), Some(&Value::Int(7)));
    assert_eq!(result.rows[0].get("name"), Some(&Value::String("G".into())));
}

#[test]
fn duplicate_table_is_exists() {
    let t = open_db();
    create_users(&t.db);
    let err =
        t.db.create_table("users", users_columns(), StorageMode::Hybrid)
            .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
}

#[test]
fn missing_table_is_not_found() {
    let t = open_db();
    assert!(matches!(
        t.db.query("ghost", "select * from ghost"),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        t.db.insert("ghost", vec![user(1, "A")]),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn schema_violations_reject_the_write() {
    let t = open_db();
    create_users(&t.db);

    // Wrong type.
    let bad_type = Record::from([
        ("id", Value::String("one".into())),
        ("name", Value::String("A".into())),
    ]);
    assert!(matches!(
        t.db.insert("users", vec![bad_type]),
        Err(Error::SchemaMismatch { .. })
    ));

    // Missing non-nullable column.
    let missing = Record::from([("id", Value::Int(1))]);
    assert!(matches!(
        t.db.insert("users", vec![missing]),
        Err(Error::SchemaMismatch { .. })
    ));

    // Nothing was committed.
    assert!(t.db.query("users", "select * from users").unwrap().is_empty());
}

#[test]
fn empty_table_and_empty_batch() {
    let t = open_db();
    create_users(&t.db);
    assert!(t.db.query("users", "select * from users").unwrap().is_empty());

    // An empty batch commits nothing and is not an error.
    t.db.insert("users", Vec::new()).unwrap();
    assert_eq!(t.db.changes_since("users", 0).unwrap().commits.len(), 0);
}

#[test]
fn upsert_inserts_then_updates() {
    let t = open_db();
    create_users(&t.db);
    let keys = vec!["id".to_string()];

    t.db.upsert("users", vec![user(1, "A")], keys.clone()).unwrap();
    t.db.upsert("users", vec![user(1, "B")], keys).unwrap();

    let result = t.db.query("users", "select name from users where id = 1").unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.single_value("name"), Some(&Value::String("B".into())));

    // Both writes are history: two commits.
    assert_eq!(t.db.changes_since("users", 0).unwrap().commits.len(), 2);
}

#[test]
fn delete_hides_row() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A"), user(2, "B")]).unwrap();
    t.db.delete("users", vec![Value::Int(1)]).unwrap();

    let result = t.db.query("users", "select * from users").unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get("id"), Some(&Value::Int(2)));
}

#[test]
fn add_then_drop_column_versions_schema() {
    let t = open_db();
    create_users(&t.db);

    let v2 = t.db.add_column("users", ColumnDef::new("bio", ColumnType::String, true)).unwrap();
    assert_eq!(v2, 2);
    let v3 = t.db.drop_column("users", "bio").unwrap();
    assert_eq!(v3, 3);

    // The history holds both changes, in order.
    assert_eq!(t.db.engine().schema_history("users").unwrap(), vec![1, 2, 3]);

    // Dropping a non-nullable column is breaking.
    assert!(matches!(
        t.db.drop_column("users", "name"),
        Err(Error::BreakingChange(_))
    ));
    // So is adding a non-nullable one.
    assert!(matches!(
        t.db.add_column("users", ColumnDef::new("age", ColumnType::Int, false)),
        Err(Error::BreakingChange(_))
    ));
}

#[test]
fn read_only_mode_rejects_writes() {
    use terracedb::{AccessMode, OpenOptions, Terrace};
    let dir = tempfile::TempDir::new().unwrap();
    {
        let db = Terrace::open(dir.path()).unwrap();
        create_users(&db);
        db.insert("users", vec![user(1, "A")]).unwrap();
    }
    let db = Terrace::open_with(
        dir.path(),
        OpenOptions::new().access_mode(AccessMode::ReadOnly),
    )
    .unwrap();
    assert_eq!(db.query("users", "select * from users").unwrap().rows.len(), 1);
    assert!(db.insert("users", vec![user(2, "B")]).is_err());
}
