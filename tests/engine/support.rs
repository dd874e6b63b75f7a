//! Shared test fixtures

use std::sync::Arc;
use tempfile::TempDir;
use terracedb::{
    ColumnDef, ColumnType, ManualClock, OpenOptions, Record, StorageMode, Terrace, Value,
};

/// Roughly 2001-09-09 in microseconds; any stable modern instant works.
pub const T0: i64 = 1_000_000_000_000_000;

pub struct TestDb {
    pub db: Terrace,
    pub clock: Arc<ManualClock>,
    _dir: TempDir,
}

impl TestDb {
    /// Advance the injected clock by whole seconds.
    pub fn tick_seconds(&self, seconds: i64) {
        self.clock.advance(seconds * 1_000_000);
    }
}

pub fn open_db() -> TestDb {
    let dir = TempDir::new().expect("temp dir");
    let clock = Arc::new(ManualClock::new(T0));
    let db = Terrace::open_with(
        dir.path(),
        OpenOptions::new().clock(clock.clone() as Arc<dyn terracedb::Clock>),
    )
    .expect("open database");
    TestDb {
        db,
        clock,
        _dir: dir,
    }
}

pub fn users_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", ColumnType::Int, false),
        ColumnDef::new("name", ColumnType::String, false),
    ]
}

pub fn user(id: i64, name: &str) -> Record {
    Record::from([
        ("id", Value::Int(id)),
        ("name", Value::String(name.to_string())),
    ])
}

pub fn create_users(db: &Terrace) {
    db.create_table("users", users_columns(), StorageMode::Hybrid)
        .expect("create users");
}
