//! Tier placement and compaction through the engine surface

use crate::support::{create_users, open_db, user};
use terracedb::Tier;

#[test]
fn small_batches_land_hot() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();

    let usage = t.db.engine().tier_usage("users").unwrap();
    assert_eq!(usage[0].tier, Tier::Hot);
    assert_eq!(usage[0].blocks, 1);
    assert_eq!(usage[1].blocks, 0);
    assert_eq!(usage[2].blocks, 0);
}

#[test]
fn large_write_heavy_batches_land_warm() {
    let t = open_db();
    create_users(&t.db);
    let batch: Vec<_> = (0..1500).map(|i| user(i, "bulk")).collect();
    t.db.insert("users", batch).unwrap();

    let usage = t.db.engine().tier_usage("users").unwrap();
    assert_eq!(usage[1].blocks, 1);
    assert_eq!(usage[0].blocks, 0);
}

#[test]
fn aged_hot_blocks_promote_to_warm() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "A")]).unwrap();
    t.db.insert("users", vec![user(2, "B")]).unwrap();

    // Default hot_tier_max_age is seven days; age the blocks past it.
    t.tick_seconds(8 * 86_400);
    t.db.compact_now().unwrap();

    let usage = t.db.engine().tier_usage("users").unwrap();
    assert_eq!(usage[0].blocks + usage[0].rows, 0);
    assert!(usage[1].blocks >= 1);

    // Every row still answers, exactly once.
    let result = t.db.query("users", "select * from users").unwrap();
    assert_eq!(result.rows.len(), 2);
}

#[test]
fn logical_size_is_the_sum_of_tiers() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", (0..50).map(|i| user(i, "x")).collect()).unwrap();
    let batch: Vec<_> = (50..1200).map(|i| user(i, "y")).collect();
    t.db.insert("users", batch).unwrap();

    let usage = t.db.engine().tier_usage("users").unwrap();
    let total: u64 = usage.iter().map(|u| u.bytes).sum();
    assert!(total > 0);
    // Rows never live in two tiers at once.
    let rows: usize = usage.iter().map(|u| u.rows).sum();
    assert_eq!(rows, 1200);
}

#[test]
fn compaction_preserves_query_answers() {
    let t = open_db();
    create_users(&t.db);
    for i in 0..20 {
        t.db.insert("users", vec![user(i, "row")]).unwrap();
        t.tick_seconds(86_400); // one block per day
    }
    let before = t.db.query("users", "select * from users").unwrap();

    t.db.compact_now().unwrap();
    let after = t.db.query("users", "select * from users").unwrap();
    assert_eq!(before.rows.len(), after.rows.len());

    // Old blocks moved; nothing was lost.
    let usage = t.db.engine().tier_usage("users").unwrap();
    let rows: usize = usage.iter().map(|u| u.rows).sum();
    assert!(rows >= 20);
}

#[test]
fn single_row_table_survives_every_tier() {
    let t = open_db();
    create_users(&t.db);
    t.db.insert("users", vec![user(1, "only")]).unwrap();

    // Age past HOT, compact, then past WARM, compact again.
    t.tick_seconds(8 * 86_400);
    t.db.compact_now().unwrap();
    t.tick_seconds(31 * 86_400);
    t.db.compact_now().unwrap();

    let usage = t.db.engine().tier_usage("users").unwrap();
    assert_eq!(usage[2].rows, 1);
    assert_eq!(usage[0].rows + usage[1].rows, 0);

    let result = t.db.query("users", "select * from users").unwrap();
    assert_eq!(result.rows.len(), 1);
}
