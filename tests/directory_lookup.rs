mod common;

use chrono::{Duration, Utc};
use meshgate::db::NodeUpsert;
use meshgate::directory::NodeDirectory;

#[tokio::test]
async fn resolve_ranks_exact_before_prefix() {
    let (_dir, db) = common::open_db().await;
    let directory = NodeDirectory::new(db.clone());

    db.upsert_node(&NodeUpsert::named("!00000001", "BaseCamp")).await;
    db.upsert_node(&NodeUpsert::named("!00000002", "Base")).await;

    let hit = directory.resolve("Base").await.expect("match");
    assert_eq!(hit.node_id, "!00000002");

    let hit = directory.resolve("  BaseC  ").await.expect("trimmed prefix match");
    assert_eq!(hit.node_id, "!00000001");

    assert!(directory.resolve("").await.is_none());
    assert!(directory.resolve("   ").await.is_none());
}

#[tokio::test]
async fn resolve_ties_break_on_recency() {
    let (_dir, db) = common::open_db().await;
    let directory = NodeDirectory::new(db.clone());

    let mut older = NodeUpsert::named("!00000001", "Trailhead West");
    older.last_heard = Some(Utc::now() - Duration::hours(5));
    db.upsert_node(&older).await;

    let mut newer = NodeUpsert::named("!00000002", "Trailhead East");
    newer.last_heard = Some(Utc::now());
    db.upsert_node(&newer).await;

    // Both are prefix matches for "Trailhead"; the recently heard one wins.
    let hit = directory.resolve("Trailhead").await.expect("match");
    assert_eq!(hit.node_id, "!00000002");
}

#[tokio::test]
async fn display_name_cache_fills_and_clears() {
    let (_dir, db) = common::open_db().await;
    let directory = NodeDirectory::new(db.clone());

    db.upsert_node(&NodeUpsert::named("!00000001", "Summit")).await;

    assert_eq!(directory.cache_len(), 0);
    assert_eq!(directory.display_name("!00000001").await, "Summit");
    assert_eq!(directory.display_name("!unknown").await, "!unknown");
    assert_eq!(directory.cache_len(), 2);

    // Cached value survives a rename until the cache is cleared.
    db.upsert_node(&NodeUpsert::named("!00000001", "Summit Peak")).await;
    assert_eq!(directory.display_name("!00000001").await, "Summit");

    directory.clear_cache();
    assert_eq!(directory.cache_len(), 0);
    assert_eq!(directory.display_name("!00000001").await, "Summit Peak");
}
