mod common;

use chrono::{Duration, Utc};
use meshgate::db::NodeUpsert;

#[tokio::test]
async fn upsert_reports_new_exactly_once() {
    let (_dir, db) = common::open_db().await;

    let node = NodeUpsert::named("!0000aaaa", "Alpha Station");
    let (ok, is_new) = db.upsert_node(&node).await;
    assert!(ok);
    assert!(is_new, "first sighting must be new");

    let (ok, is_new) = db.upsert_node(&node).await;
    assert!(ok);
    assert!(!is_new, "second sighting must not be new");
}

#[tokio::test]
async fn upsert_updates_fields_and_preserves_first_seen() {
    let (_dir, db) = common::open_db().await;

    let mut node = NodeUpsert::named("!0000aaaa", "Alpha Station");
    db.upsert_node(&node).await;
    let before = db.get_node_by_id("!0000aaaa").await.unwrap();

    node.long_name = "Alpha Station II".to_string();
    node.hops_away = 2;
    db.upsert_node(&node).await;
    let after = db.get_node_by_id("!0000aaaa").await.unwrap();

    assert_eq!(after.long_name, "Alpha Station II");
    assert_eq!(after.hops_away, 2);
    assert_eq!(after.first_seen, before.first_seen);
    assert!(after.last_seen >= before.last_seen);
}

#[tokio::test]
async fn exact_name_match_beats_longer_substring() {
    let (_dir, db) = common::open_db().await;

    db.upsert_node(&NodeUpsert::named("!00000001", "AlphaBeta")).await;
    db.upsert_node(&NodeUpsert::named("!00000002", "Alpha")).await;

    let hit = db.find_node_by_name("Alpha").await.expect("match");
    assert_eq!(hit.long_name, "Alpha");
    assert_eq!(hit.node_id, "!00000002");
}

#[tokio::test]
async fn substring_match_falls_back_when_no_exact() {
    let (_dir, db) = common::open_db().await;

    db.upsert_node(&NodeUpsert::named("!00000001", "Ridge Repeater")).await;

    let hit = db.find_node_by_name("Repeat").await.expect("substring match");
    assert_eq!(hit.node_id, "!00000001");

    assert!(db.find_node_by_name("nothing-like-this").await.is_none());
}

#[tokio::test]
async fn display_name_prefers_long_then_short_then_id() {
    let (_dir, db) = common::open_db().await;

    db.upsert_node(&NodeUpsert::named("!00000001", "Long Name")).await;
    assert_eq!(db.node_display_name("!00000001").await, "Long Name");

    let mut short_only = NodeUpsert::named("!00000002", "");
    short_only.short_name = Some("SHRT".to_string());
    db.upsert_node(&short_only).await;
    assert_eq!(db.node_display_name("!00000002").await, "SHRT");

    assert_eq!(db.node_display_name("!deadbeef").await, "!deadbeef");
}

#[tokio::test]
async fn active_nodes_respects_window() {
    let (_dir, db) = common::open_db().await;

    let mut fresh = NodeUpsert::named("!00000001", "Fresh");
    fresh.last_heard = Some(Utc::now());
    db.upsert_node(&fresh).await;

    let mut stale = NodeUpsert::named("!00000002", "Stale");
    stale.last_heard = Some(Utc::now() - Duration::hours(3));
    db.upsert_node(&stale).await;

    let active = db.get_active_nodes(60).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].node_id, "!00000001");

    let all = db.get_all_nodes().await;
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn new_nodes_since_counts_first_seen() {
    let (_dir, db) = common::open_db().await;

    let before = Utc::now() - Duration::minutes(1);
    db.upsert_node(&NodeUpsert::named("!00000001", "One")).await;

    assert_eq!(db.new_nodes_since(before).await, 1);
    assert_eq!(db.new_nodes_since(Utc::now() + Duration::minutes(1)).await, 0);
}
