mod common;

use chrono::{Duration, Utc};
use meshgate::db::{MessageRecord, NodeUpsert, PositionSample};

fn text_message(from: &str, to: Option<&str>, text: &str) -> MessageRecord {
    MessageRecord {
        from_node_id: Some(from.to_string()),
        to_node_id: to.map(String::from),
        message_text: Some(text.to_string()),
        port_num: "TEXT_MESSAGE_APP".to_string(),
        payload: None,
        hops_away: 1,
        snr: Some(6.0),
        rssi: Some(-85.0),
    }
}

#[tokio::test]
async fn recent_messages_resolve_names() {
    let (_dir, db) = common::open_db().await;

    db.upsert_node(&NodeUpsert::named("!0000aaaa", "Alpha")).await;
    db.upsert_node(&NodeUpsert::named("!0000bbbb", "Beta")).await;
    assert!(db.add_message(&text_message("!0000aaaa", Some("!0000bbbb"), "hi")).await);
    assert!(db.add_message(&text_message("!0000aaaa", None, "to everyone")).await);

    let recent = db.get_recent_messages(10).await;
    assert_eq!(recent.len(), 2);
    // Newest first
    assert_eq!(recent[0].message_text.as_deref(), Some("to everyone"));
    assert!(recent[0].to_node_id.is_none());
    assert_eq!(recent[1].from_display.as_deref(), Some("Alpha"));
    assert_eq!(recent[1].to_display.as_deref(), Some("Beta"));
}

#[tokio::test]
async fn statistics_count_senders_and_hours() {
    let (_dir, db) = common::open_db().await;

    db.add_message(&text_message("!00000001", None, "one")).await;
    db.add_message(&text_message("!00000001", None, "two")).await;
    db.add_message(&text_message("!00000002", None, "three")).await;

    let stats = db.get_message_statistics(24).await;
    assert_eq!(stats.total_messages, 3);
    assert_eq!(stats.unique_senders, 2);
    assert_eq!(stats.avg_hops, Some(1.0));
    assert_eq!(stats.avg_snr, Some(6.0));
    let hourly_total: i64 = stats.hourly_distribution.values().sum();
    assert_eq!(hourly_total, 3);
}

#[tokio::test]
async fn statistics_over_empty_store_are_zeroed() {
    let (_dir, db) = common::open_db().await;

    let stats = db.get_message_statistics(24).await;
    assert_eq!(stats.total_messages, 0);
    assert_eq!(stats.unique_senders, 0);
    assert!(stats.avg_snr.is_none());
    assert!(stats.hourly_distribution.is_empty());
}

#[tokio::test]
async fn count_messages_since_cutoff() {
    let (_dir, db) = common::open_db().await;

    db.add_message(&text_message("!00000001", None, "hello")).await;
    assert_eq!(db.count_messages_since(Utc::now() - Duration::minutes(5)).await, 1);
    assert_eq!(db.count_messages_since(Utc::now() + Duration::minutes(5)).await, 0);
}

#[tokio::test]
async fn last_position_returns_newest_fix() {
    let (_dir, db) = common::open_db().await;

    db.upsert_node(&NodeUpsert::named("!00000001", "One")).await;
    assert!(db.get_last_position("!00000001").await.is_none());

    let first = PositionSample {
        latitude: 40.0,
        longitude: -74.0,
        source: "meshtastic".to_string(),
        ..Default::default()
    };
    let second = PositionSample {
        latitude: 41.0,
        longitude: -75.0,
        altitude: Some(120.0),
        source: "meshtastic".to_string(),
        ..Default::default()
    };
    assert!(db.add_position("!00000001", &first).await);
    assert!(db.add_position("!00000001", &second).await);

    let last = db.get_last_position("!00000001").await.expect("fix");
    assert_eq!(last.latitude, 41.0);
    assert_eq!(last.longitude, -75.0);
    assert_eq!(last.altitude, Some(120.0));
}
