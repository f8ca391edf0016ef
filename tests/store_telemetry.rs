mod common;

use chrono::{Duration, Utc};
use meshgate::db::{NodeUpsert, TelemetrySample};

#[tokio::test]
async fn summary_over_empty_store_is_zeroed() {
    let (_dir, db) = common::open_db().await;

    let summary = db.get_telemetry_summary(60).await;
    assert_eq!(summary.total_nodes, 0);
    assert_eq!(summary.active_nodes, 0);
    assert!(summary.avg_battery.is_none());
    assert!(summary.avg_temperature.is_none());
    assert!(summary.avg_snr.is_none());
}

#[tokio::test]
async fn summary_averages_over_samples() {
    let (_dir, db) = common::open_db().await;

    for (node_id, battery) in [("!00000001", 80.0), ("!00000002", 90.0)] {
        let mut node = NodeUpsert::named(node_id, node_id);
        node.last_heard = Some(Utc::now());
        db.upsert_node(&node).await;

        let sample = TelemetrySample {
            battery_level: Some(battery),
            temperature: Some(20.0),
            ..Default::default()
        };
        assert!(db.add_telemetry(node_id, &sample).await);
    }

    let summary = db.get_telemetry_summary(60).await;
    assert_eq!(summary.total_nodes, 2);
    assert_eq!(summary.active_nodes, 2);
    assert_eq!(summary.avg_battery, Some(85.0));
    assert_eq!(summary.avg_temperature, Some(20.0));
}

#[tokio::test]
async fn sample_emptiness_tracks_present_fields() {
    let empty = TelemetrySample::default();
    assert!(empty.is_empty());

    let sample = TelemetrySample {
        humidity: Some(55.0),
        rssi: Some(-90.0),
        ..Default::default()
    };
    assert!(!sample.is_empty());
    assert_eq!(sample.present_fields(), vec!["humidity", "rssi"]);
}

#[tokio::test]
async fn cleanup_prunes_only_rows_past_retention() {
    let (_dir, db) = common::open_db().await;

    db.upsert_node(&NodeUpsert::named("!00000001", "One")).await;
    let sample = TelemetrySample {
        battery_level: Some(50.0),
        ..Default::default()
    };
    assert!(db.add_telemetry("!00000001", &sample).await);
    assert!(db.add_telemetry("!00000001", &sample).await);

    // Backdate one row beyond the retention window.
    let old = Utc::now() - Duration::days(45);
    sqlx::query(
        "UPDATE telemetry SET timestamp = ? WHERE id = (SELECT MIN(id) FROM telemetry)",
    )
    .bind(old)
    .execute(db.pool())
    .await
    .expect("backdate row");

    let (telemetry_deleted, positions_deleted, messages_deleted) = db.cleanup_old_data(30).await;
    assert_eq!(telemetry_deleted, 1);
    assert_eq!(positions_deleted, 0);
    assert_eq!(messages_deleted, 0);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM telemetry")
        .fetch_one(db.pool())
        .await
        .expect("count");
    assert_eq!(remaining, 1);
}
