//! Append-only position samples.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::{log_store_error, Database};

/// A validated position fix ready for storage. `(0,0)` pairs are rejected
/// upstream and never reach this type.
#[derive(Debug, Clone, Default)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub accuracy: Option<f64>,
    /// Where the fix came from, e.g. "meshtastic".
    pub source: String,
}

/// One stored position row.
#[derive(Debug, Clone, FromRow)]
pub struct PositionRow {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub accuracy: Option<f64>,
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Database {
    /// Append one position sample for a node. Returns false on failure.
    pub async fn add_position(&self, node_id: &str, sample: &PositionSample) -> bool {
        let result = sqlx::query(
            r#"
            INSERT INTO positions (
                node_id, timestamp, latitude, longitude, altitude,
                speed, heading, accuracy, source
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(node_id)
        .bind(Utc::now())
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(sample.altitude)
        .bind(sample.speed)
        .bind(sample.heading)
        .bind(sample.accuracy)
        .bind(&sample.source)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => true,
            Err(err) => {
                log_store_error("adding position", &err);
                false
            }
        }
    }

    /// Most recent stored fix for a node, if any.
    pub async fn get_last_position(&self, node_id: &str) -> Option<PositionRow> {
        let result = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT latitude, longitude, altitude, speed, heading, accuracy, source, timestamp
            FROM positions
            WHERE node_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(row) => row,
            Err(err) => {
                log_store_error("getting last position", &err);
                None
            }
        }
    }
}
