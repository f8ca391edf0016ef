//! Node roster operations: upsert-with-new-detection, lookup, and the
//! joined "node + latest telemetry + latest position" overview queries.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

use super::{log_store_error, Database};

/// Fields written on every node sighting.
#[derive(Debug, Clone, Default)]
pub struct NodeUpsert {
    pub node_id: String,
    pub node_num: Option<i64>,
    pub long_name: String,
    pub short_name: Option<String>,
    pub macaddr: Option<String>,
    pub hw_model: Option<String>,
    pub firmware_version: Option<String>,
    /// Radio-reported last-activity time; may lag the bridge's own clock.
    pub last_heard: Option<DateTime<Utc>>,
    pub hops_away: i64,
    pub is_router: bool,
    pub is_client: bool,
}

impl NodeUpsert {
    /// Minimal record for a node known only by address.
    pub fn named(node_id: &str, long_name: &str) -> Self {
        NodeUpsert {
            node_id: node_id.to_string(),
            long_name: long_name.to_string(),
            is_client: true,
            ..Default::default()
        }
    }
}

/// One row of the `nodes` table.
#[derive(Debug, Clone, FromRow)]
pub struct NodeRow {
    pub node_id: String,
    pub node_num: Option<i64>,
    pub long_name: String,
    pub short_name: Option<String>,
    pub macaddr: Option<String>,
    pub hw_model: Option<String>,
    pub firmware_version: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_heard: Option<DateTime<Utc>>,
    pub hops_away: i64,
    pub is_router: bool,
    pub is_client: bool,
}

/// Node row joined with its most recent telemetry and position samples.
#[derive(Debug, Clone, FromRow)]
pub struct NodeOverview {
    pub node_id: String,
    pub node_num: Option<i64>,
    pub long_name: String,
    pub short_name: Option<String>,
    pub hw_model: Option<String>,
    pub firmware_version: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_heard: Option<DateTime<Utc>>,
    pub hops_away: i64,
    pub is_router: bool,
    pub battery_level: Option<f64>,
    pub voltage: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub gas_resistance: Option<f64>,
    pub iaq: Option<f64>,
    pub snr: Option<f64>,
    pub rssi: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

const NODE_OVERVIEW_SELECT: &str = r#"
    SELECT n.node_id, n.node_num, n.long_name, n.short_name, n.hw_model,
           n.firmware_version, n.first_seen, n.last_seen, n.last_heard,
           n.hops_away, n.is_router,
           t.battery_level, t.voltage, t.temperature, t.humidity,
           t.pressure, t.gas_resistance, t.iaq, t.snr, t.rssi,
           p.latitude, p.longitude, p.altitude, p.speed, p.heading
    FROM nodes n
    LEFT JOIN (
        SELECT node_id, battery_level, voltage, temperature, humidity,
               pressure, gas_resistance, iaq, snr, rssi
        FROM telemetry
        WHERE timestamp = (
            SELECT MAX(timestamp) FROM telemetry t2
            WHERE t2.node_id = telemetry.node_id
        )
    ) t ON n.node_id = t.node_id
    LEFT JOIN (
        SELECT node_id, latitude, longitude, altitude, speed, heading
        FROM positions
        WHERE timestamp = (
            SELECT MAX(timestamp) FROM positions p2
            WHERE p2.node_id = positions.node_id
        )
    ) p ON n.node_id = p.node_id
"#;

impl Database {
    /// Insert or update a node. Returns `(ok, is_new)`.
    ///
    /// "New" means no row existed before this call. The probe and the write
    /// share one transaction, so the determination cannot be confused by
    /// timestamp coincidences or a concurrent sighting.
    pub async fn upsert_node(&self, node: &NodeUpsert) -> (bool, bool) {
        match self.try_upsert_node(node).await {
            Ok(is_new) => (true, is_new),
            Err(err) => {
                log_store_error("adding/updating node", &err);
                (false, false)
            }
        }
    }

    async fn try_upsert_node(&self, node: &NodeUpsert) -> sqlx::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT 1 FROM nodes WHERE node_id = ?")
            .bind(&node.node_id)
            .fetch_optional(&mut *tx)
            .await?;
        let is_new = existing.is_none();

        let now = Utc::now();
        if is_new {
            sqlx::query(
                r#"
                INSERT INTO nodes (
                    node_id, node_num, long_name, short_name, macaddr,
                    hw_model, firmware_version, first_seen, last_seen,
                    last_heard, hops_away, is_router, is_client
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&node.node_id)
            .bind(node.node_num)
            .bind(&node.long_name)
            .bind(&node.short_name)
            .bind(&node.macaddr)
            .bind(&node.hw_model)
            .bind(&node.firmware_version)
            .bind(now)
            .bind(now)
            .bind(node.last_heard)
            .bind(node.hops_away)
            .bind(node.is_router)
            .bind(node.is_client)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE nodes SET
                    node_num = ?,
                    long_name = ?,
                    short_name = ?,
                    macaddr = ?,
                    hw_model = ?,
                    firmware_version = ?,
                    last_seen = ?,
                    last_heard = ?,
                    hops_away = ?,
                    is_router = ?,
                    is_client = ?
                WHERE node_id = ?
                "#,
            )
            .bind(node.node_num)
            .bind(&node.long_name)
            .bind(&node.short_name)
            .bind(&node.macaddr)
            .bind(&node.hw_model)
            .bind(&node.firmware_version)
            .bind(now)
            .bind(node.last_heard)
            .bind(node.hops_away)
            .bind(node.is_router)
            .bind(node.is_client)
            .bind(&node.node_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(is_new)
    }

    /// Nodes heard in the last `minutes`, most recent first, joined with
    /// their latest telemetry and position.
    pub async fn get_active_nodes(&self, minutes: i64) -> Vec<NodeOverview> {
        let cutoff = Utc::now() - Duration::minutes(minutes);
        let query = format!(
            "{} WHERE n.last_heard > ? ORDER BY n.last_heard DESC",
            NODE_OVERVIEW_SELECT
        );
        match sqlx::query_as::<_, NodeOverview>(&query)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                log_store_error("getting active nodes", &err);
                Vec::new()
            }
        }
    }

    /// Every known node, most recently heard first.
    pub async fn get_all_nodes(&self) -> Vec<NodeOverview> {
        let query = format!("{} ORDER BY n.last_heard DESC", NODE_OVERVIEW_SELECT);
        match sqlx::query_as::<_, NodeOverview>(&query)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                log_store_error("getting all nodes", &err);
                Vec::new()
            }
        }
    }

    /// Fuzzy node lookup. Exact long/short-name matches win outright; the
    /// substring fallback ranks exact long name, long-name prefix, exact
    /// short name, short-name prefix, then any other substring hit, with
    /// `last_heard` recency breaking ties.
    pub async fn find_node_by_name(&self, name: &str) -> Option<NodeRow> {
        match self.try_find_node_by_name(name).await {
            Ok(row) => row,
            Err(err) => {
                log_store_error("finding node by name", &err);
                None
            }
        }
    }

    async fn try_find_node_by_name(&self, name: &str) -> sqlx::Result<Option<NodeRow>> {
        let exact = sqlx::query_as::<_, NodeRow>(
            "SELECT * FROM nodes WHERE long_name = ? OR short_name = ?",
        )
        .bind(name)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        if exact.is_some() {
            return Ok(exact);
        }

        let contains = format!("%{}%", name);
        let prefix = format!("{}%", name);
        sqlx::query_as::<_, NodeRow>(
            r#"
            SELECT * FROM nodes WHERE long_name LIKE ? OR short_name LIKE ?
            ORDER BY
                CASE
                    WHEN long_name = ? THEN 1
                    WHEN long_name LIKE ? THEN 2
                    WHEN short_name = ? THEN 3
                    WHEN short_name LIKE ? THEN 4
                    ELSE 5
                END,
                last_heard DESC
            LIMIT 1
            "#,
        )
        .bind(&contains)
        .bind(&contains)
        .bind(name)
        .bind(&prefix)
        .bind(name)
        .bind(&prefix)
        .fetch_optional(&self.pool)
        .await
    }

    /// Fetch a single node row by address.
    pub async fn get_node_by_id(&self, node_id: &str) -> Option<NodeRow> {
        match sqlx::query_as::<_, NodeRow>("SELECT * FROM nodes WHERE node_id = ?")
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => row,
            Err(err) => {
                log_store_error("getting node by id", &err);
                None
            }
        }
    }

    /// Best human-friendly name for a node: long name, else short name,
    /// else the raw address.
    pub async fn node_display_name(&self, node_id: &str) -> String {
        let result: sqlx::Result<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT
                CASE
                    WHEN long_name IS NOT NULL AND TRIM(long_name) <> '' THEN long_name
                    WHEN short_name IS NOT NULL AND TRIM(short_name) <> '' THEN short_name
                    ELSE node_id
                END
            FROM nodes WHERE node_id = ?
            "#,
        )
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(name)) if !name.is_empty() => name,
            Ok(_) => node_id.to_string(),
            Err(err) => {
                log_store_error("looking up display name", &err);
                node_id.to_string()
            }
        }
    }

    /// Count of nodes first seen after `since`.
    pub async fn new_nodes_since(&self, since: DateTime<Utc>) -> i64 {
        match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM nodes WHERE first_seen > ?")
            .bind(since)
            .fetch_one(&self.pool)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                log_store_error("counting new nodes", &err);
                0
            }
        }
    }
}
