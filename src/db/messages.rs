//! Message history: the relay log and the raw material for statistics and
//! topology reconstruction.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, Row};

use super::{log_store_error, Database};

/// One observed message ready for storage.
#[derive(Debug, Clone, Default)]
pub struct MessageRecord {
    pub from_node_id: Option<String>,
    /// None for broadcast traffic.
    pub to_node_id: Option<String>,
    pub message_text: Option<String>,
    pub port_num: String,
    pub payload: Option<String>,
    pub hops_away: i64,
    pub snr: Option<f64>,
    pub rssi: Option<f64>,
}

/// A stored message joined with sender/recipient names where known.
#[derive(Debug, Clone, FromRow)]
pub struct MessageView {
    pub timestamp: DateTime<Utc>,
    pub from_node_id: Option<String>,
    pub to_node_id: Option<String>,
    pub message_text: Option<String>,
    pub hops_away: Option<i64>,
    pub snr: Option<f64>,
    pub rssi: Option<f64>,
    pub from_display: Option<String>,
    pub to_display: Option<String>,
}

/// Aggregate message statistics over a trailing window.
#[derive(Debug, Clone, Default)]
pub struct MessageStatistics {
    pub total_messages: i64,
    pub unique_senders: i64,
    pub unique_recipients: i64,
    pub avg_hops: Option<f64>,
    pub avg_snr: Option<f64>,
    pub avg_rssi: Option<f64>,
    /// Message count per hour-of-day ("00".."23") within the window.
    pub hourly_distribution: BTreeMap<String, i64>,
}

/// One directed edge in the derived topology view.
#[derive(Debug, Clone)]
pub struct TopologyLink {
    pub from_node: Option<String>,
    pub to_node: Option<String>,
    pub message_count: i64,
    pub avg_hops: Option<f64>,
    pub avg_snr: Option<f64>,
    pub last_communication: Option<DateTime<Utc>>,
}

/// Derived, non-persisted view of who talks to whom.
#[derive(Debug, Clone, Default)]
pub struct NetworkTopology {
    pub connections: Vec<TopologyLink>,
    pub total_nodes: i64,
    pub active_nodes: i64,
    pub router_nodes: i64,
    pub avg_hops: Option<f64>,
}

/// A historical message used as evidence when estimating a route.
#[derive(Debug, Clone, FromRow)]
pub struct RouteObservation {
    pub from_node_id: Option<String>,
    pub to_node_id: Option<String>,
    pub hops_away: Option<i64>,
    pub snr: Option<f64>,
    pub rssi: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Database {
    /// Append one message observation. Returns false on failure.
    pub async fn add_message(&self, message: &MessageRecord) -> bool {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (
                from_node_id, to_node_id, timestamp, message_text,
                port_num, payload, hops_away, snr, rssi
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.from_node_id)
        .bind(&message.to_node_id)
        .bind(Utc::now())
        .bind(&message.message_text)
        .bind(&message.port_num)
        .bind(&message.payload)
        .bind(message.hops_away)
        .bind(message.snr)
        .bind(message.rssi)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => true,
            Err(err) => {
                log_store_error("adding message", &err);
                false
            }
        }
    }

    /// The most recent messages with sender/recipient names resolved.
    pub async fn get_recent_messages(&self, limit: i64) -> Vec<MessageView> {
        let result = sqlx::query_as::<_, MessageView>(
            r#"
            SELECT m.timestamp, m.from_node_id, m.to_node_id, m.message_text,
                   m.hops_away, m.snr, m.rssi,
                   COALESCE(fn.long_name, fn.short_name) AS from_display,
                   COALESCE(tn.long_name, tn.short_name) AS to_display
            FROM messages m
            LEFT JOIN nodes fn ON fn.node_id = m.from_node_id
            LEFT JOIN nodes tn ON tn.node_id = m.to_node_id
            ORDER BY m.timestamp DESC, m.id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await;

        match result {
            Ok(rows) => rows,
            Err(err) => {
                log_store_error("fetching recent messages", &err);
                Vec::new()
            }
        }
    }

    /// Message count since `since`.
    pub async fn count_messages_since(&self, since: DateTime<Utc>) -> i64 {
        match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE timestamp > ?")
            .bind(since)
            .fetch_one(&self.pool)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                log_store_error("counting messages", &err);
                0
            }
        }
    }

    /// Totals, distinct-sender/recipient counts, link-quality averages, and
    /// an hourly histogram over the trailing `hours` window.
    pub async fn get_message_statistics(&self, hours: i64) -> MessageStatistics {
        match self.try_get_message_statistics(hours).await {
            Ok(stats) => stats,
            Err(err) => {
                log_store_error("getting message statistics", &err);
                MessageStatistics::default()
            }
        }
    }

    async fn try_get_message_statistics(&self, hours: i64) -> sqlx::Result<MessageStatistics> {
        let cutoff = Utc::now() - Duration::hours(hours);

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total_messages,
                COUNT(DISTINCT from_node_id) as unique_senders,
                COUNT(DISTINCT to_node_id) as unique_recipients,
                AVG(hops_away) as avg_hops,
                AVG(snr) as avg_snr,
                AVG(rssi) as avg_rssi
            FROM messages
            WHERE timestamp > ?
            "#,
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;

        let mut stats = MessageStatistics {
            total_messages: row.get("total_messages"),
            unique_senders: row.get("unique_senders"),
            unique_recipients: row.get("unique_recipients"),
            avg_hops: row.get("avg_hops"),
            avg_snr: row.get("avg_snr"),
            avg_rssi: row.get("avg_rssi"),
            hourly_distribution: BTreeMap::new(),
        };

        let hourly = sqlx::query(
            r#"
            SELECT strftime('%H', timestamp) as hour, COUNT(*) as message_count
            FROM messages
            WHERE timestamp > ?
            GROUP BY strftime('%H', timestamp)
            ORDER BY hour
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        for row in hourly {
            let hour: Option<String> = row.get("hour");
            if let Some(hour) = hour {
                stats.hourly_distribution.insert(hour, row.get("message_count"));
            }
        }

        Ok(stats)
    }

    /// Build the adjacency view from the trailing 24 hours of messages,
    /// busiest pairs first, plus roster-level aggregates.
    pub async fn get_network_topology(&self) -> NetworkTopology {
        match self.try_get_network_topology().await {
            Ok(topology) => topology,
            Err(err) => {
                log_store_error("getting network topology", &err);
                NetworkTopology::default()
            }
        }
    }

    async fn try_get_network_topology(&self) -> sqlx::Result<NetworkTopology> {
        let window_cutoff = Utc::now() - Duration::hours(24);
        let active_cutoff = Utc::now() - Duration::hours(1);

        let rows = sqlx::query(
            r#"
            SELECT
                from_node_id,
                to_node_id,
                COUNT(*) as message_count,
                AVG(hops_away) as avg_hops,
                AVG(snr) as avg_snr,
                MAX(timestamp) as last_communication
            FROM messages
            WHERE timestamp > ?
            GROUP BY from_node_id, to_node_id
            HAVING message_count > 0
            ORDER BY message_count DESC
            "#,
        )
        .bind(window_cutoff)
        .fetch_all(&self.pool)
        .await?;

        let connections = rows
            .iter()
            .map(|row| TopologyLink {
                from_node: row.get("from_node_id"),
                to_node: row.get("to_node_id"),
                message_count: row.get("message_count"),
                avg_hops: row.get("avg_hops"),
                avg_snr: row.get("avg_snr"),
                last_communication: row.get("last_communication"),
            })
            .collect();

        let stats = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total_nodes,
                COUNT(CASE WHEN last_heard > ? THEN 1 END) as active_nodes,
                COUNT(CASE WHEN is_router = 1 THEN 1 END) as router_nodes,
                AVG(hops_away) as avg_hops
            FROM nodes
            "#,
        )
        .bind(active_cutoff)
        .fetch_one(&self.pool)
        .await?;

        Ok(NetworkTopology {
            connections,
            total_nodes: stats.get("total_nodes"),
            active_nodes: stats.get("active_nodes"),
            router_nodes: stats.get("router_nodes"),
            avg_hops: stats.get("avg_hops"),
        })
    }

    /// The most recent messages addressed to one node, newest first.
    /// Evidence base for route estimation.
    pub async fn messages_to_node(&self, node_id: &str, limit: i64) -> Vec<RouteObservation> {
        let result = sqlx::query_as::<_, RouteObservation>(
            r#"
            SELECT from_node_id, to_node_id, hops_away, snr, rssi, timestamp
            FROM messages
            WHERE to_node_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(node_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;

        match result {
            Ok(rows) => rows,
            Err(err) => {
                log_store_error("fetching messages to node", &err);
                Vec::new()
            }
        }
    }
}
