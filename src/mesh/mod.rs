//! # Mesh Transport Boundary
//!
//! The radio link itself (serial/TCP framing, protobuf decoding, link-layer
//! retries) belongs to an external SDK. This module pins down the seam the
//! bridge consumes:
//!
//! - [`MeshTransport`] - connect / send / node-enumeration primitives
//! - [`MeshPacket`] / [`PortPayload`] - decoded inbound packets (see
//!   [`packet`]), delivered to the bridge over an mpsc channel
//! - [`NodeSnapshot`] - one raw entry from the radio's node table, plus the
//!   normalization into store records
//!
//! [`DetachedMesh`] is a no-radio stand-in: the bridge keeps running, sends
//! are logged and reported as failed, and the node table is empty. Useful
//! for offline operation and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::db::{NodeUpsert, PositionSample, TelemetrySample};

pub mod packet;

pub use packet::{
    AirQualityMetrics, DeviceMetrics, EnvironmentMetrics, MeshPacket, PortPayload, PositionFrame,
    PowerMetrics, RouteFrame, RoutingEnvelope, TelemetryFrame, UNK_SNR,
};

/// Name recorded when a node has not reported one yet.
pub const UNKNOWN_NAME: &str = "Unknown";

/// The radio-side primitives the bridge consumes. Decoded packets arrive
/// separately on an `mpsc::Receiver<MeshPacket>` fed by the SDK's
/// subscription callback.
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Establish the radio link. False means the radio is unavailable;
    /// callers decide whether that is fatal.
    async fn connect(&mut self) -> bool;

    /// Send text to the mesh: broadcast when `destination` is None,
    /// otherwise an addressed direct message. False on failure.
    async fn send_text(&self, text: &str, destination: Option<&str>) -> bool;

    /// Snapshot of the radio's current node table, keyed by node address.
    async fn nodes(&self) -> HashMap<String, NodeSnapshot>;
}

/// One raw record from the radio's node table, as the SDK decodes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSnapshot {
    pub num: Option<i64>,
    pub user: NodeUser,
    pub macaddr: Option<String>,
    pub hw_model: Option<String>,
    pub firmware_version: Option<String>,
    /// Unix seconds of the radio's own last-heard bookkeeping.
    pub last_heard: Option<i64>,
    pub hops_away: Option<i64>,
    pub is_router: Option<bool>,
    pub is_client: Option<bool>,
    // Co-located link and fix data some firmwares flatten into the record.
    pub snr: Option<f64>,
    pub rssi: Option<f64>,
    pub frequency: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub accuracy: Option<f64>,
}

/// Owner/name block inside a node record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeUser {
    pub long_name: Option<String>,
    pub short_name: Option<String>,
}

/// Normalize a raw node record into the store's upsert shape.
pub fn normalize_node(node_id: &str, snapshot: &NodeSnapshot) -> NodeUpsert {
    let last_heard = snapshot
        .last_heard
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .or_else(|| Some(Utc::now()));

    NodeUpsert {
        node_id: node_id.to_string(),
        node_num: snapshot.num,
        long_name: snapshot
            .user
            .long_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
        short_name: snapshot.user.short_name.clone(),
        macaddr: snapshot.macaddr.clone(),
        hw_model: snapshot.hw_model.clone(),
        firmware_version: snapshot.firmware_version.clone(),
        last_heard,
        hops_away: snapshot.hops_away.unwrap_or(0),
        is_router: snapshot.is_router.unwrap_or(false),
        is_client: snapshot.is_client.unwrap_or(true),
    }
}

/// Link-quality and fix fields some node records carry inline, collected as
/// a telemetry sample. Empty when the record has none.
pub fn snapshot_telemetry(snapshot: &NodeSnapshot) -> TelemetrySample {
    TelemetrySample {
        snr: snapshot.snr,
        rssi: snapshot.rssi,
        frequency: snapshot.frequency,
        latitude: snapshot.latitude,
        longitude: snapshot.longitude,
        altitude: snapshot.altitude,
        speed: snapshot.speed,
        heading: snapshot.heading,
        accuracy: snapshot.accuracy,
        ..Default::default()
    }
}

/// A position sample from an inline fix, when the record has coordinates.
pub fn snapshot_position(snapshot: &NodeSnapshot) -> Option<PositionSample> {
    match (snapshot.latitude, snapshot.longitude) {
        (Some(latitude), Some(longitude)) => Some(PositionSample {
            latitude,
            longitude,
            altitude: snapshot.altitude,
            speed: snapshot.speed,
            heading: snapshot.heading,
            accuracy: snapshot.accuracy,
            source: "meshtastic".to_string(),
        }),
        _ => None,
    }
}

/// Stand-in transport for running without a radio attached.
pub struct DetachedMesh;

#[async_trait]
impl MeshTransport for DetachedMesh {
    async fn connect(&mut self) -> bool {
        false
    }

    async fn send_text(&self, text: &str, destination: Option<&str>) -> bool {
        debug!(
            "No radio attached; dropping outbound text to {:?}: {}",
            destination,
            crate::logutil::escape_log(text)
        );
        false
    }

    async fn nodes(&self) -> HashMap<String, NodeSnapshot> {
        HashMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_defaults() {
        let snapshot = NodeSnapshot::default();
        let upsert = normalize_node("!0000cafe", &snapshot);
        assert_eq!(upsert.node_id, "!0000cafe");
        assert_eq!(upsert.long_name, UNKNOWN_NAME);
        assert_eq!(upsert.hops_away, 0);
        assert!(!upsert.is_router);
        assert!(upsert.is_client);
        assert!(upsert.last_heard.is_some());
    }

    #[test]
    fn normalization_carries_names_and_flags() {
        let snapshot = NodeSnapshot {
            num: Some(0x1a2b),
            user: NodeUser {
                long_name: Some("Ridge Repeater".into()),
                short_name: Some("RDG".into()),
            },
            is_router: Some(true),
            hops_away: Some(3),
            last_heard: Some(1_700_000_000),
            ..Default::default()
        };
        let upsert = normalize_node("!00001a2b", &snapshot);
        assert_eq!(upsert.long_name, "Ridge Repeater");
        assert_eq!(upsert.short_name.as_deref(), Some("RDG"));
        assert!(upsert.is_router);
        assert_eq!(upsert.hops_away, 3);
        assert_eq!(upsert.last_heard.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn snapshot_telemetry_empty_without_inline_fields() {
        assert!(snapshot_telemetry(&NodeSnapshot::default()).is_empty());
        let snapshot = NodeSnapshot {
            snr: Some(7.5),
            ..Default::default()
        };
        assert_eq!(snapshot_telemetry(&snapshot).present_fields(), vec!["snr"]);
    }

    #[test]
    fn snapshot_position_requires_both_coordinates() {
        let mut snapshot = NodeSnapshot {
            latitude: Some(45.2),
            ..Default::default()
        };
        assert!(snapshot_position(&snapshot).is_none());
        snapshot.longitude = Some(-122.7);
        let sample = snapshot_position(&snapshot).unwrap();
        assert_eq!(sample.source, "meshtastic");
        assert_eq!(sample.latitude, 45.2);
    }
}
