//! Decoded inbound packet model.
//!
//! The radio SDK hands the bridge loosely-typed decoded packets; this module
//! pins them down as a tagged union keyed by port type, with one typed
//! payload per variant. Field names and nesting follow the SDK's decoded
//! JSON (`fromId`, `decoded.portnum`, `decoded.telemetry.deviceMetrics`,
//! ...), so packets deserialize directly from a subscription callback via
//! [`MeshPacket::from_json`].

use serde::{Deserialize, Serialize};

/// SNR list sentinel meaning "unknown"; rendered without a quality figure.
pub const UNK_SNR: i32 = -128;

/// One decoded packet from the mesh, with its link-quality envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshPacket {
    #[serde(default)]
    pub from_id: Option<String>,
    /// None (or `^all`) for broadcast traffic.
    #[serde(default)]
    pub to_id: Option<String>,
    #[serde(default)]
    pub hops_away: i64,
    #[serde(default)]
    pub snr: Option<f64>,
    #[serde(default)]
    pub rssi: Option<f64>,
    #[serde(default)]
    pub frequency: Option<f64>,
    /// Raw payload bytes rendered by the SDK, kept for the message log.
    #[serde(default)]
    pub raw_payload: Option<String>,
    #[serde(rename = "decoded")]
    pub payload: PortPayload,
}

impl MeshPacket {
    /// Parse one decoded packet from the SDK's JSON form.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Broadcast packets carry no concrete recipient.
    pub fn is_broadcast(&self) -> bool {
        match self.to_id.as_deref() {
            None => true,
            Some(to) => to.is_empty() || to == "^all" || to == "^all(^all)",
        }
    }
}

/// Application-layer payload, keyed by port type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "portnum")]
pub enum PortPayload {
    #[serde(rename = "TEXT_MESSAGE_APP")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "TELEMETRY_APP")]
    Telemetry {
        #[serde(default)]
        telemetry: TelemetryFrame,
    },
    #[serde(rename = "POSITION_APP")]
    Position {
        #[serde(default)]
        position: PositionFrame,
    },
    #[serde(rename = "ROUTING_APP")]
    Routing {
        #[serde(default)]
        routing: RoutingEnvelope,
    },
    #[serde(rename = "NODEINFO_APP")]
    NodeInfo,
    #[serde(rename = "ADMIN_APP")]
    Admin,
    #[serde(other)]
    Unknown,
}

impl PortPayload {
    /// Port-type tag as the SDK names it, for logs and the message table.
    pub fn port_name(&self) -> &'static str {
        match self {
            PortPayload::Text { .. } => "TEXT_MESSAGE_APP",
            PortPayload::Telemetry { .. } => "TELEMETRY_APP",
            PortPayload::Position { .. } => "POSITION_APP",
            PortPayload::Routing { .. } => "ROUTING_APP",
            PortPayload::NodeInfo => "NODEINFO_APP",
            PortPayload::Admin => "ADMIN_APP",
            PortPayload::Unknown => "UNKNOWN_APP",
        }
    }
}

/// Nested telemetry metric groups as the SDK decodes them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetryFrame {
    pub device_metrics: Option<DeviceMetrics>,
    pub environment_metrics: Option<EnvironmentMetrics>,
    pub air_quality_metrics: Option<AirQualityMetrics>,
    pub power_metrics: Option<PowerMetrics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceMetrics {
    pub battery_level: Option<f64>,
    pub voltage: Option<f64>,
    pub channel_utilization: Option<f64>,
    pub air_util_tx: Option<f64>,
    pub uptime_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentMetrics {
    pub temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub barometric_pressure: Option<f64>,
    pub gas_resistance: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AirQualityMetrics {
    pub pm10_environmental: Option<f64>,
    pub pm25_environmental: Option<f64>,
    pub pm100_environmental: Option<f64>,
    pub aqi: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PowerMetrics {
    pub ch1_voltage: Option<f64>,
    pub ch2_voltage: Option<f64>,
    pub ch3_voltage: Option<f64>,
}

/// Raw position fix. Coordinates arrive as fixed-point integers scaled by
/// 1e7; `(0,0)` decodes to an invalid fix and is dropped by the pipeline.
/// The SDK keeps these particular keys snake_cased.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionFrame {
    pub latitude_i: i64,
    pub longitude_i: i64,
    pub altitude: Option<f64>,
    #[serde(alias = "groundSpeed")]
    pub speed: Option<f64>,
    #[serde(alias = "groundTrack")]
    pub ground_track: Option<f64>,
    #[serde(alias = "precisionBits")]
    pub precision_bits: Option<f64>,
}

impl PositionFrame {
    /// Decoded latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude_i as f64 / 1e7
    }

    /// Decoded longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude_i as f64 / 1e7
    }
}

/// Routing payload wrapper; only RouteDiscovery results interest the bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingEnvelope {
    pub route_discovery: Option<RouteFrame>,
}

/// RouteDiscovery result: hop lists towards the destination and (when the
/// reply made it back) the return path, with per-hop SNR stored as SNR×4.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteFrame {
    pub route: Vec<u32>,
    pub route_back: Vec<u32>,
    pub snr_towards: Vec<i32>,
    pub snr_back: Vec<i32>,
}

/// Canonical `!xxxxxxxx` address form of a numeric node id.
pub fn node_num_to_id(num: u32) -> String {
    format!("!{:08x}", num)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_fixed_point_decoding() {
        let frame = PositionFrame {
            latitude_i: 424_041_350,
            longitude_i: -711_257_033,
            ..Default::default()
        };
        assert!((frame.latitude() - 42.404_135).abs() < 1e-9);
        assert!((frame.longitude() + 71.125_703_3).abs() < 1e-9);
    }

    #[test]
    fn parses_sdk_position_json() {
        let raw = r#"{
            "fromId": "!f9943e58",
            "toId": "^all",
            "hopsAway": 2,
            "snr": 8.0,
            "rssi": -73,
            "decoded": {
                "portnum": "POSITION_APP",
                "position": {
                    "latitude_i": 424041350,
                    "longitude_i": -711257033,
                    "altitude": 26
                }
            }
        }"#;
        let packet = MeshPacket::from_json(raw).expect("parse");
        assert_eq!(packet.from_id.as_deref(), Some("!f9943e58"));
        assert!(packet.is_broadcast());
        assert_eq!(packet.hops_away, 2);
        match packet.payload {
            PortPayload::Position { position } => {
                assert!((position.latitude() - 42.404_135).abs() < 1e-9);
                assert_eq!(position.altitude, Some(26.0));
            }
            other => panic!("expected position payload, got {:?}", other),
        }
    }

    #[test]
    fn parses_sdk_telemetry_json() {
        let raw = r#"{
            "fromId": "!0000aaaa",
            "decoded": {
                "portnum": "TELEMETRY_APP",
                "telemetry": {
                    "deviceMetrics": {"batteryLevel": 92, "voltage": 4.05}
                }
            }
        }"#;
        let packet = MeshPacket::from_json(raw).expect("parse");
        match packet.payload {
            PortPayload::Telemetry { telemetry } => {
                let device = telemetry.device_metrics.expect("device metrics");
                assert_eq!(device.battery_level, Some(92.0));
                assert_eq!(device.voltage, Some(4.05));
            }
            other => panic!("expected telemetry payload, got {:?}", other),
        }
    }

    #[test]
    fn unknown_port_parses_as_unknown() {
        let raw = r#"{"fromId": "!1", "decoded": {"portnum": "PAXCOUNTER_APP"}}"#;
        let packet = MeshPacket::from_json(raw).expect("parse");
        assert!(matches!(packet.payload, PortPayload::Unknown));
        assert_eq!(packet.payload.port_name(), "UNKNOWN_APP");
    }

    #[test]
    fn broadcast_detection() {
        let mut packet = MeshPacket {
            from_id: Some("!aabbccdd".into()),
            to_id: Some("^all".into()),
            hops_away: 0,
            snr: None,
            rssi: None,
            frequency: None,
            raw_payload: None,
            payload: PortPayload::Text { text: "hi".into() },
        };
        assert!(packet.is_broadcast());
        packet.to_id = Some("!11223344".into());
        assert!(!packet.is_broadcast());
        packet.to_id = None;
        assert!(packet.is_broadcast());
    }

    #[test]
    fn node_num_formatting() {
        assert_eq!(node_num_to_id(0x1a2b3c4d), "!1a2b3c4d");
        assert_eq!(node_num_to_id(7), "!00000007");
    }
}
