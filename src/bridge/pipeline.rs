//! Per-port-type packet processing.
//!
//! One decoded inbound packet becomes zero or more side effects: a persisted
//! record, an event on the mesh→chat queue, a monitor-buffer entry. Each
//! port type has its own extraction/validation path. Malformed input (empty
//! sender, empty text, `(0,0)` fix, metric-free telemetry) means "nothing to
//! do", not an error — it is dropped without log noise.
//!
//! Processing never batches across packets: two packets arriving
//! back-to-back produce two independent records and events regardless of
//! interleaving.

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::db::{Database, MessageRecord, PositionSample, TelemetrySample};
use crate::directory::NodeDirectory;
use crate::geo;
use crate::logutil::{escape_log, preview};
use crate::mesh::packet::{node_num_to_id, MeshPacket, PortPayload, RouteFrame, TelemetryFrame, UNK_SNR};

use super::event::ChatEvent;
use super::monitor::{PacketMonitor, PacketSample};

/// Turns decoded packets into store rows, chat events, and monitor entries.
#[derive(Clone)]
pub struct PacketProcessor {
    db: Database,
    directory: NodeDirectory,
    monitor: PacketMonitor,
    events: mpsc::Sender<ChatEvent>,
    outbound: mpsc::Sender<String>,
    movement_threshold_m: f64,
}

impl PacketProcessor {
    pub fn new(
        db: Database,
        directory: NodeDirectory,
        monitor: PacketMonitor,
        events: mpsc::Sender<ChatEvent>,
        outbound: mpsc::Sender<String>,
        movement_threshold_m: f64,
    ) -> Self {
        PacketProcessor {
            db,
            directory,
            monitor,
            events,
            outbound,
            movement_threshold_m,
        }
    }

    /// Process one decoded packet, dispatching on its port type.
    pub async fn process(&self, packet: MeshPacket) {
        let from_id = packet.from_id.clone().unwrap_or_default();
        let from_name = if from_id.is_empty() {
            "Unknown".to_string()
        } else {
            self.directory.display_name(&from_id).await
        };

        info!(
            "PACKET: {} from {} ({}) | hops {} | snr {:?} | rssi {:?}",
            packet.payload.port_name(),
            from_name,
            if from_id.is_empty() { "?" } else { from_id.as_str() },
            packet.hops_away,
            packet.snr,
            packet.rssi
        );
        self.monitor.record(PacketSample {
            port: packet.payload.port_name().to_string(),
            from_id: from_id.clone(),
            from_name: from_name.clone(),
            detail: String::new(),
            hops_away: packet.hops_away,
            snr: packet.snr,
            rssi: packet.rssi,
            received_at: Utc::now(),
        });

        match &packet.payload {
            PortPayload::Text { text } => self.process_text(&packet, text, &from_name).await,
            PortPayload::Telemetry { telemetry } => {
                self.process_telemetry(&packet, telemetry).await
            }
            PortPayload::Position { position } => self.process_position(&packet, position).await,
            PortPayload::Routing { routing } => match &routing.route_discovery {
                Some(frame) => self.process_routing(&packet, frame, &from_name).await,
                None => debug!(
                    "Routing packet from {} does not contain RouteDiscovery data",
                    from_name
                ),
            },
            // Node info and admin traffic is consumed by the radio SDK's own
            // bookkeeping; nothing to relay.
            PortPayload::NodeInfo => debug!("NODEINFO from {}", from_name),
            PortPayload::Admin => debug!("ADMIN from {}", from_name),
            PortPayload::Unknown => debug!("Unknown port from {}", from_name),
        }
    }

    async fn process_text(&self, packet: &MeshPacket, text: &str, from_name: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let from_id = packet.from_id.clone().unwrap_or_else(|| "Unknown".to_string());
        let broadcast = packet.is_broadcast();
        let to_id = if broadcast { None } else { packet.to_id.clone() };
        let to_name = match to_id.as_deref() {
            Some(id) => self.directory.display_name(id).await,
            None => "^all".to_string(),
        };

        if trimmed.eq_ignore_ascii_case("ping") {
            info!("Ping received from mesh node {}", from_name);
            self.enqueue_outbound(format!("Pong! - - > {}", from_name));
        }

        self.emit(ChatEvent::Text {
            from_id: from_id.clone(),
            from_name: from_name.to_string(),
            to_name,
            broadcast,
            text: text.to_string(),
            hops_away: packet.hops_away,
            snr: packet.snr,
            rssi: packet.rssi,
            timestamp: Utc::now(),
        });
        info!(
            "MESSAGE: queued for chat - '{}' from {}",
            escape_log(&preview(text, 50)),
            from_name
        );

        self.monitor.record(PacketSample {
            port: "TEXT_MESSAGE_APP".to_string(),
            from_id: from_id.clone(),
            from_name: from_name.to_string(),
            detail: preview(trimmed, 50),
            hops_away: packet.hops_away,
            snr: packet.snr,
            rssi: packet.rssi,
            received_at: Utc::now(),
        });

        let record = MessageRecord {
            from_node_id: Some(from_id.clone()),
            to_node_id: to_id,
            message_text: Some(text.to_string()),
            port_num: "TEXT_MESSAGE_APP".to_string(),
            payload: packet.raw_payload.clone(),
            hops_away: packet.hops_away,
            snr: packet.snr,
            rssi: packet.rssi,
        };
        if !self.db.add_message(&record).await {
            warn!("Failed to store message from {}", from_id);
        }
    }

    async fn process_telemetry(&self, packet: &MeshPacket, frame: &TelemetryFrame) {
        let Some(from_id) = valid_sender(packet.from_id.as_deref()) else {
            debug!("Skipping telemetry packet with invalid sender");
            return;
        };

        let sample = extract_telemetry(frame, packet);
        if sample.is_empty() {
            debug!("No telemetry data in packet from {}", from_id);
            return;
        }

        let fields = sample.present_fields();
        if self.db.add_telemetry(from_id, &sample).await {
            info!("Stored telemetry for {}: {:?}", from_id, fields);
        } else {
            warn!("Failed to store telemetry for {}", from_id);
        }

        self.monitor.record(PacketSample {
            port: "TELEMETRY_APP".to_string(),
            from_id: from_id.to_string(),
            from_name: self.directory.display_name(from_id).await,
            detail: fields.join(","),
            hops_away: packet.hops_away,
            snr: packet.snr,
            rssi: packet.rssi,
            received_at: Utc::now(),
        });
    }

    async fn process_position(
        &self,
        packet: &MeshPacket,
        frame: &crate::mesh::packet::PositionFrame,
    ) {
        let Some(from_id) = valid_sender(packet.from_id.as_deref()) else {
            debug!("Skipping position packet with invalid sender");
            return;
        };

        let new_lat = frame.latitude();
        let new_lon = frame.longitude();
        if new_lat == 0.0 && new_lon == 0.0 {
            debug!("Invalid position coordinates (0,0) from {}", from_id);
            return;
        }

        // Movement is judged against the previous stored fix, so the check
        // must run before this fix is written.
        if let Some(last) = self.db.get_last_position(from_id).await {
            if !(last.latitude == 0.0 && last.longitude == 0.0) {
                let distance = geo::haversine_m(last.latitude, last.longitude, new_lat, new_lon);
                if distance > self.movement_threshold_m {
                    let from_name = self.directory.display_name(from_id).await;
                    info!(
                        "MOVEMENT: {} moved {:.1} m from last position",
                        from_name, distance
                    );
                    self.emit(ChatEvent::Movement {
                        from_name: from_name.clone(),
                        distance_m: distance,
                        old_lat: last.latitude,
                        old_lon: last.longitude,
                        new_lat,
                        new_lon,
                        new_alt: frame.altitude,
                        timestamp: Utc::now(),
                    });
                    self.monitor.record(PacketSample {
                        port: "POSITION_APP".to_string(),
                        from_id: from_id.to_string(),
                        from_name,
                        detail: format!("moved {:.1} m", distance),
                        hops_away: packet.hops_away,
                        snr: packet.snr,
                        rssi: packet.rssi,
                        received_at: Utc::now(),
                    });
                }
            }
        }

        let sample = PositionSample {
            latitude: new_lat,
            longitude: new_lon,
            altitude: frame.altitude,
            speed: frame.speed,
            heading: frame.ground_track,
            accuracy: frame.precision_bits,
            source: "meshtastic".to_string(),
        };
        if self.db.add_position(from_id, &sample).await {
            debug!("Stored position for {}: {:.6}, {:.6}", from_id, new_lat, new_lon);
        }
    }

    async fn process_routing(&self, packet: &MeshPacket, frame: &RouteFrame, from_name: &str) {
        if frame.route.is_empty() && frame.route_back.is_empty() {
            debug!("Routing packet from {} carries no route data", from_name);
            return;
        }

        let to_name = match packet.to_id.as_deref() {
            Some(id) if !packet.is_broadcast() => self.directory.display_name(id).await,
            _ => "^all".to_string(),
        };

        let route_text = self.build_route_text(frame, from_name, &to_name).await;
        let hops_count = frame.route.len() + frame.route_back.len();

        self.emit(ChatEvent::Traceroute {
            from_name: from_name.to_string(),
            to_name: to_name.clone(),
            route_text: route_text.clone(),
            hops_count,
            timestamp: Utc::now(),
        });
        info!(
            "TRACEROUTE: {} → {} ({} hops)",
            from_name, to_name, hops_count
        );

        self.monitor.record(PacketSample {
            port: "ROUTING_APP".to_string(),
            from_id: packet.from_id.clone().unwrap_or_default(),
            from_name: from_name.to_string(),
            detail: format!("{} hops", hops_count),
            hops_away: packet.hops_away,
            snr: packet.snr,
            rssi: packet.rssi,
            received_at: Utc::now(),
        });

        let record = MessageRecord {
            from_node_id: packet.from_id.clone(),
            to_node_id: if packet.is_broadcast() {
                None
            } else {
                packet.to_id.clone()
            },
            message_text: Some(route_text),
            port_num: "ROUTING_APP".to_string(),
            payload: packet.raw_payload.clone(),
            hops_away: packet.hops_away,
            snr: packet.snr,
            rssi: packet.rssi,
        };
        if !self.db.add_message(&record).await {
            warn!("Failed to store traceroute observation");
        }
    }

    /// Forward path, then (when present) the return path, one line each.
    async fn build_route_text(
        &self,
        frame: &RouteFrame,
        from_name: &str,
        to_name: &str,
    ) -> String {
        let mut parts: Vec<String> = Vec::new();

        if !frame.route.is_empty() {
            parts.push(format!("Towards {}:", to_name));
            let mut line = from_name.to_string();
            for (i, node_num) in frame.route.iter().enumerate() {
                let hop_name = self.directory.display_name(&node_num_to_id(*node_num)).await;
                line.push_str(" → ");
                line.push_str(&hop_name);
                line.push_str(&snr_suffix(frame.snr_towards.get(i).copied()));
            }
            let dest_snr = if frame.snr_towards.len() > frame.route.len() {
                frame.snr_towards.last().copied()
            } else {
                None
            };
            line.push_str(" → ");
            line.push_str(to_name);
            line.push_str(&snr_suffix(dest_snr));
            parts.push(line);
        }

        if !frame.route_back.is_empty() {
            parts.push(format!("Back from {}:", to_name));
            let mut line = to_name.to_string();
            for (i, node_num) in frame.route_back.iter().enumerate() {
                let hop_name = self.directory.display_name(&node_num_to_id(*node_num)).await;
                line.push_str(" → ");
                line.push_str(&hop_name);
                line.push_str(&snr_suffix(frame.snr_back.get(i).copied()));
            }
            let origin_snr = if frame.snr_back.len() > frame.route_back.len() {
                frame.snr_back.last().copied()
            } else {
                None
            };
            line.push_str(" → ");
            line.push_str(from_name);
            line.push_str(&snr_suffix(origin_snr));
            parts.push(line);
        }

        parts.join("\n")
    }

    /// Push an event toward chat. A full queue is reported and the event
    /// dropped; producers never block.
    fn emit(&self, event: ChatEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("mesh→chat queue full; dropping event"),
            Err(TrySendError::Closed(_)) => debug!("mesh→chat queue closed; dropping event"),
        }
    }

    /// Push a payload toward the mesh (pong replies).
    fn enqueue_outbound(&self, payload: String) {
        match self.outbound.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("chat→mesh queue full; dropping reply"),
            Err(TrySendError::Closed(_)) => debug!("chat→mesh queue closed; dropping reply"),
        }
    }
}

/// A usable sender id: present, non-empty, and not the SDK's placeholder.
fn valid_sender(from_id: Option<&str>) -> Option<&str> {
    from_id.filter(|id| !id.is_empty() && *id != "Unknown")
}

/// Flatten the nested metric groups plus the envelope's link-quality fields
/// into one storable sample.
pub fn extract_telemetry(frame: &TelemetryFrame, packet: &MeshPacket) -> TelemetrySample {
    let mut sample = TelemetrySample::default();

    if let Some(device) = &frame.device_metrics {
        sample.battery_level = device.battery_level;
        sample.voltage = device.voltage;
        sample.channel_utilization = device.channel_utilization;
        sample.air_util_tx = device.air_util_tx;
        sample.uptime_seconds = device.uptime_seconds;
    }
    if let Some(env) = &frame.environment_metrics {
        sample.temperature = env.temperature;
        sample.humidity = env.relative_humidity;
        sample.pressure = env.barometric_pressure;
        sample.gas_resistance = env.gas_resistance;
    }
    if let Some(air) = &frame.air_quality_metrics {
        sample.pm10 = air.pm10_environmental;
        sample.pm25 = air.pm25_environmental;
        sample.pm100 = air.pm100_environmental;
        sample.iaq = air.aqi;
    }
    if let Some(power) = &frame.power_metrics {
        sample.ch1_voltage = power.ch1_voltage;
        sample.ch2_voltage = power.ch2_voltage;
        sample.ch3_voltage = power.ch3_voltage;
    }

    sample.snr = packet.snr;
    sample.rssi = packet.rssi;
    sample.frequency = packet.frequency;

    sample
}

/// Per-hop SNR rendered as dB; the `-128` sentinel means unknown and gets
/// no figure at all.
fn snr_suffix(snr: Option<i32>) -> String {
    match snr {
        Some(value) if value != UNK_SNR => format!(" ({:.1}dB)", value as f64 / 4.0),
        _ => String::new(),
    }
}
