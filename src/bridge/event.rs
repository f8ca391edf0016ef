//! Events relayed from the mesh into chat, and their rendering.
//!
//! The pipeline produces [`ChatEvent`]s; the drain loop renders each into a
//! [`ChatMessage`] right before handing it to the chat transport. Rendering
//! here is deliberately plain — the richer command-surface formatting lives
//! outside the bridge.

use chrono::{DateTime, Utc};

use crate::chat::ChatMessage;
use crate::db::TelemetrySummary;

/// One unit of mesh→chat traffic.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A relayed text message.
    Text {
        from_id: String,
        from_name: String,
        to_name: String,
        broadcast: bool,
        text: String,
        hops_away: i64,
        snr: Option<f64>,
        rssi: Option<f64>,
        timestamp: DateTime<Utc>,
    },
    /// A node moved further than the configured threshold between fixes.
    Movement {
        from_name: String,
        distance_m: f64,
        old_lat: f64,
        old_lon: f64,
        new_lat: f64,
        new_lon: f64,
        new_alt: Option<f64>,
        timestamp: DateTime<Utc>,
    },
    /// A route-discovery result heard on the mesh.
    Traceroute {
        from_name: String,
        to_name: String,
        route_text: String,
        hops_count: usize,
        timestamp: DateTime<Utc>,
    },
    /// A node seen for the first time during a roster refresh.
    NewNode {
        node_id: String,
        long_name: String,
        short_name: Option<String>,
        hw_model: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Hourly telemetry roll-up.
    TelemetrySummary(TelemetrySummary),
}

/// Render settings carried by the drain loop.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Name shown when a message is addressed to everyone.
    pub broadcast_label: String,
    /// Hard cap on rendered text lines.
    pub max_message_length: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            broadcast_label: "Primary Channel".to_string(),
            max_message_length: 2000,
        }
    }
}

/// Render one event for the chat transport.
pub fn render(event: &ChatEvent, options: &RenderOptions) -> ChatMessage {
    match event {
        ChatEvent::Text {
            from_name,
            to_name,
            broadcast,
            text,
            hops_away,
            ..
        } => {
            let destination = if *broadcast {
                options.broadcast_label.as_str()
            } else {
                to_name.as_str()
            };
            let line = format!(
                "{} → {} ({} hops): {}",
                from_name, destination, hops_away, text
            );
            ChatMessage::Text(truncate(&line, options.max_message_length))
        }
        ChatEvent::Movement {
            from_name,
            distance_m,
            old_lat,
            old_lon,
            new_lat,
            new_lon,
            new_alt,
            ..
        } => {
            let mut body = format!(
                "{} moved {:.1} m\nfrom {:.6}, {:.6}\nto   {:.6}, {:.6}",
                from_name, distance_m, old_lat, old_lon, new_lat, new_lon
            );
            if let Some(alt) = new_alt {
                if *alt != 0.0 {
                    body.push_str(&format!("\naltitude {:.0} m", alt));
                }
            }
            ChatMessage::Notice {
                title: "Node is on the move".to_string(),
                body,
            }
        }
        ChatEvent::Traceroute {
            from_name,
            to_name,
            route_text,
            hops_count,
            ..
        } => ChatMessage::Notice {
            title: "Traceroute result".to_string(),
            body: format!(
                "{} traced route to {} ({} hops)\n{}",
                from_name, to_name, hops_count, route_text
            ),
        },
        ChatEvent::NewNode {
            node_id,
            long_name,
            short_name,
            hw_model,
            ..
        } => {
            let mut body = format!("{} ({})", long_name, node_id);
            if let Some(short) = short_name.as_deref().filter(|s| !s.is_empty()) {
                body.push_str(&format!(" [{}]", short));
            }
            if let Some(hw) = hw_model.as_deref() {
                body.push_str(&format!("\nhardware: {}", hw));
            }
            ChatMessage::Notice {
                title: "New node discovered".to_string(),
                body,
            }
        }
        ChatEvent::TelemetrySummary(summary) => ChatMessage::Notice {
            title: "Hourly mesh summary".to_string(),
            body: format!(
                "nodes: {} total, {} active\nbattery: {}\ntemperature: {}\nhumidity: {}\nSNR: {}\nRSSI: {}",
                summary.total_nodes,
                summary.active_nodes,
                fmt_avg(summary.avg_battery, "%"),
                fmt_avg(summary.avg_temperature, "°C"),
                fmt_avg(summary.avg_humidity, "%"),
                fmt_avg(summary.avg_snr, " dB"),
                fmt_avg(summary.avg_rssi, " dBm"),
            ),
        },
    }
}

fn fmt_avg(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, unit),
        None => "n/a".to_string(),
    }
}

/// Cap a rendered line, respecting UTF-8 boundaries.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}
