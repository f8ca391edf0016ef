//! Append-only telemetry samples and windowed summaries.

use chrono::{Duration, Utc};
use sqlx::FromRow;

use super::{log_store_error, Database};

/// One extracted telemetry sample. Every field is optional; the pipeline
/// guarantees at least one is set before a sample reaches the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySample {
    // Device metrics
    pub battery_level: Option<f64>,
    pub voltage: Option<f64>,
    pub channel_utilization: Option<f64>,
    pub air_util_tx: Option<f64>,
    pub uptime_seconds: Option<f64>,
    // Environment metrics
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub gas_resistance: Option<f64>,
    pub iaq: Option<f64>,
    // Air quality metrics
    pub pm10: Option<f64>,
    pub pm25: Option<f64>,
    pub pm100: Option<f64>,
    // Power metrics
    pub ch1_voltage: Option<f64>,
    pub ch2_voltage: Option<f64>,
    pub ch3_voltage: Option<f64>,
    // Radio metrics from the packet envelope
    pub snr: Option<f64>,
    pub rssi: Option<f64>,
    pub frequency: Option<f64>,
    // Co-located position fix
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub accuracy: Option<f64>,
}

impl TelemetrySample {
    /// True when no field at all was extracted.
    pub fn is_empty(&self) -> bool {
        self.present_fields().is_empty()
    }

    /// Names of the fields carrying a value, in schema order. Used for the
    /// live-monitor buffer so operators can see which sensors reported.
    pub fn present_fields(&self) -> Vec<&'static str> {
        let pairs: [(&'static str, &Option<f64>); 25] = [
            ("battery_level", &self.battery_level),
            ("voltage", &self.voltage),
            ("channel_utilization", &self.channel_utilization),
            ("air_util_tx", &self.air_util_tx),
            ("uptime_seconds", &self.uptime_seconds),
            ("temperature", &self.temperature),
            ("humidity", &self.humidity),
            ("pressure", &self.pressure),
            ("gas_resistance", &self.gas_resistance),
            ("iaq", &self.iaq),
            ("pm10", &self.pm10),
            ("pm25", &self.pm25),
            ("pm100", &self.pm100),
            ("ch1_voltage", &self.ch1_voltage),
            ("ch2_voltage", &self.ch2_voltage),
            ("ch3_voltage", &self.ch3_voltage),
            ("snr", &self.snr),
            ("rssi", &self.rssi),
            ("frequency", &self.frequency),
            ("latitude", &self.latitude),
            ("longitude", &self.longitude),
            ("altitude", &self.altitude),
            ("speed", &self.speed),
            ("heading", &self.heading),
            ("accuracy", &self.accuracy),
        ];
        pairs
            .iter()
            .filter(|(_, value)| value.is_some())
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Aggregate over the telemetry table, zeroed/None when the store is empty.
#[derive(Debug, Clone, Default, FromRow)]
pub struct TelemetrySummary {
    pub total_nodes: i64,
    pub active_nodes: i64,
    pub avg_battery: Option<f64>,
    pub avg_temperature: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub avg_snr: Option<f64>,
    pub avg_rssi: Option<f64>,
}

impl Database {
    /// Append one telemetry sample for a node. Returns false on failure.
    pub async fn add_telemetry(&self, node_id: &str, sample: &TelemetrySample) -> bool {
        match self.try_add_telemetry(node_id, sample).await {
            Ok(()) => true,
            Err(err) => {
                log_store_error("adding telemetry", &err);
                false
            }
        }
    }

    async fn try_add_telemetry(&self, node_id: &str, sample: &TelemetrySample) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO telemetry (
                node_id, timestamp,
                battery_level, voltage, channel_utilization, air_util_tx, uptime_seconds,
                temperature, humidity, pressure, gas_resistance, iaq,
                pm10, pm25, pm100,
                ch1_voltage, ch2_voltage, ch3_voltage,
                snr, rssi, frequency,
                latitude, longitude, altitude, speed, heading, accuracy
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(node_id)
        .bind(Utc::now())
        .bind(sample.battery_level)
        .bind(sample.voltage)
        .bind(sample.channel_utilization)
        .bind(sample.air_util_tx)
        .bind(sample.uptime_seconds)
        .bind(sample.temperature)
        .bind(sample.humidity)
        .bind(sample.pressure)
        .bind(sample.gas_resistance)
        .bind(sample.iaq)
        .bind(sample.pm10)
        .bind(sample.pm25)
        .bind(sample.pm100)
        .bind(sample.ch1_voltage)
        .bind(sample.ch2_voltage)
        .bind(sample.ch3_voltage)
        .bind(sample.snr)
        .bind(sample.rssi)
        .bind(sample.frequency)
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(sample.altitude)
        .bind(sample.speed)
        .bind(sample.heading)
        .bind(sample.accuracy)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Telemetry summary for the trailing window. An empty store yields zero
    /// counts and `None` averages, never an error.
    pub async fn get_telemetry_summary(&self, minutes: i64) -> TelemetrySummary {
        let cutoff = Utc::now() - Duration::minutes(minutes);
        let result = sqlx::query_as::<_, TelemetrySummary>(
            r#"
            SELECT
                COUNT(DISTINCT n.node_id) as total_nodes,
                COUNT(DISTINCT CASE WHEN n.last_heard > ? THEN n.node_id END) as active_nodes,
                AVG(t.battery_level) as avg_battery,
                AVG(t.temperature) as avg_temperature,
                AVG(t.humidity) as avg_humidity,
                AVG(t.snr) as avg_snr,
                AVG(t.rssi) as avg_rssi
            FROM nodes n
            LEFT JOIN telemetry t ON n.node_id = t.node_id
            "#,
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(summary) => summary,
            Err(err) => {
                log_store_error("getting telemetry summary", &err);
                TelemetrySummary::default()
            }
        }
    }
}
