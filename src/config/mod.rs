//! # Configuration Management Module
//!
//! Centralized configuration for the bridge, with validation, defaults, and
//! TOML persistence.
//!
//! ## Configuration Structure
//!
//! - [`BridgeSection`] - Queue sizing, drain batching, refresh/cleanup cadence
//! - [`MeshSection`] - Radio transport settings
//! - [`ChatSection`] - Chat channel settings
//! - [`DatabaseSection`] - Store path, pool size, retention and maintenance
//! - [`LoggingSection`] - Log level and optional file sink
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshgate::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("meshgate.toml").await?;
//!     println!("channel: {}", config.chat.channel_id);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [bridge]
//! queue_capacity = 1000
//! drain_batch_size = 10
//! node_refresh_seconds = 60
//!
//! [chat]
//! channel_id = 123456789
//!
//! [database]
//! path = "meshgate.db"
//! retention_days = 30
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Bridge queue and scheduling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSection {
    /// Capacity of each relay queue (mesh→chat and chat→mesh).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Maximum mesh→chat events rendered and sent per drain tick.
    #[serde(default = "default_drain_batch_size")]
    pub drain_batch_size: usize,
    /// Drain loop tick interval in seconds.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    /// How often the radio's node table is re-enumerated, in seconds.
    #[serde(default = "default_node_refresh_seconds")]
    pub node_refresh_seconds: u64,
    /// Cache-clear + retention pass interval in seconds.
    #[serde(default = "default_cleanup_seconds")]
    pub cleanup_seconds: u64,
    /// Distance in meters a node must move between fixes to trigger a
    /// movement notification.
    #[serde(default = "default_movement_threshold")]
    pub movement_threshold_meters: f64,
    /// Window, in minutes, used when summarizing "active" nodes.
    #[serde(default = "default_active_minutes")]
    pub active_node_threshold_minutes: i64,
}

/// Radio transport settings. The transport itself is provided by an external
/// SDK; only the connection coordinates live here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MeshSection {
    /// Hostname of a TCP-attached radio, or empty to run detached.
    #[serde(default)]
    pub host: String,
}

/// Chat transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSection {
    /// Channel that receives relayed mesh traffic.
    #[serde(default)]
    pub channel_id: u64,
    /// Label used when a mesh message is addressed to everyone.
    #[serde(default = "default_broadcast_label")]
    pub broadcast_label: String,
    /// Hard cap applied to rendered chat lines.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
}

/// Store location and maintenance knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Days of telemetry/position/message history to keep.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Background maintenance cycle in seconds.
    #[serde(default = "default_maintenance_seconds")]
    pub maintenance_interval_seconds: u64,
    /// Database size that triggers VACUUM during maintenance, in megabytes.
    #[serde(default = "default_vacuum_threshold")]
    pub vacuum_threshold_mb: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file; stdout is used as well when attached to a TTY.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub mesh: MeshSection,
    #[serde(default)]
    pub chat: ChatSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

fn default_queue_capacity() -> usize {
    1000
}
fn default_drain_batch_size() -> usize {
    10
}
fn default_tick_seconds() -> u64 {
    1
}
fn default_node_refresh_seconds() -> u64 {
    60
}
fn default_cleanup_seconds() -> u64 {
    300
}
fn default_movement_threshold() -> f64 {
    100.0
}
fn default_active_minutes() -> i64 {
    60
}
fn default_broadcast_label() -> String {
    "Primary Channel".to_string()
}
fn default_max_message_length() -> usize {
    2000
}
fn default_db_path() -> String {
    "meshgate.db".to_string()
}
fn default_retention_days() -> i64 {
    30
}
fn default_maintenance_seconds() -> u64 {
    3600
}
fn default_vacuum_threshold() -> f64 {
    100.0
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            drain_batch_size: default_drain_batch_size(),
            tick_seconds: default_tick_seconds(),
            node_refresh_seconds: default_node_refresh_seconds(),
            cleanup_seconds: default_cleanup_seconds(),
            movement_threshold_meters: default_movement_threshold(),
            active_node_threshold_minutes: default_active_minutes(),
        }
    }
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            channel_id: 0,
            broadcast_label: default_broadcast_label(),
            max_message_length: default_max_message_length(),
        }
    }
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            retention_days: default_retention_days(),
            maintenance_interval_seconds: default_maintenance_seconds(),
            vacuum_threshold_mb: default_vacuum_threshold(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge: BridgeSection::default(),
            mesh: MeshSection::default(),
            chat: ChatSection::default(),
            database: DatabaseSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("cannot read config file {}: {}", path, e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| anyhow!("invalid config {}: {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Write a default configuration file.
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config)?;
        fs::write(path, serialized).await?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.bridge.queue_capacity == 0 {
            return Err(anyhow!("bridge.queue_capacity must be at least 1"));
        }
        if self.bridge.drain_batch_size == 0 {
            return Err(anyhow!("bridge.drain_batch_size must be at least 1"));
        }
        if self.bridge.movement_threshold_meters < 0.0 {
            return Err(anyhow!("bridge.movement_threshold_meters cannot be negative"));
        }
        if self.database.retention_days <= 0 {
            return Err(anyhow!("database.retention_days must be positive"));
        }
        if self.database.path.trim().is_empty() {
            return Err(anyhow!("database.path cannot be empty"));
        }
        match self.logging.level.to_ascii_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => return Err(anyhow!("unknown logging.level '{}'", other)),
        }
        Ok(())
    }
}
