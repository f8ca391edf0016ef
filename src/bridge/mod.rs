//! # Bridge Queue Core
//!
//! Two bounded FIFO queues connect the mesh and chat sides:
//!
//! - **mesh→chat** carries [`ChatEvent`]s produced by the packet pipeline
//!   and the roster refresh;
//! - **chat→mesh** carries plain text payloads, either broadcasts or
//!   `nodenum=<id> <text>` addressed sends.
//!
//! A single drain loop ticks once a second and, in order: sends up to a
//! batch of mesh→chat events to the chat transport, fully drains chat→mesh
//! into the radio's send primitive, refreshes the node roster when due, and
//! runs the periodic cache-clear/retention pass. A second loop watches for
//! wall-clock hour boundaries and queues one telemetry summary per hour.
//!
//! Producers never block: a full queue surfaces
//! [`EnqueueError::QueueFull`] immediately so the caller can tell the user.
//! Within one queue FIFO order holds; the two queues are not ordered
//! relative to each other. Failed transport sends are logged and dropped —
//! there is no retry or re-queue.

use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::chat::ChatTransport;
use crate::config::Config;
use crate::db::Database;
use crate::directory::NodeDirectory;
use crate::logutil::escape_log;
use crate::mesh::{normalize_node, snapshot_position, snapshot_telemetry, MeshPacket, MeshTransport};

pub mod event;
pub mod monitor;
pub mod pipeline;

pub use event::{render, ChatEvent, RenderOptions};
pub use monitor::{PacketMonitor, PacketSample, MONITOR_CAPACITY};
pub use pipeline::PacketProcessor;

/// Why an enqueue was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("queue is full, try again")]
    QueueFull,
    #[error("bridge is shut down")]
    Closed,
}

/// Bridge scheduling and sizing parameters.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Chat channel relayed mesh traffic lands in.
    pub channel_id: u64,
    /// Capacity of each queue.
    pub queue_capacity: usize,
    /// Events sent per drain tick.
    pub drain_batch_size: usize,
    /// Drain loop cadence.
    pub tick_interval: Duration,
    /// Node roster refresh cadence.
    pub node_refresh_interval: Duration,
    /// Cache-clear + retention pass cadence.
    pub cleanup_interval: Duration,
    /// Movement notification threshold in meters.
    pub movement_threshold_m: f64,
    /// Retention window applied during the cleanup pass.
    pub retention_days: i64,
    /// Window for the hourly telemetry summary, in minutes.
    pub summary_window_minutes: i64,
    /// Rendering options for outgoing chat lines.
    pub render: RenderOptions,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            channel_id: 0,
            queue_capacity: 1000,
            drain_batch_size: 10,
            tick_interval: Duration::from_secs(1),
            node_refresh_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(300),
            movement_threshold_m: 100.0,
            retention_days: 30,
            summary_window_minutes: 60,
            render: RenderOptions::default(),
        }
    }
}

impl BridgeConfig {
    /// Derive bridge parameters from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        BridgeConfig {
            channel_id: config.chat.channel_id,
            queue_capacity: config.bridge.queue_capacity,
            drain_batch_size: config.bridge.drain_batch_size,
            tick_interval: Duration::from_secs(config.bridge.tick_seconds.max(1)),
            node_refresh_interval: Duration::from_secs(config.bridge.node_refresh_seconds),
            cleanup_interval: Duration::from_secs(config.bridge.cleanup_seconds),
            movement_threshold_m: config.bridge.movement_threshold_meters,
            retention_days: config.database.retention_days,
            summary_window_minutes: config.bridge.active_node_threshold_minutes,
            render: RenderOptions {
                broadcast_label: config.chat.broadcast_label.clone(),
                max_message_length: config.chat.max_message_length,
            },
        }
    }
}

/// Producer-side handle onto the bridge queues. Cheap to clone.
#[derive(Clone)]
pub struct BridgeHandle {
    events: mpsc::Sender<ChatEvent>,
    outbound: mpsc::Sender<String>,
}

impl BridgeHandle {
    /// Queue text for the mesh: a broadcast, or an addressed direct message
    /// when `destination` names a node id. Non-blocking; a full queue is
    /// reported immediately.
    pub fn enqueue_outbound(
        &self,
        text: &str,
        destination: Option<&str>,
    ) -> Result<(), EnqueueError> {
        let payload = match destination {
            Some(dest) => format!("nodenum={} {}", dest, text),
            None => text.to_string(),
        };
        self.outbound.try_send(payload).map_err(enqueue_error)
    }

    /// Queue an event for the chat side.
    pub fn enqueue_event(&self, event: ChatEvent) -> Result<(), EnqueueError> {
        self.events.try_send(event).map_err(enqueue_error)
    }
}

fn enqueue_error<T>(err: TrySendError<T>) -> EnqueueError {
    match err {
        TrySendError::Full(_) => EnqueueError::QueueFull,
        TrySendError::Closed(_) => EnqueueError::Closed,
    }
}

/// The relay core: owns both queue consumers and the transports.
pub struct Bridge<M: MeshTransport, C: ChatTransport> {
    config: BridgeConfig,
    db: Database,
    directory: NodeDirectory,
    monitor: PacketMonitor,
    processor: PacketProcessor,
    mesh: M,
    chat: C,
    events_rx: mpsc::Receiver<ChatEvent>,
    outbound_rx: mpsc::Receiver<String>,
    handle: BridgeHandle,
    last_node_refresh: Option<Instant>,
    last_cleanup: Instant,
}

impl<M: MeshTransport, C: ChatTransport> Bridge<M, C> {
    /// Wire up queues, directory, monitor, and pipeline around the given
    /// transports. Returns the bridge and a producer handle.
    pub fn new(config: BridgeConfig, db: Database, mesh: M, chat: C) -> (Self, BridgeHandle) {
        let (events_tx, events_rx) = mpsc::channel(config.queue_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.queue_capacity);
        let handle = BridgeHandle {
            events: events_tx.clone(),
            outbound: outbound_tx.clone(),
        };

        let directory = NodeDirectory::new(db.clone());
        let monitor = PacketMonitor::default();
        let processor = PacketProcessor::new(
            db.clone(),
            directory.clone(),
            monitor.clone(),
            events_tx,
            outbound_tx,
            config.movement_threshold_m,
        );

        let bridge = Bridge {
            config,
            db,
            directory,
            monitor,
            processor,
            mesh,
            chat,
            events_rx,
            outbound_rx,
            handle: handle.clone(),
            last_node_refresh: None,
            last_cleanup: Instant::now(),
        };
        (bridge, handle)
    }

    pub fn handle(&self) -> BridgeHandle {
        self.handle.clone()
    }

    pub fn directory(&self) -> &NodeDirectory {
        &self.directory
    }

    pub fn monitor(&self) -> &PacketMonitor {
        &self.monitor
    }

    /// The packet pipeline, shareable with transport glue that delivers
    /// decoded packets outside of [`Bridge::run`].
    pub fn processor(&self) -> PacketProcessor {
        self.processor.clone()
    }

    /// Drive the bridge until shutdown flips. Decoded packets from
    /// `packets` run through the pipeline as they arrive; queue draining and
    /// periodic work happen on the tick.
    pub async fn run(
        mut self,
        mut packets: mpsc::Receiver<MeshPacket>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Bridge loop started");
        let mut tick = interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut packets_open = true;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                packet = packets.recv(), if packets_open => {
                    match packet {
                        Some(packet) => self.processor.process(packet).await,
                        None => packets_open = false,
                    }
                }
                _ = tick.tick() => {
                    self.tick().await;
                }
            }
        }
        info!("Bridge loop stopped");
    }

    /// One drain cycle: batch mesh→chat, full chat→mesh, then the periodic
    /// refresh and cleanup work when due.
    pub async fn tick(&mut self) {
        self.drain_mesh_to_chat().await;
        self.drain_chat_to_mesh().await;
        self.maybe_refresh_nodes().await;
        self.maybe_run_cleanup().await;
    }

    /// Send up to one batch of queued events to the chat transport. A
    /// failed send drops that event and moves on. Returns how many events
    /// were taken off the queue.
    pub async fn drain_mesh_to_chat(&mut self) -> usize {
        let mut drained = 0;
        while drained < self.config.drain_batch_size {
            let chat_event = match self.events_rx.try_recv() {
                Ok(chat_event) => chat_event,
                Err(_) => break,
            };
            drained += 1;
            let message = render(&chat_event, &self.config.render);
            if !self.chat.send(self.config.channel_id, &message).await {
                warn!("Chat send failed; dropping event");
            }
        }
        drained
    }

    /// Fully drain chat→mesh. `nodenum=<id> <text>` payloads become
    /// addressed sends with broadcast as the fallback; everything else
    /// broadcasts. Returns how many payloads were taken off the queue.
    pub async fn drain_chat_to_mesh(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(item) = self.outbound_rx.try_recv() {
            drained += 1;
            if let Some(rest) = item.strip_prefix("nodenum=") {
                match rest.split_once(' ') {
                    Some((node_id, text)) if !node_id.is_empty() => {
                        info!("MESH: sending direct message to node {}", node_id);
                        if !self.mesh.send_text(text, Some(node_id)).await {
                            warn!(
                                "Direct send to {} failed; falling back to broadcast",
                                node_id
                            );
                            if !self.mesh.send_text(text, None).await {
                                warn!("Broadcast fallback failed; dropping payload");
                            }
                        }
                    }
                    _ => {
                        debug!(
                            "Dropping malformed addressed payload: {}",
                            escape_log(&item)
                        );
                    }
                }
                continue;
            }

            info!("MESH: sending broadcast to primary channel");
            if !self.mesh.send_text(&item, None).await {
                warn!("Broadcast send failed; dropping payload");
            }
        }
        drained
    }

    async fn maybe_refresh_nodes(&mut self) {
        let due = match self.last_node_refresh {
            None => true,
            Some(at) => at.elapsed() >= self.config.node_refresh_interval,
        };
        if due {
            self.refresh_nodes().await;
        }
    }

    /// Enumerate the radio's node table, upsert every entry, capture any
    /// inline telemetry/fix data, and queue a new-node event per node seen
    /// for the first time. Returns `(processed, new)`.
    pub async fn refresh_nodes(&mut self) -> (usize, usize) {
        self.last_node_refresh = Some(Instant::now());

        let nodes = self.mesh.nodes().await;
        if nodes.is_empty() {
            debug!("No nodes available to process");
            return (0, 0);
        }
        info!("Processing {} nodes from mesh interface", nodes.len());

        let mut processed = 0;
        let mut discovered = 0;
        for (node_id, snapshot) in &nodes {
            let upsert = normalize_node(node_id, snapshot);
            let (ok, is_new) = self.db.upsert_node(&upsert).await;
            if !ok {
                continue;
            }
            processed += 1;

            if is_new {
                discovered += 1;
                info!("New node added: {} ({})", upsert.long_name, upsert.node_id);
                let chat_event = ChatEvent::NewNode {
                    node_id: upsert.node_id.clone(),
                    long_name: upsert.long_name.clone(),
                    short_name: upsert.short_name.clone(),
                    hw_model: upsert.hw_model.clone(),
                    timestamp: Utc::now(),
                };
                if self.handle.enqueue_event(chat_event).is_err() {
                    warn!("mesh→chat queue full; dropping new-node event");
                }
            }

            let telemetry = snapshot_telemetry(snapshot);
            if !telemetry.is_empty() {
                self.db.add_telemetry(node_id, &telemetry).await;
            }
            if let Some(position) = snapshot_position(snapshot) {
                self.db.add_position(node_id, &position).await;
            }
        }

        info!("Processed {} nodes, {} new", processed, discovered);
        (processed, discovered)
    }

    async fn maybe_run_cleanup(&mut self) {
        if self.last_cleanup.elapsed() < self.config.cleanup_interval {
            return;
        }
        self.last_cleanup = Instant::now();
        self.directory.clear_cache();
        self.db.cleanup_old_data(self.config.retention_days).await;
        debug!("Periodic cleanup completed");
    }
}

/// Detects wall-clock hour boundaries for the summary loop.
#[derive(Debug)]
pub struct HourlyTicker {
    last_hour: u32,
}

impl HourlyTicker {
    pub fn new(now: DateTime<Utc>) -> Self {
        HourlyTicker {
            last_hour: now.hour(),
        }
    }

    /// True exactly once per new hour.
    pub fn should_emit(&mut self, now: DateTime<Utc>) -> bool {
        let hour = now.hour();
        if hour != self.last_hour {
            self.last_hour = hour;
            true
        } else {
            false
        }
    }
}

/// Secondary loop: checks the clock every minute and queues one telemetry
/// summary per hour boundary.
pub async fn run_hourly_summary(
    db: Database,
    handle: BridgeHandle,
    summary_window_minutes: i64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = HourlyTicker::new(Utc::now());
    let mut minute = interval(Duration::from_secs(60));
    minute.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = minute.tick() => {
                if ticker.should_emit(Utc::now()) {
                    let summary = db.get_telemetry_summary(summary_window_minutes).await;
                    match handle.enqueue_event(ChatEvent::TelemetrySummary(summary)) {
                        Ok(()) => info!("Queued hourly telemetry summary"),
                        Err(err) => warn!("Could not queue telemetry summary: {}", err),
                    }
                }
            }
        }
    }
    debug!("Hourly summary loop stopped");
}

#[cfg(test)]
mod tests {
    use super::HourlyTicker;
    use chrono::{TimeZone, Utc};

    #[test]
    fn ticker_fires_once_per_hour_boundary() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 14, 59, 0).unwrap();
        let mut ticker = HourlyTicker::new(start);

        assert!(!ticker.should_emit(Utc.with_ymd_and_hms(2025, 6, 1, 14, 59, 30).unwrap()));
        assert!(ticker.should_emit(Utc.with_ymd_and_hms(2025, 6, 1, 15, 0, 10).unwrap()));
        assert!(!ticker.should_emit(Utc.with_ymd_and_hms(2025, 6, 1, 15, 30, 0).unwrap()));
        assert!(ticker.should_emit(Utc.with_ymd_and_hms(2025, 6, 1, 16, 0, 0).unwrap()));
    }
}
