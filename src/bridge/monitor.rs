//! Bounded ring buffer of recent packet activity.
//!
//! The command layer reads this for its live-monitor view. Capacity is
//! small and fixed; once full, the oldest entry is dropped on append. One
//! lock guards append, trim, and snapshot.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Entries kept before the oldest is dropped.
pub const MONITOR_CAPACITY: usize = 50;

/// One line of recent-activity history.
#[derive(Debug, Clone)]
pub struct PacketSample {
    /// Port-type tag of the packet that produced this entry.
    pub port: String,
    pub from_id: String,
    pub from_name: String,
    /// Short human-readable summary (text preview, metric keys, route hops).
    pub detail: String,
    pub hops_away: i64,
    pub snr: Option<f64>,
    pub rssi: Option<f64>,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PacketMonitor {
    buffer: Arc<Mutex<VecDeque<PacketSample>>>,
    capacity: usize,
}

impl Default for PacketMonitor {
    fn default() -> Self {
        Self::new(MONITOR_CAPACITY)
    }
}

impl PacketMonitor {
    pub fn new(capacity: usize) -> Self {
        PacketMonitor {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Append one entry, dropping the oldest when full.
    pub fn record(&self, sample: PacketSample) {
        if let Ok(mut buffer) = self.buffer.lock() {
            if buffer.len() >= self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(sample);
        }
    }

    /// Copy of the buffered entries, oldest first.
    pub fn snapshot(&self) -> Vec<PacketSample> {
        self.buffer
            .lock()
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().map(|buffer| buffer.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::{PacketMonitor, PacketSample};
    use chrono::Utc;

    fn sample(n: usize) -> PacketSample {
        PacketSample {
            port: "TEXT_MESSAGE_APP".into(),
            from_id: format!("!{:08x}", n),
            from_name: format!("node{}", n),
            detail: String::new(),
            hops_away: 0,
            snr: None,
            rssi: None,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn drops_oldest_beyond_capacity() {
        let monitor = PacketMonitor::new(3);
        for n in 0..5 {
            monitor.record(sample(n));
        }
        let entries = monitor.snapshot();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].from_name, "node2");
        assert_eq!(entries[2].from_name, "node4");
    }

    #[test]
    fn default_capacity_is_fifty() {
        let monitor = PacketMonitor::default();
        for n in 0..60 {
            monitor.record(sample(n));
        }
        assert_eq!(monitor.len(), 50);
    }
}
