//! Background retention and compaction.
//!
//! A spawned task wakes once per maintenance interval (default hourly),
//! re-analyzes statistics, prunes rows past the retention window from the
//! three time-series tables, and VACUUMs once the file grows past a size
//! threshold. The cancellation flag is checked every 10 seconds so shutdown
//! never waits out a full interval.

use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use super::{log_store_error, Database};

/// Granularity of the cancellation check inside the wait loop.
const CANCEL_POLL: Duration = Duration::from_secs(10);
/// How long shutdown waits for a maintenance cycle to wind down.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Tuning for the background maintenance task.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Time between maintenance cycles.
    pub interval: Duration,
    /// Days of telemetry/position/message history to keep.
    pub retention_days: i64,
    /// Database size that triggers VACUUM, in megabytes.
    pub vacuum_threshold_mb: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            retention_days: 30,
            vacuum_threshold_mb: 100.0,
        }
    }
}

/// Handle used to stop the maintenance task.
pub struct MaintenanceHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Signal the task to stop and wait (bounded) for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if timeout(STOP_TIMEOUT, self.task).await.is_err() {
            warn!("Maintenance task did not stop within {:?}", STOP_TIMEOUT);
        } else {
            info!("Database maintenance stopped");
        }
    }
}

impl Database {
    /// Start the background maintenance task.
    pub fn start_maintenance(&self, config: MaintenanceConfig) -> MaintenanceHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let db = self.clone();

        let task = tokio::spawn(async move {
            info!(
                "Database maintenance task started (every {:?}, retention {} days)",
                config.interval, config.retention_days
            );
            loop {
                let slices = (config.interval.as_secs() / CANCEL_POLL.as_secs()).max(1);
                for _ in 0..slices {
                    tokio::select! {
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                        _ = sleep(CANCEL_POLL) => {}
                    }
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
                db.run_maintenance(&config).await;
            }
        });

        MaintenanceHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// One maintenance cycle: ANALYZE, prune, and VACUUM if oversized.
    pub async fn run_maintenance(&self, config: &MaintenanceConfig) {
        if let Err(err) = sqlx::query("ANALYZE").execute(&self.pool).await {
            log_store_error("analyzing database", &err);
        }

        self.cleanup_old_data(config.retention_days).await;

        match self.database_size_mb().await {
            Ok(size_mb) => {
                if size_mb > config.vacuum_threshold_mb {
                    info!("Running VACUUM to compact database ({:.1} MB)", size_mb);
                    if let Err(err) = sqlx::query("VACUUM").execute(&self.pool).await {
                        log_store_error("vacuuming database", &err);
                    }
                }
            }
            Err(err) => log_store_error("checking database size", &err),
        }

        info!("Database maintenance completed");
    }

    async fn database_size_mb(&self) -> sqlx::Result<f64> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        Ok((page_count * page_size) as f64 / (1024.0 * 1024.0))
    }

    /// Prune telemetry, position, and message rows older than the retention
    /// window. Returns `(telemetry, positions, messages)` rows deleted.
    pub async fn cleanup_old_data(&self, retention_days: i64) -> (u64, u64, u64) {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let mut deleted = (0u64, 0u64, 0u64);

        match sqlx::query("DELETE FROM telemetry WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
        {
            Ok(result) => deleted.0 = result.rows_affected(),
            Err(err) => {
                log_store_error("cleaning up telemetry", &err);
                return deleted;
            }
        }

        match sqlx::query("DELETE FROM positions WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
        {
            Ok(result) => deleted.1 = result.rows_affected(),
            Err(err) => {
                log_store_error("cleaning up positions", &err);
                return deleted;
            }
        }

        match sqlx::query("DELETE FROM messages WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
        {
            Ok(result) => deleted.2 = result.rows_affected(),
            Err(err) => {
                log_store_error("cleaning up messages", &err);
                return deleted;
            }
        }

        info!(
            "Cleaned up {} telemetry, {} positions, {} messages",
            deleted.0, deleted.1, deleted.2
        );
        deleted
    }
}
