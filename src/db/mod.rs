//! # Store - SQLite Persistence Layer
//!
//! Pooled, durable persistence for everything the bridge observes on the
//! mesh: the node roster, telemetry samples, position samples, and message
//! history.
//!
//! ## Durability Model
//!
//! Connections run in WAL journal mode with `synchronous = NORMAL`,
//! favouring relay throughput over fsync-per-write. The pool is capped at
//! five connections; logical operations check a connection out, run inside a
//! transaction, and return it on success. A transaction dropped on failure
//! rolls back, and broken connections are discarded by the pool rather than
//! reused.
//!
//! ## Error Model
//!
//! No store error escapes this module. Every public method wraps an inner
//! fallible helper, logs the failure by category, and degrades to
//! `(false, false)` / `false` / `None` / an empty collection, so callers
//! never need error handling around store access. The single exception is
//! [`Database::open`]: failing to open the store at startup is fatal to the
//! process by design.
//!
//! ## Submodules
//!
//! - [`schema`] - table/index creation and additive column migration
//! - [`nodes`] - node roster upsert and lookup
//! - [`telemetry`] - append-only telemetry samples and summaries
//! - [`positions`] - append-only position samples
//! - [`messages`] - message history, statistics, topology aggregation
//! - [`maintenance`] - background retention/compaction task

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

pub mod maintenance;
pub mod messages;
pub mod nodes;
pub mod positions;
pub mod schema;
pub mod telemetry;

pub use maintenance::{MaintenanceConfig, MaintenanceHandle};
pub use messages::{
    MessageRecord, MessageStatistics, MessageView, NetworkTopology, RouteObservation, TopologyLink,
};
pub use nodes::{NodeOverview, NodeRow, NodeUpsert};
pub use positions::{PositionRow, PositionSample};
pub use telemetry::{TelemetrySample, TelemetrySummary};

/// Maximum pooled connections.
const MAX_CONNECTIONS: u32 = 5;
/// How long a caller waits for a pooled connection before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to the SQLite store. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the store at `path`, apply the schema, and run any
    /// pending additive migrations.
    pub async fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // The FOREIGN KEY clauses in the schema document node relationships,
            // but observations (messages/telemetry/positions) are routinely
            // logged for nodes heard before their NodeInfo arrives, so the
            // constraints are not enforced at the connection level. sqlx
            // enables PRAGMA foreign_keys by default; turn it back off to match.
            .foreign_keys(false)
            .pragma("cache_size", "-2000")
            .pragma("temp_store", "MEMORY");

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .with_context(|| format!("opening database {}", path))?;

        schema::initialize(&pool)
            .await
            .with_context(|| format!("initializing schema in {}", path))?;

        info!("Database ready at {}", path);
        Ok(Database { pool })
    }

    /// Direct pool access for administrative queries outside the store's
    /// contract (status tooling, tests).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all pooled connections. Idempotent.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("All database connections closed");
    }
}

/// Log a store failure by category. Mirrors the split between transient
/// connectivity problems and structural/database errors.
pub(crate) fn log_store_error(operation: &str, err: &sqlx::Error) {
    match err {
        sqlx::Error::Database(db_err) => {
            error!("Database error {}: {}", operation, db_err);
        }
        sqlx::Error::Io(io_err) => {
            error!("Database connection error {}: {}", operation, io_err);
        }
        sqlx::Error::PoolTimedOut => {
            error!("Database pool exhausted while {}", operation);
        }
        other => {
            error!("Unexpected database error {}: {}", operation, other);
        }
    }
}
