//! Table, index, and additive-migration definitions.
//!
//! Schema evolution is additive-only: new telemetry columns are appended via
//! `ALTER TABLE ADD COLUMN` from a whitelist; no column is ever dropped or
//! renamed, so older databases keep working after an upgrade.

use log::{info, warn};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

/// Telemetry columns introduced after the initial release. Databases created
/// before these existed gain them on startup.
pub const TELEMETRY_MIGRATION_COLUMNS: &[(&str, &str)] = &[
    ("channel_utilization", "REAL"),
    ("air_util_tx", "REAL"),
    ("uptime_seconds", "REAL"),
    ("pm10", "REAL"),
    ("pm25", "REAL"),
    ("pm100", "REAL"),
    ("ch1_voltage", "REAL"),
    ("ch2_voltage", "REAL"),
    ("ch3_voltage", "REAL"),
    ("ch1_current", "REAL"),
    ("ch2_current", "REAL"),
    ("ch3_current", "REAL"),
];

/// Create all tables and indexes, then bring older databases up to date.
pub async fn initialize(pool: &SqlitePool) -> sqlx::Result<()> {
    create_tables(pool).await?;
    create_indexes(pool).await?;
    migrate_telemetry_table(pool).await?;
    info!("Database schema initialized");
    Ok(())
}

async fn create_tables(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS nodes (
            node_id TEXT PRIMARY KEY,
            node_num INTEGER,
            long_name TEXT NOT NULL,
            short_name TEXT,
            macaddr TEXT,
            hw_model TEXT,
            firmware_version TEXT,
            first_seen TIMESTAMP NOT NULL,
            last_seen TIMESTAMP NOT NULL,
            last_heard TIMESTAMP,
            hops_away INTEGER DEFAULT 0,
            is_router BOOLEAN DEFAULT FALSE,
            is_client BOOLEAN DEFAULT TRUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS telemetry (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id TEXT NOT NULL,
            timestamp TIMESTAMP NOT NULL,
            -- Device metrics
            battery_level REAL,
            voltage REAL,
            channel_utilization REAL,
            air_util_tx REAL,
            uptime_seconds REAL,
            -- Environment metrics
            temperature REAL,
            humidity REAL,
            pressure REAL,
            gas_resistance REAL,
            iaq REAL,
            -- Air quality metrics
            pm10 REAL,
            pm25 REAL,
            pm100 REAL,
            -- Power metrics
            ch1_voltage REAL,
            ch2_voltage REAL,
            ch3_voltage REAL,
            ch1_current REAL,
            ch2_current REAL,
            ch3_current REAL,
            -- Radio metrics
            snr REAL,
            rssi REAL,
            frequency REAL,
            -- Co-located position fix
            latitude REAL,
            longitude REAL,
            altitude REAL,
            speed REAL,
            heading REAL,
            accuracy REAL,
            FOREIGN KEY (node_id) REFERENCES nodes (node_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS positions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id TEXT NOT NULL,
            timestamp TIMESTAMP NOT NULL,
            latitude REAL,
            longitude REAL,
            altitude REAL,
            speed REAL,
            heading REAL,
            accuracy REAL,
            source TEXT,
            FOREIGN KEY (node_id) REFERENCES nodes (node_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            from_node_id TEXT,
            to_node_id TEXT,
            timestamp TIMESTAMP NOT NULL,
            message_text TEXT,
            port_num TEXT,
            payload TEXT,
            hops_away INTEGER,
            snr REAL,
            rssi REAL,
            FOREIGN KEY (from_node_id) REFERENCES nodes (node_id),
            FOREIGN KEY (to_node_id) REFERENCES nodes (node_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> sqlx::Result<()> {
    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_nodes_last_heard ON nodes (last_heard)",
        "CREATE INDEX IF NOT EXISTS idx_nodes_long_name ON nodes (long_name)",
        "CREATE INDEX IF NOT EXISTS idx_telemetry_timestamp ON telemetry (timestamp)",
        "CREATE INDEX IF NOT EXISTS idx_positions_timestamp ON positions (timestamp)",
        "CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages (timestamp)",
    ];
    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }
    Ok(())
}

/// Add any whitelisted telemetry columns missing from an older database.
pub async fn migrate_telemetry_table(pool: &SqlitePool) -> sqlx::Result<()> {
    let rows = sqlx::query("PRAGMA table_info(telemetry)")
        .fetch_all(pool)
        .await?;
    let existing: Vec<String> = rows
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .collect();

    for (column_name, column_type) in TELEMETRY_MIGRATION_COLUMNS {
        if existing.iter().any(|c| c == column_name) {
            continue;
        }
        if !is_safe_identifier(column_name) {
            warn!("Skipping invalid column name: {}", column_name);
            continue;
        }
        // Identifier is whitelisted and validated; safe to splice.
        let sql = format!("ALTER TABLE telemetry ADD COLUMN {} {}", column_name, column_type);
        sqlx::query(&sql).execute(pool).await?;
        info!("Added column {} to telemetry table", column_name);
    }

    Ok(())
}

/// Only lowercase alphanumerics and underscores are allowed in spliced
/// identifiers.
fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::is_safe_identifier;

    #[test]
    fn identifier_validation() {
        assert!(is_safe_identifier("ch1_voltage"));
        assert!(is_safe_identifier("pm25"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("drop table"));
        assert!(!is_safe_identifier("x; --"));
        assert!(!is_safe_identifier("Voltage"));
    }
}
