//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS energy_events (
            id INTEGER PRIMARY KEY,
            timestamp TEXT NOT NULL,
            event_energy_wh REAL NOT NULL,
            total_energy_wh REAL NOT NULL,
            elapsed_seconds REAL NOT NULL,
            is_anomaly INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_energy_events_timestamp ON energy_events(timestamp);",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (1)",
        [],
    )?;

    Ok(())
}
