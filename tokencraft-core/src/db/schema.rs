//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.
//! This is the storage layout version, independent of the profile rubric
//! version carried in each profile row.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: profiles and snapshots
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        identity         TEXT PRIMARY KEY,
        schema_version   INTEGER NOT NULL,
        cumulative_score REAL NOT NULL,

        -- Full profile, serde JSON
        payload          JSON NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS snapshots (
        id               TEXT PRIMARY KEY,
        identity         TEXT NOT NULL,
        taken_at         DATETIME NOT NULL,
        final_total      REAL NOT NULL,
        report           JSON NOT NULL,
        metrics          JSON NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_snapshots_identity_taken
        ON snapshots(identity, taken_at);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
