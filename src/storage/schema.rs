//! Database schema definitions
//!
//! Table names are configurable, so the statements are generated rather
//! than written as one static batch. All creation uses IF NOT EXISTS
//! semantics: two processes starting concurrently against a fresh database
//! must both succeed without surfacing duplicate-object errors.

use crate::storage::traits::{StorageError, StorageResult};
use crate::storage::TableNames;
use rusqlite::Connection;

/// Builds the CREATE statements for the three tables and their indexes
fn schema_sql(tables: &TableNames) -> String {
    format!(
        r#"
-- Scraped records; the payload is an opaque JSON document
CREATE TABLE IF NOT EXISTS {items} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    item TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{items}_job ON {items}(job_id);

-- Request attempts and their outcomes. Ids are assigned by the writer,
-- so the column is a plain INTEGER PRIMARY KEY, not AUTOINCREMENT.
CREATE TABLE IF NOT EXISTS {requests} (
    id INTEGER PRIMARY KEY,
    job_id TEXT NOT NULL,
    url TEXT NOT NULL,
    method TEXT NOT NULL,
    status_code INTEGER,
    response_time REAL,
    fingerprint TEXT NOT NULL,
    parent_id INTEGER REFERENCES {requests}(id),
    parent_url TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{requests}_job ON {requests}(job_id);
CREATE INDEX IF NOT EXISTS idx_{requests}_fingerprint ON {requests}(fingerprint);
CREATE INDEX IF NOT EXISTS idx_{requests}_parent ON {requests}(parent_id);

-- Log events at or above the configured minimum severity
CREATE TABLE IF NOT EXISTS {logs} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{logs}_job ON {logs}(job_id);
"#,
        items = tables.items,
        requests = tables.requests,
        logs = tables.logs,
    )
}

/// Creates the tables if they do not exist
///
/// Idempotent; safe to call on every process start.
pub fn ensure_schema(conn: &Connection, tables: &TableNames) -> StorageResult<()> {
    conn.execute_batch(&schema_sql(tables))
        .map_err(super::sqlite::classify)?;
    tracing::info!(
        "Tables {}, {}, {} created/verified",
        tables.items,
        tables.requests,
        tables.logs
    );
    Ok(())
}

/// Probes that all three tables exist without creating anything
///
/// Returns [`StorageError::SchemaMissing`] naming the first missing table,
/// so a misconfigured deployment fails at startup with an actionable
/// message instead of mid-crawl.
pub fn verify_schema(conn: &Connection, tables: &TableNames) -> StorageResult<()> {
    for table in [&tables.items, &tables.requests, &tables.logs] {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .map_err(super::sqlite::classify)?;

        if count == 0 {
            return Err(StorageError::SchemaMissing {
                table: table.clone(),
            });
        }
    }
    Ok(())
}
