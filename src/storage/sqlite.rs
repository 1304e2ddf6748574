//! SQLite storage implementation
//!
//! One connection per store, opened lazily on the first operation and held
//! for the process lifetime. Every batch insert is a single multi-row
//! INSERT statement inside one transaction, committed or rolled back as a
//! whole.

use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{schema, ItemRow, LogRow, RequestRow, TableNames};
use rusqlite::types::ToSql;
use rusqlite::Connection;
use std::path::PathBuf;

/// SQLite storage backend
pub struct SqliteStore {
    path: PathBuf,
    tables: TableNames,
    conn: Option<Connection>,
}

impl SqliteStore {
    /// Creates a store; no connection is made until the first operation
    pub fn new(path: impl Into<PathBuf>, tables: TableNames) -> Self {
        Self {
            path: path.into(),
            tables,
            conn: None,
        }
    }

    /// Returns the live connection, opening it on first use
    fn conn(&mut self) -> StorageResult<&mut Connection> {
        if self.conn.is_none() {
            let conn = Connection::open(&self.path).map_err(classify)?;

            // Configure SQLite for concurrent writers and durability
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
            ",
            )
            .map_err(classify)?;

            tracing::info!("Database connection established: {}", self.path.display());
            self.conn = Some(conn);
        }

        Ok(self.conn.as_mut().unwrap())
    }

    /// Builds a `(?,?,..),(?,?,..)` placeholder list for a multi-row insert
    fn placeholders(rows: usize, columns: usize) -> String {
        let one = format!("({})", vec!["?"; columns].join(","));
        vec![one; rows].join(",")
    }
}

impl Storage for SqliteStore {
    fn ensure_schema(&mut self) -> StorageResult<()> {
        let tables = self.tables.clone();
        schema::ensure_schema(self.conn()?, &tables)
    }

    fn verify_schema(&mut self) -> StorageResult<()> {
        let tables = self.tables.clone();
        schema::verify_schema(self.conn()?, &tables)
    }

    fn max_request_id(&mut self) -> StorageResult<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX(id), 0) FROM {}",
            self.tables.requests
        );
        self.conn()?
            .query_row(&sql, [], |row| row.get(0))
            .map_err(classify)
    }

    fn insert_items(&mut self, rows: &[ItemRow]) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "INSERT INTO {} (job_id, item, created_at) VALUES {}",
            self.tables.items,
            Self::placeholders(rows.len(), 3)
        );

        // Payloads and timestamps are serialized up front so the parameter
        // slice can borrow them.
        let payloads: Vec<String> = rows.iter().map(|r| r.payload.to_string()).collect();
        let timestamps: Vec<String> = rows.iter().map(|r| r.created_at.to_rfc3339()).collect();

        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(rows.len() * 3);
        for ((row, payload), created_at) in rows.iter().zip(&payloads).zip(&timestamps) {
            params.push(&row.job);
            params.push(payload);
            params.push(created_at);
        }

        let conn = self.conn()?;
        let tx = conn.transaction().map_err(classify)?;
        tx.execute(&sql, params.as_slice()).map_err(classify)?;
        tx.commit().map_err(classify)
    }

    fn insert_requests(&mut self, rows: &[RequestRow]) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "INSERT INTO {} (id, job_id, url, method, status_code, response_time, \
             fingerprint, parent_id, parent_url, created_at) VALUES {}",
            self.tables.requests,
            Self::placeholders(rows.len(), 10)
        );

        let timestamps: Vec<String> = rows.iter().map(|r| r.created_at.to_rfc3339()).collect();

        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(rows.len() * 10);
        for (row, created_at) in rows.iter().zip(&timestamps) {
            params.push(&row.id);
            params.push(&row.job);
            params.push(&row.url);
            params.push(&row.method);
            params.push(&row.status_code);
            params.push(&row.response_time);
            params.push(&row.fingerprint);
            params.push(&row.parent_id);
            params.push(&row.parent_url);
            params.push(created_at);
        }

        let conn = self.conn()?;
        let tx = conn.transaction().map_err(classify)?;
        tx.execute(&sql, params.as_slice()).map_err(classify)?;
        tx.commit().map_err(classify)
    }

    fn insert_logs(&mut self, rows: &[LogRow]) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "INSERT INTO {} (job_id, level, message, created_at) VALUES {}",
            self.tables.logs,
            Self::placeholders(rows.len(), 4)
        );

        let timestamps: Vec<String> = rows.iter().map(|r| r.created_at.to_rfc3339()).collect();
        let levels: Vec<&'static str> = rows.iter().map(|r| r.level.to_db_string()).collect();

        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(rows.len() * 4);
        for ((row, created_at), level) in rows.iter().zip(&timestamps).zip(&levels) {
            params.push(&row.job);
            params.push(level);
            params.push(&row.message);
            params.push(created_at);
        }

        let conn = self.conn()?;
        let tx = conn.transaction().map_err(classify)?;
        tx.execute(&sql, params.as_slice()).map_err(classify)?;
        tx.commit().map_err(classify)
    }

    fn close(&mut self) -> StorageResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|(_, e)| classify(e))?;
            tracing::info!("Database connection closed");
        }
        Ok(())
    }
}

/// Maps a driver error onto the transient/permanent retry taxonomy
///
/// Lock contention and IO hiccups are retryable; everything else
/// (constraint violations, misuse, corrupt schema) is permanent.
pub(crate) fn classify(err: rusqlite::Error) -> StorageError {
    use rusqlite::ErrorCode;

    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy)
        | Some(ErrorCode::DatabaseLocked)
        | Some(ErrorCode::SystemIoFailure)
        | Some(ErrorCode::DiskFull) => StorageError::Transient(err.to_string()),
        _ => StorageError::Permanent(err.to_string()),
    }
}
