//! Storage layer for persisted crawl events
//!
//! This module owns everything that touches the database:
//! - Row types for the three persisted entities (items, requests, logs)
//! - The `Storage` trait the batch writer drives
//! - Idempotent schema creation and the existence probe
//! - The SQLite-backed store with lazy connection and bulk inserts

mod schema;
mod sqlite;
mod traits;

pub use schema::{ensure_schema, verify_schema};
pub use sqlite::SqliteStore;
pub use traits::{Storage, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Resolved table names for the three persisted entities
#[derive(Debug, Clone)]
pub struct TableNames {
    pub items: String,
    pub requests: String,
    pub logs: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self::from_config(&crate::config::TableConfig::default())
    }
}

impl TableNames {
    pub fn from_config(tables: &crate::config::TableConfig) -> Self {
        Self {
            items: tables.items.clone(),
            requests: tables.requests.clone(),
            logs: tables.logs.clone(),
        }
    }
}

/// One scraped record, stored as an opaque JSON document
#[derive(Debug, Clone)]
pub struct ItemRow {
    pub job: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One request attempt and (if known by flush time) its outcome
///
/// `id` is assigned by the writer before the row is persisted, so that
/// `parent_id` can reference it from later rows. A `None` status code in
/// storage permanently means the response had not arrived when the row was
/// flushed; rows are never updated after the fact.
#[derive(Debug, Clone)]
pub struct RequestRow {
    pub id: i64,
    pub job: String,
    pub url: String,
    pub method: String,
    pub status_code: Option<u16>,
    pub response_time: Option<f64>,
    pub fingerprint: String,
    pub parent_id: Option<i64>,
    pub parent_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One log event originated by the crawl process
#[derive(Debug, Clone)]
pub struct LogRow {
    pub job: String,
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Severity of a log event
///
/// Ordered by severity so events can be compared against the configured
/// minimum level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}
