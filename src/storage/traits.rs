//! Storage trait and error types
//!
//! The `Storage` trait is the seam between the batch writer and the
//! database. The production implementation is [`super::SqliteStore`]; tests
//! substitute failing or recording doubles to exercise the writer's retry
//! and degradation paths.

use crate::storage::{ItemRow, LogRow, RequestRow};
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// The transient/permanent split drives the batch writer's retry policy:
/// only transient failures (lock contention, IO hiccups) are retried;
/// permanent ones (constraint violations, malformed data, schema trouble)
/// drop the batch immediately.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Required table {table} is missing and table creation is disabled")]
    SchemaMissing { table: String },

    #[error("Transient database error: {0}")]
    Transient(String),

    #[error("Permanent database error: {0}")]
    Permanent(String),
}

impl StorageError {
    /// Whether this failure is eligible for the writer's retry policy
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Connections are lazy: implementations connect on the first operation,
/// and a first-use connection failure surfaces through whichever startup
/// operation runs first. All batch inserts are all-or-nothing: either every
/// row in the slice is durably written, or none is and an error is
/// returned.
pub trait Storage {
    /// Creates the three tables (and their indexes) if they do not exist
    ///
    /// Idempotent and safe against concurrent process starts: creation uses
    /// "if not exists" semantics rather than check-then-create.
    fn ensure_schema(&mut self) -> StorageResult<()>;

    /// Probes that the three tables exist without creating anything
    ///
    /// Fails with [`StorageError::SchemaMissing`] naming the first missing
    /// table. Used when table auto-creation is disabled.
    fn verify_schema(&mut self) -> StorageResult<()>;

    /// Returns the highest request row id already present, or 0
    ///
    /// Seeds the writer's monotonically increasing id assignment so parent
    /// references stay valid across runs that share a table.
    fn max_request_id(&mut self) -> StorageResult<i64>;

    /// Bulk-inserts scraped items in one statement inside one transaction
    fn insert_items(&mut self, rows: &[ItemRow]) -> StorageResult<()>;

    /// Bulk-inserts request rows in one statement inside one transaction
    fn insert_requests(&mut self, rows: &[RequestRow]) -> StorageResult<()>;

    /// Bulk-inserts log rows in one statement inside one transaction
    fn insert_logs(&mut self, rows: &[LogRow]) -> StorageResult<()>;

    /// Closes the connection; further operations reconnect lazily
    fn close(&mut self) -> StorageResult<()>;
}
