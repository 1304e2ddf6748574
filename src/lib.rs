//! Crawlsink: a batching ingestion sink for crawl events
//!
//! This crate persists the three event streams a web crawl produces
//! (scraped records, request lifecycle events, and log messages) into a
//! relational store, preserving parent/child request lineage and job-scoped
//! grouping. Events are buffered and written in bulk; database trouble
//! degrades ingestion but never aborts the crawl that feeds it.

pub mod config;
pub mod fingerprint;
pub mod lineage;
pub mod pipeline;
pub mod storage;

use thiserror::Error;

/// Main error type for Crawlsink operations
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] FingerprintError),

    #[error("Ingestion pipeline is closed")]
    Closed,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Fingerprint and URL normalization errors
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Invalid HTTP method: {0:?}")]
    InvalidMethod(String),
}

/// Result type alias for Crawlsink operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for fingerprint operations
pub type FingerprintResult<T> = std::result::Result<T, FingerprintError>;

// Re-export commonly used types
pub use config::Config;
pub use fingerprint::{normalize_url, request_fingerprint};
pub use pipeline::{Ingest, IngestStats, RequestToken};
pub use storage::LogLevel;
