use crate::storage::LogLevel;
use serde::Deserialize;

/// Main configuration structure for Crawlsink
///
/// Every section is optional; omitted sections take the defaults below, so
/// the sink is usable with an empty (or no) configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub tables: TableConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            job: JobConfig::default(),
            tables: TableConfig::default(),
            writer: WriterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Create the tables at startup if they do not exist.
    /// When disabled, startup fails fast if a table is missing.
    #[serde(rename = "create-tables", default = "default_create_tables")]
    pub create_tables: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            create_tables: default_create_tables(),
        }
    }
}

/// Job identification configuration
///
/// The job identifier groups every row written during one crawl run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobConfig {
    /// Explicit job identifier; defaults to the running executable's name
    pub id: Option<String>,
}

/// Table name overrides for the three persisted entities
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_items_table")]
    pub items: String,

    #[serde(default = "default_requests_table")]
    pub requests: String,

    #[serde(default = "default_logs_table")]
    pub logs: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            items: default_items_table(),
            requests: default_requests_table(),
            logs: default_logs_table(),
        }
    }
}

/// Batch writer tuning
#[derive(Debug, Clone, Deserialize)]
pub struct WriterConfig {
    /// Buffered items that trigger a flush
    #[serde(rename = "items-batch-size", default = "default_items_batch_size")]
    pub items_batch_size: usize,

    /// Buffered requests that trigger a flush
    #[serde(rename = "requests-batch-size", default = "default_requests_batch_size")]
    pub requests_batch_size: usize,

    /// Buffered log rows that trigger a flush
    #[serde(rename = "logs-batch-size", default = "default_logs_batch_size")]
    pub logs_batch_size: usize,

    /// Interval between timer-driven flushes (milliseconds)
    #[serde(rename = "flush-interval-ms", default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Retry attempts for a transiently failing flush before the batch is dropped
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries (milliseconds), doubled on each attempt
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Hard cap on queued-but-unprocessed events; overflow drops newest
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum retained lineage entries; oldest are evicted first
    #[serde(rename = "lineage-capacity", default = "default_lineage_capacity")]
    pub lineage_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            items_batch_size: default_items_batch_size(),
            requests_batch_size: default_requests_batch_size(),
            logs_batch_size: default_logs_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            queue_capacity: default_queue_capacity(),
            lineage_capacity: default_lineage_capacity(),
        }
    }
}

/// Log persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Minimum severity a log event needs to be persisted
    #[serde(rename = "min-level", default = "default_min_level")]
    pub min_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            min_level: default_min_level(),
        }
    }
}

fn default_database_path() -> String {
    "./crawlsink.db".to_string()
}

fn default_create_tables() -> bool {
    true
}

fn default_items_table() -> String {
    "job_items".to_string()
}

fn default_requests_table() -> String {
    "job_requests".to_string()
}

fn default_logs_table() -> String {
    "job_logs".to_string()
}

fn default_items_batch_size() -> usize {
    50
}

fn default_requests_batch_size() -> usize {
    50
}

fn default_logs_batch_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_queue_capacity() -> usize {
    4096
}

fn default_lineage_capacity() -> usize {
    100_000
}

fn default_min_level() -> LogLevel {
    LogLevel::Info
}
