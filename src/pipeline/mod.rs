//! The ingestion pipeline
//!
//! [`Ingest`] is the crate's public entry surface: the crawling engine
//! reports events (record scraped, request scheduled, response received,
//! log message) through cheap, non-blocking calls, and a background worker
//! batches them into bulk database writes. The producer side never touches
//! the database and never blocks on it; when the pipeline saturates, the
//! newest events are dropped with a single throttled warning rather than
//! stalling the crawl.

mod router;
mod stats;
mod writer;

pub use stats::IngestStats;

use crate::config::{default_job_id, validate, Config};
use crate::fingerprint::request_fingerprint;
use crate::pipeline::stats::StatsCell;
use crate::pipeline::writer::BatchWriter;
use crate::storage::{ItemRow, LogLevel, LogRow, SqliteStore, Storage, TableNames};
use crate::IngestError;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Opaque handle for a scheduled request
///
/// Returned by [`Ingest::request_scheduled`]; the caller passes it back
/// when the response arrives (or the request is dropped) so the pipeline
/// can correlate the two without the caller tracking row ids.
#[derive(Debug, Clone)]
pub struct RequestToken {
    fingerprint: String,
    url: String,
}

impl RequestToken {
    /// The request's fingerprint (hex SHA-256)
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The request's URL as originally supplied
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Events flowing from the facade to the batch writer
pub(crate) enum IngestEvent {
    Item(ItemRow),
    Request {
        job: String,
        url: String,
        method: String,
        fingerprint: String,
        parent_url: Option<String>,
        created_at: DateTime<Utc>,
    },
    Response {
        fingerprint: String,
        status_code: u16,
        response_time: f64,
    },
    Log(LogRow),
    Drain(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running ingestion pipeline
///
/// Constructed once per process (or per test) with [`Ingest::start`];
/// closed explicitly with [`Ingest::close`], which drains every buffer
/// before releasing the database connection.
pub struct Ingest {
    tx: mpsc::Sender<IngestEvent>,
    job: String,
    min_level: LogLevel,
    stats: Arc<StatsCell>,
    worker: JoinHandle<()>,
    overflow_warned: AtomicBool,
    closed_warned: AtomicBool,
}

impl Ingest {
    /// Starts the pipeline against the configured SQLite database
    ///
    /// Performs all fatal startup work here: validates the configuration,
    /// makes the first database connection, creates the tables (or probes
    /// for them when auto-creation is disabled), and seeds request id
    /// assignment. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// * [`IngestError::Config`] - invalid configuration
    /// * [`IngestError::Storage`] - connection failure, schema creation
    ///   failure, or a missing table with `create-tables = false`
    pub fn start(config: Config) -> Result<Self, IngestError> {
        let tables = TableNames::from_config(&config.tables);
        let store = SqliteStore::new(config.database.path.clone(), tables);
        Self::start_with_store(config, store)
    }

    /// Starts the pipeline against an explicit storage backend
    ///
    /// This is the seam tests use to substitute failing or recording
    /// stores; production code goes through [`Ingest::start`].
    pub fn start_with_store<S>(config: Config, mut store: S) -> Result<Self, IngestError>
    where
        S: Storage + Send + 'static,
    {
        validate(&config)?;

        let job = config.job.id.clone().unwrap_or_else(default_job_id);

        if config.database.create_tables {
            store.ensure_schema()?;
        } else {
            store.verify_schema()?;
        }
        let next_request_id = store.max_request_id()? + 1;

        let stats = Arc::new(StatsCell::default());
        let (tx, rx) = mpsc::channel(config.writer.queue_capacity);

        let writer = BatchWriter::new(
            store,
            rx,
            job.clone(),
            config.writer.clone(),
            config.logging.min_level,
            next_request_id,
            Arc::clone(&stats),
        );
        let worker = tokio::spawn(writer.run());

        let ingest = Self {
            tx,
            job,
            min_level: config.logging.min_level,
            stats,
            worker,
            overflow_warned: AtomicBool::new(false),
            closed_warned: AtomicBool::new(false),
        };

        tracing::info!("Ingestion pipeline opened for job {}", ingest.job);
        ingest.log_event(LogLevel::Info, format!("Job {} started", ingest.job));
        Ok(ingest)
    }

    /// The job identifier every row from this pipeline is grouped under
    pub fn job(&self) -> &str {
        &self.job
    }

    /// Queues one scraped record for persistence
    pub fn record_scraped(&self, payload: serde_json::Value) {
        self.send(IngestEvent::Item(ItemRow {
            job: self.job.clone(),
            payload,
            created_at: Utc::now(),
        }));
    }

    /// Reports a scheduled request and returns its correlation token
    ///
    /// `parent_url_hint` is the URL the crawler followed a link from, if
    /// known; the pipeline resolves it to a storage-level parent id. The
    /// hint is best effort; an unknown or absent parent is fine.
    ///
    /// # Errors
    ///
    /// [`IngestError::InvalidRequest`] when the URL or method is
    /// malformed. Invalid requests never enter the pipeline.
    pub fn request_scheduled(
        &self,
        url: &str,
        method: &str,
        body: Option<&[u8]>,
        parent_url_hint: Option<&str>,
    ) -> Result<RequestToken, IngestError> {
        let fingerprint = request_fingerprint(method, url, body)?;

        let token = RequestToken {
            fingerprint: fingerprint.clone(),
            url: url.to_string(),
        };

        self.send(IngestEvent::Request {
            job: self.job.clone(),
            url: url.to_string(),
            method: method.to_ascii_uppercase(),
            fingerprint,
            parent_url: parent_url_hint
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            created_at: Utc::now(),
        });

        Ok(token)
    }

    /// Reports the response for a previously scheduled request
    ///
    /// If the request row is still buffered, its status code and response
    /// time are filled in before the row is written. A response arriving
    /// after the row was flushed is dropped: a persisted NULL status
    /// permanently means "no response by flush time".
    pub fn response_received(&self, token: &RequestToken, status_code: u16, elapsed_seconds: f64) {
        self.send(IngestEvent::Response {
            fingerprint: token.fingerprint.clone(),
            status_code,
            response_time: elapsed_seconds,
        });
    }

    /// Reports that a scheduled request was dropped before completion
    pub fn request_dropped(&self, token: &RequestToken, reason: &str) {
        self.log_event(
            LogLevel::Warning,
            format!("Request dropped ({}): {}", reason, token.url),
        );
    }

    /// Queues one log event for persistence
    ///
    /// Events below the configured minimum severity are discarded here,
    /// before they ever reach the writer.
    pub fn log_event(&self, level: LogLevel, message: impl Into<String>) {
        if level < self.min_level {
            return;
        }
        self.send(IngestEvent::Log(LogRow {
            job: self.job.clone(),
            level,
            message: message.into(),
            created_at: Utc::now(),
        }));
    }

    /// Snapshot of the pipeline's counters
    pub fn stats(&self) -> IngestStats {
        self.stats.snapshot()
    }

    /// Flushes every non-empty buffer and waits for the writes to finish
    pub async fn drain(&self) -> Result<(), IngestError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(IngestEvent::Drain(ack_tx))
            .await
            .map_err(|_| IngestError::Closed)?;
        ack_rx.await.map_err(|_| IngestError::Closed)
    }

    /// Drains all buffers, closes the database connection, and stops the worker
    ///
    /// Buffered data is flushed synchronously before this returns, so
    /// nothing is silently lost on a normal shutdown.
    pub async fn close(self) -> Result<(), IngestError> {
        self.log_event(LogLevel::Info, format!("Job {} closed", self.job));

        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(IngestEvent::Shutdown(ack_tx))
            .await
            .map_err(|_| IngestError::Closed)?;
        ack_rx.await.map_err(|_| IngestError::Closed)?;

        let _ = self.worker.await;
        tracing::info!("Ingestion pipeline closed for job {}", self.job);
        Ok(())
    }

    /// Hands an event to the worker without ever blocking the caller
    ///
    /// Beyond the queue capacity the newest events are dropped, with one
    /// warning per process for the saturation condition.
    fn send(&self, event: IngestEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                StatsCell::add(&self.stats.events_dropped, 1);
                if !self.overflow_warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        "Ingestion queue for job {} is full; dropping newest events",
                        self.job
                    );
                }
            }
            Err(TrySendError::Closed(_)) => {
                StatsCell::add(&self.stats.events_dropped, 1);
                if !self.closed_warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        "Ingestion pipeline for job {} is closed; dropping events",
                        self.job
                    );
                }
            }
        }
    }
}
