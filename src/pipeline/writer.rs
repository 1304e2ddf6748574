//! The background batch writer
//!
//! One worker task owns the storage backend, the lineage tracker, and all
//! three row buffers. Buffers flush when they reach their configured batch
//! size, when the flush interval elapses, and on drain or shutdown.
//! Transient write failures are retried with exponential backoff; a batch
//! that exhausts its retry budget is dropped and accounted for, never
//! re-queued.

use crate::config::WriterConfig;
use crate::lineage::LineageTracker;
use crate::pipeline::router::LogRouter;
use crate::pipeline::stats::StatsCell;
use crate::pipeline::IngestEvent;
use crate::storage::{ItemRow, LogLevel, LogRow, RequestRow, Storage, StorageError};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

pub(crate) struct BatchWriter<S: Storage> {
    store: S,
    rx: mpsc::Receiver<IngestEvent>,
    job: String,
    config: WriterConfig,
    lineage: LineageTracker,
    router: LogRouter,
    next_request_id: i64,
    items: Vec<ItemRow>,
    requests: Vec<RequestRow>,
    /// Fingerprint -> index into `requests` for rows still awaiting a response
    pending: HashMap<String, usize>,
    logs: Vec<LogRow>,
    stats: Arc<StatsCell>,
}

impl<S: Storage> BatchWriter<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: S,
        rx: mpsc::Receiver<IngestEvent>,
        job: String,
        config: WriterConfig,
        min_level: LogLevel,
        next_request_id: i64,
        stats: Arc<StatsCell>,
    ) -> Self {
        let lineage = LineageTracker::new(config.lineage_capacity);
        Self {
            store,
            rx,
            job,
            config,
            lineage,
            router: LogRouter::new(min_level),
            next_request_id,
            items: Vec::new(),
            requests: Vec::new(),
            pending: HashMap::new(),
            logs: Vec::new(),
            stats,
        }
    }

    /// The worker loop; runs until shutdown or until all senders are gone
    pub(crate) async fn run(mut self) {
        tracing::debug!(
            "Batch writer started for job {} (flush interval {}ms)",
            self.job,
            self.config.flush_interval_ms
        );

        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.flush_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                maybe = self.rx.recv() => match maybe {
                    Some(event) => {
                        if self.handle(event).await {
                            break;
                        }
                    }
                    None => {
                        // Every handle dropped without an explicit close;
                        // flush what we have before stopping.
                        self.flush_all().await;
                        if let Err(e) = self.store.close() {
                            tracing::warn!("Closing storage for job {} failed: {}", self.job, e);
                        }
                        break;
                    }
                },
                _ = interval.tick() => self.flush_all().await,
            }
        }

        tracing::debug!("Batch writer stopped for job {}", self.job);
    }

    /// Applies one event; returns `true` when the worker should stop
    async fn handle(&mut self, event: IngestEvent) -> bool {
        match event {
            IngestEvent::Item(row) => {
                self.items.push(row);
                if self.items.len() >= self.config.items_batch_size {
                    self.flush_items().await;
                }
            }
            IngestEvent::Request {
                job,
                url,
                method,
                fingerprint,
                parent_url,
                created_at,
            } => {
                // Resolve the parent before registering this request, so a
                // page linking to itself never becomes its own parent.
                let parent_id = self.lineage.resolve_parent(&url, parent_url.as_deref());
                let id = self.next_request_id;
                self.next_request_id += 1;
                self.lineage.register(&fingerprint, &url, id);

                self.pending.insert(fingerprint.clone(), self.requests.len());
                self.requests.push(RequestRow {
                    id,
                    job,
                    url,
                    method,
                    status_code: None,
                    response_time: None,
                    fingerprint,
                    parent_id,
                    parent_url,
                    created_at,
                });
                if self.requests.len() >= self.config.requests_batch_size {
                    self.flush_requests().await;
                }
            }
            IngestEvent::Response {
                fingerprint,
                status_code,
                response_time,
            } => match self.pending.get(&fingerprint) {
                Some(&index) => {
                    let row = &mut self.requests[index];
                    row.status_code = Some(status_code);
                    row.response_time = Some(response_time);
                }
                None => {
                    // The row was already flushed (or never scheduled);
                    // its NULL status stands.
                    tracing::debug!(
                        "Response for {} arrived after its request row was written",
                        fingerprint
                    );
                }
            },
            IngestEvent::Log(row) => {
                if self.router.accept(row.level) {
                    self.logs.push(row);
                    if self.logs.len() >= self.config.logs_batch_size {
                        self.flush_logs().await;
                    }
                }
            }
            IngestEvent::Drain(ack) => {
                self.flush_all().await;
                let _ = ack.send(());
            }
            IngestEvent::Shutdown(ack) => {
                self.flush_all().await;
                if let Err(e) = self.store.close() {
                    tracing::warn!("Closing storage for job {} failed: {}", self.job, e);
                }
                let _ = ack.send(());
                return true;
            }
        }
        false
    }

    /// Flushes every non-empty buffer; logs go last so that failure
    /// summaries from the other flushes land in the same pass.
    async fn flush_all(&mut self) {
        self.flush_items().await;
        self.flush_requests().await;
        self.flush_logs().await;
    }

    async fn flush_items(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let rows = std::mem::take(&mut self.items);
        match self.write_with_retry(|store| store.insert_items(&rows)).await {
            Ok(()) => {
                StatsCell::add(&self.stats.items_written, rows.len() as u64);
                StatsCell::add(&self.stats.item_flushes, 1);
                tracing::debug!("Wrote {} item rows for job {}", rows.len(), self.job);
            }
            Err(e) => self.report_dropped_batch("item", rows.len(), &e),
        }
    }

    async fn flush_requests(&mut self) {
        if self.requests.is_empty() {
            return;
        }
        let rows = std::mem::take(&mut self.requests);
        self.pending.clear();
        match self
            .write_with_retry(|store| store.insert_requests(&rows))
            .await
        {
            Ok(()) => {
                StatsCell::add(&self.stats.requests_written, rows.len() as u64);
                StatsCell::add(&self.stats.request_flushes, 1);
                tracing::debug!("Wrote {} request rows for job {}", rows.len(), self.job);
            }
            Err(e) => self.report_dropped_batch("request", rows.len(), &e),
        }
    }

    async fn flush_logs(&mut self) {
        if self.router.is_disabled() {
            self.logs.clear();
            return;
        }
        if self.logs.is_empty() {
            return;
        }
        let rows = std::mem::take(&mut self.logs);
        match self.write_with_retry(|store| store.insert_logs(&rows)).await {
            Ok(()) => {
                StatsCell::add(&self.stats.logs_written, rows.len() as u64);
                StatsCell::add(&self.stats.log_flushes, 1);
                tracing::debug!("Wrote {} log rows for job {}", rows.len(), self.job);
            }
            Err(e) => {
                // Log persistence is best effort. A failed log batch latches
                // the router off for the rest of the process instead of
                // turning log writes into a failure loop.
                StatsCell::add(&self.stats.batches_dropped, 1);
                self.router.latch_failure(&format!(
                    "dropped a batch of {} log rows: {}",
                    rows.len(),
                    e
                ));
            }
        }
    }

    /// Runs one storage write, retrying transient failures with
    /// exponentially growing backoff up to the configured budget.
    async fn write_with_retry<F>(&mut self, mut op: F) -> Result<(), StorageError>
    where
        F: FnMut(&mut S) -> Result<(), StorageError>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op(&mut self.store) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    StatsCell::add(&self.stats.write_retries, 1);
                    let backoff = Duration::from_millis(
                        self.config
                            .retry_backoff_ms
                            .saturating_mul(1u64 << (attempt - 1).min(16)),
                    );
                    tracing::debug!(
                        "Transient write failure for job {} (attempt {}/{}), retrying in {:?}: {}",
                        self.job,
                        attempt,
                        self.config.max_retries,
                        backoff,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Accounts for a dropped item or request batch: one warning, one
    /// counter bump, and one persisted error row describing the loss.
    fn report_dropped_batch(&mut self, entity: &str, count: usize, error: &StorageError) {
        StatsCell::add(&self.stats.batches_dropped, 1);
        let message = format!("Dropped a batch of {} {} rows: {}", count, entity, error);
        tracing::warn!("{}", message);
        if self.router.accept(LogLevel::Error) {
            self.logs.push(LogRow {
                job: self.job.clone(),
                level: LogLevel::Error,
                message,
                created_at: Utc::now(),
            });
        }
    }
}
