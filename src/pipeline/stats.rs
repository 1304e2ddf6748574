//! Ingestion counters
//!
//! Shared between the facade and the worker through an `Arc`; the facade
//! exposes point-in-time snapshots. The flush counters make the batching
//! behavior observable without querying the database (e.g. "1500 rows in
//! exactly two bulk writes").

use std::sync::atomic::{AtomicU64, Ordering};

/// Internal atomic counters
#[derive(Debug, Default)]
pub(crate) struct StatsCell {
    pub items_written: AtomicU64,
    pub requests_written: AtomicU64,
    pub logs_written: AtomicU64,
    pub item_flushes: AtomicU64,
    pub request_flushes: AtomicU64,
    pub log_flushes: AtomicU64,
    pub write_retries: AtomicU64,
    pub batches_dropped: AtomicU64,
    pub events_dropped: AtomicU64,
}

impl StatsCell {
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestStats {
        IngestStats {
            items_written: self.items_written.load(Ordering::Relaxed),
            requests_written: self.requests_written.load(Ordering::Relaxed),
            logs_written: self.logs_written.load(Ordering::Relaxed),
            item_flushes: self.item_flushes.load(Ordering::Relaxed),
            request_flushes: self.request_flushes.load(Ordering::Relaxed),
            log_flushes: self.log_flushes.load(Ordering::Relaxed),
            write_retries: self.write_retries.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time ingestion statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Rows durably written, per entity type
    pub items_written: u64,
    pub requests_written: u64,
    pub logs_written: u64,

    /// Successful bulk writes, per entity type
    pub item_flushes: u64,
    pub request_flushes: u64,
    pub log_flushes: u64,

    /// Transient-failure retries that were attempted
    pub write_retries: u64,

    /// Batches dropped after the retry budget was exhausted (or permanently failed)
    pub batches_dropped: u64,

    /// Events dropped at the queue boundary because the pipeline was saturated
    pub events_dropped: u64,
}
