//! End-to-end tests for the ingestion pipeline
//!
//! Each test runs a real pipeline against a temporary SQLite database,
//! drives it through the public `Ingest` surface, and asserts on the rows
//! a fresh connection can read back afterwards.

use crawlsink::config::Config;
use crawlsink::storage::{
    ItemRow, LogRow, RequestRow, SqliteStore, Storage, StorageError, StorageResult, TableNames,
};
use crawlsink::{Ingest, IngestError, LogLevel};
use rusqlite::Connection;
use std::path::Path;
use tempfile::tempdir;

/// A pipeline configuration that never flushes on its own: batches are
/// large and the interval is effectively infinite, so tests control every
/// flush through batch sizes, `drain`, or `close`.
fn test_config(path: &Path) -> Config {
    let mut config = Config::default();
    config.database.path = path.to_string_lossy().into_owned();
    config.job.id = Some("test-job".to_string());
    config.writer.flush_interval_ms = 3_600_000;
    config.writer.retry_backoff_ms = 1;
    config
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
        .unwrap()
}

#[tokio::test]
async fn request_lineage_and_response_outcomes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let ingest = Ingest::start(test_config(&path)).unwrap();

    let a = ingest
        .request_scheduled("https://example.com/", "GET", None, None)
        .unwrap();
    let b = ingest
        .request_scheduled(
            "https://example.com/page",
            "GET",
            None,
            Some("https://example.com/"),
        )
        .unwrap();

    ingest.response_received(&a, 200, 0.12);
    ingest.response_received(&b, 404, 0.05);
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    let (a_id, a_status, a_time): (i64, u16, f64) = conn
        .query_row(
            "SELECT id, status_code, response_time FROM job_requests WHERE url = 'https://example.com/'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!(a_status, 200);
    assert!((a_time - 0.12).abs() < 1e-9);

    let (b_parent, b_parent_url, b_status): (i64, String, u16) = conn
        .query_row(
            "SELECT parent_id, parent_url, status_code FROM job_requests \
             WHERE url = 'https://example.com/page'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!(b_parent, a_id);
    assert_eq!(b_parent_url, "https://example.com/");
    assert_eq!(b_status, 404);
}

#[tokio::test]
async fn unknown_parent_is_stored_as_null() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let ingest = Ingest::start(test_config(&path)).unwrap();

    ingest
        .request_scheduled(
            "https://example.com/orphan",
            "GET",
            None,
            Some("https://never-scheduled.example.com/"),
        )
        .unwrap();
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    let parent: Option<i64> = conn
        .query_row("SELECT parent_id FROM job_requests", [], |r| r.get(0))
        .unwrap();
    assert_eq!(parent, None);
}

#[tokio::test]
async fn items_flush_in_configured_batches() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let mut config = test_config(&path);
    config.writer.items_batch_size = 1000;
    let ingest = Ingest::start(config).unwrap();

    for i in 0..1500 {
        ingest.record_scraped(serde_json::json!({ "seq": i }));
    }
    ingest.drain().await.unwrap();

    let stats = ingest.stats();
    assert_eq!(stats.items_written, 1500);
    assert_eq!(stats.item_flushes, 2, "one full batch plus the drain remainder");
    assert_eq!(stats.events_dropped, 0);
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    assert_eq!(count(&conn, "job_items"), 1500);
}

#[tokio::test]
async fn drain_writes_each_event_exactly_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let ingest = Ingest::start(test_config(&path)).unwrap();

    ingest.record_scraped(serde_json::json!({ "title": "first" }));
    ingest.drain().await.unwrap();
    ingest.record_scraped(serde_json::json!({ "title": "second" }));
    ingest.drain().await.unwrap();
    // A drain with nothing buffered writes nothing.
    ingest.drain().await.unwrap();
    assert_eq!(ingest.stats().items_written, 2);
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    assert_eq!(count(&conn, "job_items"), 2);
}

#[tokio::test]
async fn item_payloads_round_trip_as_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let ingest = Ingest::start(test_config(&path)).unwrap();

    ingest.record_scraped(serde_json::json!({
        "title": "Grüße aus Köln",
        "price": 12.5,
        "tags": ["日本語", "emoji ☃"],
    }));
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    let raw: String = conn
        .query_row("SELECT item FROM job_items", [], |r| r.get(0))
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["title"], "Grüße aus Köln");
    assert_eq!(value["tags"][0], "日本語");
    assert!(raw.contains("日本語"), "unicode stays literal, not escaped");
}

#[tokio::test]
async fn log_events_below_min_level_are_discarded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let mut config = test_config(&path);
    config.logging.min_level = LogLevel::Warning;
    let ingest = Ingest::start(config).unwrap();

    ingest.log_event(LogLevel::Debug, "noise");
    ingest.log_event(LogLevel::Info, "also noise");
    ingest.log_event(LogLevel::Warning, "kept");
    ingest.log_event(LogLevel::Error, "kept too");
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    // The Info-level start/close markers are filtered out as well.
    assert_eq!(count(&conn, "job_logs"), 2);
    let levels: Vec<String> = conn
        .prepare("SELECT level FROM job_logs ORDER BY id")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(levels, vec!["WARNING", "ERROR"]);
}

#[tokio::test]
async fn job_start_and_close_are_recorded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let ingest = Ingest::start(test_config(&path)).unwrap();
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    let messages: Vec<String> = conn
        .prepare("SELECT message FROM job_logs ORDER BY id")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        messages,
        vec!["Job test-job started", "Job test-job closed"]
    );
}

#[tokio::test]
async fn rows_are_grouped_under_the_configured_job() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let mut config = test_config(&path);
    config.job.id = Some("crawl-2026-08".to_string());
    let ingest = Ingest::start(config).unwrap();

    ingest.record_scraped(serde_json::json!({ "k": 1 }));
    ingest
        .request_scheduled("https://example.com/", "GET", None, None)
        .unwrap();
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    for table in ["job_items", "job_requests", "job_logs"] {
        let job: String = conn
            .query_row(&format!("SELECT DISTINCT job_id FROM {}", table), [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(job, "crawl-2026-08", "wrong job id in {}", table);
    }
}

#[tokio::test]
async fn invalid_requests_are_rejected_at_the_call_site() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let ingest = Ingest::start(test_config(&path)).unwrap();

    assert!(matches!(
        ingest.request_scheduled("not a url", "GET", None, None),
        Err(IngestError::InvalidRequest(_))
    ));
    assert!(matches!(
        ingest.request_scheduled("ftp://example.com/", "GET", None, None),
        Err(IngestError::InvalidRequest(_))
    ));
    assert!(matches!(
        ingest.request_scheduled("https://example.com/", "", None, None),
        Err(IngestError::InvalidRequest(_))
    ));

    ingest.close().await.unwrap();
    let conn = Connection::open(&path).unwrap();
    assert_eq!(count(&conn, "job_requests"), 0);
}

#[tokio::test]
async fn missing_schema_fails_startup_when_creation_is_disabled() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fresh.db");
    let mut config = test_config(&path);
    config.database.create_tables = false;

    match Ingest::start(config) {
        Err(IngestError::Storage(StorageError::SchemaMissing { table })) => {
            assert_eq!(table, "job_items");
        }
        other => panic!("expected SchemaMissing, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn request_ids_continue_across_pipeline_restarts() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");

    let ingest = Ingest::start(test_config(&path)).unwrap();
    ingest
        .request_scheduled("https://example.com/first", "GET", None, None)
        .unwrap();
    ingest.close().await.unwrap();

    let ingest = Ingest::start(test_config(&path)).unwrap();
    ingest
        .request_scheduled("https://example.com/second", "GET", None, None)
        .unwrap();
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    let ids: Vec<i64> = conn
        .prepare("SELECT id FROM job_requests ORDER BY id")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(ids, vec![1, 2]);
}

/// Storage double that fails the next N item inserts with a transient
/// error, delegating everything else to a real SQLite store.
struct FlakyStore {
    inner: SqliteStore,
    item_failures_left: usize,
}

impl FlakyStore {
    fn new(path: &Path, item_failures_left: usize) -> Self {
        Self {
            inner: SqliteStore::new(path.to_path_buf(), TableNames::default()),
            item_failures_left,
        }
    }
}

impl Storage for FlakyStore {
    fn ensure_schema(&mut self) -> StorageResult<()> {
        self.inner.ensure_schema()
    }

    fn verify_schema(&mut self) -> StorageResult<()> {
        self.inner.verify_schema()
    }

    fn max_request_id(&mut self) -> StorageResult<i64> {
        self.inner.max_request_id()
    }

    fn insert_items(&mut self, rows: &[ItemRow]) -> StorageResult<()> {
        if self.item_failures_left > 0 {
            self.item_failures_left -= 1;
            return Err(StorageError::Transient("database is locked".to_string()));
        }
        self.inner.insert_items(rows)
    }

    fn insert_requests(&mut self, rows: &[RequestRow]) -> StorageResult<()> {
        self.inner.insert_requests(rows)
    }

    fn insert_logs(&mut self, rows: &[LogRow]) -> StorageResult<()> {
        self.inner.insert_logs(rows)
    }

    fn close(&mut self) -> StorageResult<()> {
        self.inner.close()
    }
}

#[tokio::test]
async fn transient_failures_within_budget_land_exactly_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let mut config = test_config(&path);
    config.writer.max_retries = 3;
    let store = FlakyStore::new(&path, 2);
    let ingest = Ingest::start_with_store(config, store).unwrap();

    ingest.record_scraped(serde_json::json!({ "title": "survives" }));
    ingest.drain().await.unwrap();

    let stats = ingest.stats();
    assert_eq!(stats.write_retries, 2);
    assert_eq!(stats.batches_dropped, 0);
    assert_eq!(stats.items_written, 1);
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    assert_eq!(count(&conn, "job_items"), 1);
}

#[tokio::test]
async fn exhausted_retries_drop_the_batch_without_panicking() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let mut config = test_config(&path);
    config.writer.max_retries = 2;
    // Three failures: the initial attempt plus both retries, so the first
    // batch exhausts its budget and the next one finds a healthy store.
    let store = FlakyStore::new(&path, 3);
    let ingest = Ingest::start_with_store(config, store).unwrap();

    ingest.record_scraped(serde_json::json!({ "title": "doomed" }));
    ingest.drain().await.unwrap();

    let stats = ingest.stats();
    assert_eq!(stats.write_retries, 2);
    assert_eq!(stats.batches_dropped, 1);
    assert_eq!(stats.items_written, 0);

    // The pipeline stays usable: a later batch (after the fault clears)
    // lands normally.
    ingest.record_scraped(serde_json::json!({ "title": "recovers" }));
    ingest.drain().await.unwrap();
    assert_eq!(ingest.stats().items_written, 1);
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    assert_eq!(count(&conn, "job_items"), 1);

    // The loss itself was persisted as an error-level log row.
    let dropped: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM job_logs WHERE level = 'ERROR' \
             AND message LIKE 'Dropped a batch of 1 item rows%'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(dropped, 1);
}

#[tokio::test]
async fn saturated_queue_drops_newest_events() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let mut config = test_config(&path);
    config.writer.queue_capacity = 4;
    // Keep the start/close markers out of the queue so every slot is an item.
    config.logging.min_level = LogLevel::Error;
    let ingest = Ingest::start(config).unwrap();

    // The test runtime is single-threaded, so the worker gets no chance to
    // consume between these sends: a capacity-4 queue sees 100 events.
    for i in 0..100 {
        ingest.record_scraped(serde_json::json!({ "seq": i }));
    }
    ingest.drain().await.unwrap();

    let stats = ingest.stats();
    assert_eq!(stats.items_written, 4, "oldest events survive");
    assert_eq!(stats.events_dropped, 96, "newest events are dropped");
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    assert_eq!(count(&conn, "job_items"), 4);
}

/// Storage double whose log inserts always fail permanently while every
/// other operation goes through to a real SQLite store.
struct BrokenLogStore {
    inner: SqliteStore,
}

impl Storage for BrokenLogStore {
    fn ensure_schema(&mut self) -> StorageResult<()> {
        self.inner.ensure_schema()
    }

    fn verify_schema(&mut self) -> StorageResult<()> {
        self.inner.verify_schema()
    }

    fn max_request_id(&mut self) -> StorageResult<i64> {
        self.inner.max_request_id()
    }

    fn insert_items(&mut self, rows: &[ItemRow]) -> StorageResult<()> {
        self.inner.insert_items(rows)
    }

    fn insert_requests(&mut self, rows: &[RequestRow]) -> StorageResult<()> {
        self.inner.insert_requests(rows)
    }

    fn insert_logs(&mut self, _rows: &[LogRow]) -> StorageResult<()> {
        Err(StorageError::Permanent("log table corrupted".to_string()))
    }

    fn close(&mut self) -> StorageResult<()> {
        self.inner.close()
    }
}

#[tokio::test]
async fn failed_log_flush_disables_log_persistence() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let config = test_config(&path);
    let store = BrokenLogStore {
        inner: SqliteStore::new(path.clone(), TableNames::default()),
    };
    let ingest = Ingest::start_with_store(config, store).unwrap();

    ingest.log_event(LogLevel::Error, "about to hit the broken table");
    ingest.drain().await.unwrap();

    let stats = ingest.stats();
    assert_eq!(stats.batches_dropped, 1);
    assert_eq!(stats.logs_written, 0);
    assert_eq!(stats.write_retries, 0, "permanent failures are not retried");

    // Once the latch has tripped, later log events are discarded instead
    // of re-entering the failing path.
    ingest.log_event(LogLevel::Critical, "after the latch");
    ingest.drain().await.unwrap();
    assert_eq!(ingest.stats().batches_dropped, 1);

    // The other entity types are unaffected.
    ingest.record_scraped(serde_json::json!({ "k": 1 }));
    ingest.drain().await.unwrap();
    assert_eq!(ingest.stats().items_written, 1);
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    assert_eq!(count(&conn, "job_logs"), 0);
    assert_eq!(count(&conn, "job_items"), 1);
}

#[tokio::test]
async fn custom_table_names_are_respected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let mut config = test_config(&path);
    config.tables.items = "crawl_items".to_string();
    config.tables.requests = "crawl_requests".to_string();
    config.tables.logs = "crawl_logs".to_string();
    let ingest = Ingest::start(config).unwrap();

    ingest.record_scraped(serde_json::json!({ "k": 1 }));
    ingest
        .request_scheduled("https://example.com/", "GET", None, None)
        .unwrap();
    ingest.close().await.unwrap();

    let conn = Connection::open(&path).unwrap();
    assert_eq!(count(&conn, "crawl_items"), 1);
    assert_eq!(count(&conn, "crawl_requests"), 1);
    assert!(count(&conn, "crawl_logs") >= 2);
}
