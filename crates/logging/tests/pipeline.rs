use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ticketing_database::mocks::MemoryLogStore;
use ticketing_logging::{LogPipelineConfig, LogService};
use ticketing_models::{LogFilter, LogLevel, LogQuery, NewLogRecord};

fn config(buffer_size: usize) -> LogPipelineConfig {
    LogPipelineConfig {
        buffer_size,
        environment: "test".to_string(),
        ..Default::default()
    }
}

fn record(ip: &str, route: &str, message: &str, at: DateTime<Utc>) -> NewLogRecord {
    let mut record = NewLogRecord::new(LogLevel::Error, message, "test");
    record.ip_address = Some(ip.to_string());
    record.route = Some(route.to_string());
    record.created_at = at;
    record.updated_at = at;
    record
}

#[tokio::test]
async fn repeats_within_window_collapse_into_one_row() {
    let store = MemoryLogStore::new();
    let service = LogService::start(Arc::new(store.clone()), config(100));
    let sink = service.sink();
    let t = Utc::now();

    for offset in 0..3 {
        let at = t + chrono::Duration::seconds(offset);
        assert!(sink.submit(record("203.0.113.9", "/api/v1/events", "not found", at)));
    }
    service.shutdown().await;

    let rows = store.records();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].occurrences, 3);
    assert_eq!(rows[0].created_at, t);
    assert_eq!(rows[0].updated_at, t + chrono::Duration::seconds(2));
}

#[tokio::test]
async fn repeat_outside_window_starts_a_new_row() {
    let store = MemoryLogStore::new();
    let service = LogService::start(Arc::new(store.clone()), config(100));
    let sink = service.sink();
    let t = Utc::now();

    for offset in [0, 1, 3700] {
        let at = t + chrono::Duration::seconds(offset);
        sink.submit(record("203.0.113.9", "/api/v1/events", "not found", at));
    }
    service.shutdown().await;

    let mut rows = store.records();
    rows.sort_by_key(|r| r.created_at);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].occurrences, 2);
    assert_eq!(rows[1].occurrences, 1);
}

#[tokio::test]
async fn repeat_of_stored_row_increments_it() {
    let store = MemoryLogStore::new();
    // A buffer of one flushes every record as soon as it is batched.
    let service = LogService::start(Arc::new(store.clone()), config(1));
    let sink = service.sink();
    let t = Utc::now();

    let mut first = record("198.51.100.7", "/api/v1/auth/sign-in", "bad password", t);
    first.method = Some("POST".into());
    first.status_code = Some(401);
    sink.submit(first);

    let mut second = record(
        "198.51.100.7",
        "/api/v1/auth/sign-in",
        "bad password",
        t + chrono::Duration::seconds(30),
    );
    second.level = LogLevel::Warning;
    second.stack = Some("frame".into());
    sink.submit(second);
    service.shutdown().await;

    let rows = store.records();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].occurrences, 2);
    assert_eq!(rows[0].level, LogLevel::Warning);
    assert_eq!(rows[0].method.as_deref(), Some("POST"));
    assert_eq!(rows[0].status_code, Some(401));
    assert_eq!(rows[0].stack.as_deref(), Some("frame"));
}

#[tokio::test]
async fn records_without_ip_or_route_are_never_coalesced() {
    let store = MemoryLogStore::new();
    let service = LogService::start(Arc::new(store.clone()), config(100));
    let sink = service.sink();

    for _ in 0..3 {
        let mut r = NewLogRecord::new(LogLevel::Info, "startup", "test");
        r.route = Some("/health".into());
        sink.submit(r);
    }
    service.shutdown().await;

    assert_eq!(store.records().len(), 3);
}

#[tokio::test]
async fn shutdown_flushes_everything_queued() {
    let store = MemoryLogStore::new();
    let service = LogService::start(Arc::new(store.clone()), config(100));
    let sink = service.sink();
    let t = Utc::now();

    for i in 0..50 {
        let ip = format!("192.0.2.{}", i);
        assert!(sink.submit(record(&ip, &format!("/r/{}", i), &format!("m{}", i), t)));
    }

    tokio::time::timeout(Duration::from_secs(5), service.shutdown())
        .await
        .expect("shutdown should finish promptly");

    assert_eq!(store.records().len(), 50);
    assert!(!sink.info("after shutdown", None));
}

#[tokio::test]
async fn failed_lookup_falls_through_to_insert() {
    let store = MemoryLogStore::new();
    let service = LogService::start(Arc::new(store.clone()), config(1));
    let sink = service.sink();
    let t = Utc::now();

    sink.submit(record("203.0.113.1", "/a", "boom", t));
    // Wait until the first record is stored before breaking lookups.
    for _ in 0..100 {
        if !store.records().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    store.fail_lookups(true);

    sink.submit(record("203.0.113.1", "/a", "boom", t + chrono::Duration::seconds(1)));
    service.shutdown().await;

    let rows = store.records();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.occurrences == 1));
}

#[tokio::test]
async fn failed_insert_drops_batch() {
    let store = MemoryLogStore::new();
    store.fail_inserts(true);
    let service = LogService::start(Arc::new(store.clone()), config(100));
    let sink = service.sink();

    sink.submit(record("203.0.113.1", "/a", "lost", Utc::now()));
    service.shutdown().await;

    assert!(store.records().is_empty());
    assert_eq!(store.insert_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn periodic_tick_flushes_partial_batch() {
    let store = MemoryLogStore::new();
    let service = LogService::start(Arc::new(store.clone()), config(100));
    let sink = service.sink();

    sink.submit(record("203.0.113.1", "/a", "tick", Utc::now()));
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(store.records().len(), 1);
    service.shutdown().await;
}

#[tokio::test]
async fn query_and_delete_through_service() {
    let store = MemoryLogStore::new();
    let service = LogService::start(Arc::new(store.clone()), config(100));
    let sink = service.sink();
    let t = Utc::now();

    sink.submit(record("203.0.113.1", "/a", "disk full", t));
    sink.submit(record("203.0.113.2", "/b", "disk full", t + chrono::Duration::seconds(1)));
    sink.submit(record("203.0.113.3", "/c", "ok", t + chrono::Duration::seconds(2)));
    service.shutdown().await;

    let found = service
        .query(&LogQuery {
            filters: vec![LogFilter::MessageContains("disk".into())],
            limit: 10,
            offset: 0,
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].route.as_deref(), Some("/b"));

    assert!(service.delete(&[]).await.is_err());
    let deleted = service
        .delete(&[LogFilter::IpEquals("203.0.113.3".into())])
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(store.records().len(), 2);
}

#[tokio::test]
async fn error_stack_is_resolved_by_the_drain() {
    let store = MemoryLogStore::new();
    let service = LogService::start(Arc::new(store.clone()), config(100));
    let sink = service.sink();

    sink.error("payment webhook rejected", None);
    sink.info("payment webhook received", None);
    service.shutdown().await;

    let rows = store.records();
    let error = rows
        .iter()
        .find(|r| r.level == LogLevel::Error)
        .expect("error row");
    assert_eq!(error.file.as_deref(), Some("logging/tests/pipeline.rs"));
    let stack = error.stack.as_deref().unwrap_or_default();
    assert!(stack.contains("tests/pipeline.rs"));
    assert!(!stack.contains("logging/src/"));

    let info = rows
        .iter()
        .find(|r| r.level == LogLevel::Info)
        .expect("info row");
    assert_eq!(info.file.as_deref(), Some("logging/tests/pipeline.rs"));
    assert!(info.stack.is_none());
}
