//! Tests against a live Redis instance, configured via `REDIS_URL`.
//!
//! Run with: cargo test --test redis_test -- --ignored

use std::sync::Arc;
use std::time::Duration;

use scholar_pipeline::broker::{
    Consumer, HandlerError, MessageHandler, Publisher, QueueTransport, RedisTransport,
};
use scholar_pipeline::store::{JobStateStore, RedisJobStore};
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

fn redis_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore]
async fn test_store_fields_roundtrip_and_scan() {
    let store = RedisJobStore::connect(&redis_url(), Some(60))
        .await
        .expect("Failed to connect to Redis");
    let job_id = unique("test-job");

    assert_eq!(store.get(&job_id, "state").await.unwrap(), None);

    store.set(&job_id, "state", "Job queued.").await.unwrap();
    store.set(&job_id, "state", "Scraping started.").await.unwrap();
    store.set(&job_id, "author", "Ada").await.unwrap();

    assert_eq!(
        store.get(&job_id, "state").await.unwrap().as_deref(),
        Some("Scraping started.")
    );

    let snapshot = store.scan_all(&job_id).await.unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot["author"], "Ada");

    store.delete(&job_id, "state").await.unwrap();
    store.delete(&job_id, "author").await.unwrap();
    assert!(store.scan_all(&job_id).await.unwrap().is_empty());
    store.close().await;
}

#[tokio::test]
#[ignore]
async fn test_concurrent_writes_to_different_fields_both_persist() {
    let store = Arc::new(
        RedisJobStore::connect(&redis_url(), Some(60))
            .await
            .expect("Failed to connect to Redis"),
    );
    let job_id = unique("test-job");

    let (a, b) = tokio::join!(
        store.set(&job_id, "ai_analyze_status", "AI analyzer started."),
        store.set(&job_id, "plagiarism_check_status", "Plagiarism checker started.")
    );
    a.unwrap();
    b.unwrap();

    let snapshot = store.scan_all(&job_id).await.unwrap();
    assert_eq!(snapshot.len(), 2);
}

#[tokio::test]
#[ignore]
async fn test_compare_and_set_only_writes_over_expected_value() {
    let store = RedisJobStore::connect(&redis_url(), Some(60))
        .await
        .expect("Failed to connect to Redis");
    let job_id = unique("test-job");

    assert!(store.compare_and_set(&job_id, "job_data", None, "v1").await.unwrap());
    assert!(!store.compare_and_set(&job_id, "job_data", None, "v2").await.unwrap());
    assert!(!store
        .compare_and_set(&job_id, "job_data", Some("stale"), "v2")
        .await
        .unwrap());
    assert!(store
        .compare_and_set(&job_id, "job_data", Some("v1"), "v2")
        .await
        .unwrap());
    assert_eq!(
        store.get(&job_id, "job_data").await.unwrap().as_deref(),
        Some("v2")
    );
    store.delete(&job_id, "job_data").await.unwrap();
}

struct Collect(Mutex<Vec<Value>>);

#[async_trait::async_trait]
impl MessageHandler for Collect {
    async fn handle(&self, payload: Value) -> Result<(), HandlerError> {
        self.0.lock().await.push(payload);
        Ok(())
    }
}

#[tokio::test]
#[ignore]
async fn test_publish_consume_and_recover() {
    let transport = Arc::new(
        RedisTransport::connect(&redis_url())
            .await
            .expect("Failed to connect to Redis"),
    );
    let queue = unique("test-queue");
    let publisher = Publisher::new(transport.clone());

    publisher.publish(&queue, &json!({"job_id": "a"})).await.unwrap();
    publisher.publish(&queue, &json!({"job_id": "b"})).await.unwrap();
    assert_eq!(transport.depth(&queue).await.unwrap(), 2);

    // Simulate a crash between fetch and ack.
    let parked = transport
        .fetch(&queue, "crashed", Duration::from_secs(1))
        .await
        .unwrap()
        .expect("message available");
    assert!(parked.contains("\"a\""));
    assert_eq!(transport.recover(&queue, "crashed").await.unwrap(), 1);
    assert_eq!(transport.depth(&queue).await.unwrap(), 2);

    let handler = Arc::new(Collect(Mutex::new(Vec::new())));
    let (stop, shutdown) = watch::channel(false);
    let consumer = Consumer::new(transport.clone(), "test-consumer");
    let run = {
        let handler = handler.clone();
        let queue = queue.clone();
        tokio::spawn(async move { consumer.consume(&queue, handler, 1, shutdown).await })
    };

    for _ in 0..50 {
        if handler.0.lock().await.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    stop.send(true).unwrap();
    run.await.unwrap().unwrap();

    let seen = handler.0.lock().await.clone();
    assert_eq!(seen, vec![json!({"job_id": "a"}), json!({"job_id": "b"})]);
    assert_eq!(transport.depth(&queue).await.unwrap(), 0);
}
