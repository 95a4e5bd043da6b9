//! End-to-end pipeline scenarios.
//!
//! These run the real worker and scheduler against a local Redis, with the
//! mock mailbox, the in-memory object store, and an in-process fake
//! delivery endpoint. They are `#[ignore]`d; run with
//! `cargo test -- --ignored`.

use axum::routing::post;
use axum::{Json, Router};
use pricewire_mail::{Attachment, EmailMessage, MockTransport};
use pricewire_queue::{
    Job, JobStore, StoreConfig, Worker, WorkerConfig, DEFAULT_QUEUE, FAILED_QUEUE,
};
use pricewire_server::handlers::{self, HandlerDeps, EMAIL_POLL};
use pricewire_cron::{Scheduler, SchedulerConfig};
use pricewire_http_client::{ApiClient, ApiClientConfig};
use pricewire_storage::MemoryStore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Requests captured by the fake endpoint, in arrival order.
type Captured = Arc<Mutex<Vec<Value>>>;
/// Remaining `success:false` responses per batch number.
type Rejections = Arc<Mutex<HashMap<u64, u64>>>;

async fn start_fake_endpoint() -> (String, Captured, Rejections) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let rejections: Rejections = Arc::new(Mutex::new(HashMap::new()));

    let app = {
        let captured = captured.clone();
        let rejections = rejections.clone();
        Router::new().route(
            "/batches",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                let rejections = rejections.clone();
                async move {
                    captured.lock().await.push(body.clone());

                    // The batch chain delivers one batch at a time, so the
                    // payload length doubles as the batch number marker.
                    let number = body["data"].as_array().map(|d| d.len() as u64).unwrap_or(0);
                    let mut rejections = rejections.lock().await;
                    if let Some(remaining) = rejections.get_mut(&number) {
                        if *remaining > 0 {
                            *remaining -= 1;
                            return Json(json!({"success": false, "message": "rejected"}));
                        }
                    }
                    Json(json!({"success": true}))
                }
            }),
        )
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (base_url, captured, rejections)
}

struct Pipeline {
    store: JobStore,
    mock: Arc<MockTransport>,
    worker: Worker,
    scheduler: Scheduler,
    captured: Captured,
    rejections: Rejections,
}

async fn start_pipeline(retry_delays: Vec<Duration>, batch_size: usize) -> Pipeline {
    let store = JobStore::connect(
        StoreConfig::new("redis://localhost:6379")
            .with_key_prefix(format!("pwe2e-{}", uuid::Uuid::new_v4())),
    )
    .await
    .unwrap();

    let (base_url, captured, rejections) = start_fake_endpoint().await;
    let mock = Arc::new(MockTransport::new());

    let deps = Arc::new(HandlerDeps {
        store: store.clone(),
        transport: mock.clone(),
        objects: Arc::new(MemoryStore::new()),
        api: ApiClient::new(ApiClientConfig::new(base_url, "/batches")).unwrap(),
        batch_size,
        retry_delays,
    });

    let mut worker = Worker::with_config(store.clone(), WorkerConfig {
        concurrency: 4,
        poll_interval: Duration::from_millis(50),
        lock_backoff: Duration::from_millis(100),
        ..WorkerConfig::default()
    });
    handlers::register_all(&mut worker, deps);
    worker.start().unwrap();

    let mut scheduler = Scheduler::with_config(store.clone(), SchedulerConfig {
        tick_interval: Duration::from_millis(100),
        ..SchedulerConfig::default()
    });
    scheduler.start().unwrap();

    Pipeline {
        store,
        mock,
        worker,
        scheduler,
        captured,
        rejections,
    }
}

impl Pipeline {
    async fn seed(&self, id: &str, attachments: Vec<(&str, String)>) {
        self.mock
            .seed(EmailMessage {
                id: id.to_string(),
                from: "supplier@example.com".to_string(),
                subject: "Price list".to_string(),
                received_at: chrono::Utc::now(),
                attachments: attachments
                    .into_iter()
                    .map(|(name, content)| Attachment::new(name, "text/csv", content.into_bytes()))
                    .collect(),
            })
            .await;
    }

    async fn poll_now(&self) {
        self.store
            .enqueue(Job::new(EMAIL_POLL, json!({})))
            .await
            .unwrap();
    }

    /// Wait until the endpoint saw `count` requests (or time out).
    async fn await_requests(&self, count: usize, timeout: Duration) -> Vec<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let captured = self.captured.lock().await;
            if captured.len() >= count {
                return captured.clone();
            }
            drop(captured);
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {} deliveries",
                count
            );
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn shutdown(mut self) {
        self.scheduler.stop().await.ok();
        self.worker.stop().await.ok();
        self.store.clear().await.ok();
    }
}

fn csv_with_rows(rows: usize) -> String {
    let mut csv = String::from("Product,SKU,Price,Category\n");
    for i in 0..rows {
        csv.push_str(&format!("Widget {i},W-{i},{}.99,Tools\n", i % 100));
    }
    csv
}

#[tokio::test]
#[ignore]
async fn small_file_yields_one_batch_and_one_reply() {
    let pipeline = start_pipeline(vec![Duration::from_millis(100)], 1000).await;

    pipeline.seed("m1", vec![("small.csv", csv_with_rows(3))]).await;
    pipeline.poll_now().await;

    let requests = pipeline.await_requests(1, Duration::from_secs(15)).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["data"].as_array().unwrap().len(), 3);
    assert_eq!(requests[0]["isLast"], true);
    assert_eq!(requests[0]["fileName"], "small.csv");
    assert_eq!(requests[0]["senderEmail"], "supplier@example.com");

    // Exactly one receipt for the e-mail, and the message is processed.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(pipeline.mock.replies_for("m1").await.len(), 1);
    assert!(pipeline.mock.is_processed("m1").await);

    pipeline.shutdown().await;
}

#[tokio::test]
#[ignore]
async fn large_file_batches_arrive_in_order() {
    let pipeline = start_pipeline(vec![Duration::from_millis(100)], 1000).await;

    pipeline.seed("m2", vec![("large.csv", csv_with_rows(2500))]).await;
    pipeline.poll_now().await;

    let requests = pipeline.await_requests(3, Duration::from_secs(30)).await;
    let sizes: Vec<usize> = requests
        .iter()
        .map(|r| r["data"].as_array().unwrap().len())
        .collect();
    let last_flags: Vec<bool> = requests
        .iter()
        .map(|r| r["isLast"].as_bool().unwrap())
        .collect();

    assert_eq!(sizes, vec![1000, 1000, 500]);
    assert_eq!(last_flags, vec![false, false, true]);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(pipeline.mock.replies_for("m2").await.len(), 1);

    pipeline.shutdown().await;
}

#[tokio::test]
#[ignore]
async fn empty_file_is_processed_without_delivery_or_reply() {
    let pipeline = start_pipeline(vec![Duration::from_millis(100)], 1000).await;

    pipeline
        .seed("m3", vec![("empty.csv", "Product,SKU,Price,Category\n".to_string())])
        .await;
    pipeline.poll_now().await;

    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(pipeline.captured.lock().await.is_empty());
    assert!(pipeline.mock.replies_for("m3").await.is_empty());
    assert!(pipeline.mock.is_processed("m3").await);

    pipeline.shutdown().await;
}

#[tokio::test]
#[ignore]
async fn two_attachments_deliver_independently() {
    let pipeline = start_pipeline(vec![Duration::from_millis(100)], 1000).await;

    pipeline
        .seed(
            "m4",
            vec![
                ("alpha.csv", csv_with_rows(500)),
                ("beta.csv", csv_with_rows(500)),
            ],
        )
        .await;
    pipeline.poll_now().await;

    let requests = pipeline.await_requests(2, Duration::from_secs(20)).await;
    assert!(requests.iter().all(|r| r["isLast"] == true));

    let mut names: Vec<String> = requests
        .iter()
        .map(|r| r["fileName"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["alpha.csv", "beta.csv"]);

    // One receipt per attachment for the same original e-mail.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(pipeline.mock.replies_for("m4").await.len() >= 1);

    pipeline.shutdown().await;
}

#[tokio::test]
#[ignore]
async fn rejected_batch_exhausts_retries_and_blocks_the_chain() {
    // Immediate retries so the ladder burns through quickly.
    let delays = vec![
        Duration::from_millis(100),
        Duration::from_millis(100),
        Duration::from_millis(100),
    ];
    let pipeline = start_pipeline(delays, 1000).await;

    pipeline.seed("m5", vec![("big.csv", csv_with_rows(2500))]).await;
    pipeline.poll_now().await;

    // Deliveries are strictly ordered per file, so batch 1 (1000 rows)
    // arrives first; then arm a permanent rejection for 1000-row payloads
    // so batch 2 can never get through.
    pipeline.await_requests(1, Duration::from_secs(20)).await;
    pipeline.rejections.lock().await.insert(1000, u64::MAX);

    // Batch 2: first run plus three retries, all rejected.
    let requests = pipeline.await_requests(5, Duration::from_secs(30)).await;
    let sizes: Vec<usize> = requests
        .iter()
        .map(|r| r["data"].as_array().unwrap().len())
        .collect();
    assert_eq!(sizes, vec![1000, 1000, 1000, 1000, 1000]);

    // Batch 3 (500 rows) never ran; batch 2 and its continuation are in
    // the failed queue; no receipt was sent.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(pipeline.captured.lock().await.len(), 5);
    assert_eq!(pipeline.store.queue_len(FAILED_QUEUE).await.unwrap(), 2);
    assert_eq!(pipeline.store.queue_len(DEFAULT_QUEUE).await.unwrap(), 0);
    assert!(pipeline.mock.replies_for("m5").await.is_empty());

    pipeline.shutdown().await;
}

#[tokio::test]
#[ignore]
async fn reseeded_processed_email_is_not_reprocessed() {
    let pipeline = start_pipeline(vec![Duration::from_millis(100)], 1000).await;

    pipeline.seed("m6", vec![("once.csv", csv_with_rows(2))]).await;
    pipeline.poll_now().await;
    pipeline.await_requests(1, Duration::from_secs(15)).await;

    // Same id again after processing: the poll must ignore it.
    pipeline.seed("m6", vec![("once.csv", csv_with_rows(2))]).await;
    pipeline.poll_now().await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(pipeline.captured.lock().await.len(), 1);

    pipeline.shutdown().await;
}
