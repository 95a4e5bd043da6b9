//! Integration tests for pricewire-queue.
//!
//! Tests that need a running Redis are `#[ignore]`d; run them with
//! `cargo test -- --ignored` against a local instance.

use pricewire_queue::*;
use serde_json::json;
use std::time::Duration;

#[test]
fn test_job_defaults() {
    let job = Job::new("email-poll", json!({}));

    assert_eq!(job.queue, DEFAULT_QUEUE);
    assert_eq!(job.state, JobState::Enqueued);
    assert_eq!(job.attempts, 0);
    assert!(job.parent_id.is_none());
}

#[test]
fn test_store_config_builder() {
    let config = StoreConfig::new("redis://localhost:6379")
        .with_key_prefix("test-run-7")
        .with_retention(Duration::from_secs(3600));

    assert_eq!(config.key_prefix, "test-run-7");
    assert_eq!(config.retention, Duration::from_secs(3600));
}

#[test]
fn test_handler_options_attempt_budget() {
    let options = HandlerOptions::default()
        .with_retry_delays(vec![Duration::from_secs(1), Duration::from_secs(2)]);
    assert_eq!(options.max_attempts(), 3);
}

#[test]
fn test_queue_error_display() {
    let err = QueueError::LeaseLost("job123".to_string());
    assert!(format!("{}", err).contains("job123"));

    let err = QueueError::NoHandler("csv-split".to_string());
    assert!(format!("{}", err).contains("csv-split"));
}

fn test_store_config() -> StoreConfig {
    StoreConfig::new("redis://localhost:6379")
        .with_key_prefix(format!("pwtest-{}", uuid::Uuid::new_v4()))
}

#[tokio::test]
#[ignore]
async fn test_enqueue_fetch_complete() {
    let store = JobStore::connect(test_store_config()).await.unwrap();

    let id = store
        .enqueue(Job::new("email-poll", json!({"tick": 1})))
        .await
        .unwrap();

    let queues = vec![DEFAULT_QUEUE.to_string()];
    let job = store
        .fetch(&queues, "w1", Duration::from_secs(30))
        .await
        .unwrap()
        .expect("job should be ready");

    assert_eq!(job.id, id);
    assert_eq!(job.state, JobState::Processing);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.owner_token.as_deref(), Some("w1"));

    store.complete(id, "w1").await.unwrap();
    let done = store.get_job(id).await.unwrap().unwrap();
    assert_eq!(done.state, JobState::Succeeded);
    assert!(done.finished_at.is_some());

    store.clear().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_complete_guarded_by_owner_token() {
    let store = JobStore::connect(test_store_config()).await.unwrap();

    let id = store.enqueue(Job::new("t", json!({}))).await.unwrap();
    let queues = vec![DEFAULT_QUEUE.to_string()];
    store
        .fetch(&queues, "w1", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();

    // A worker that does not hold the lease cannot write the result.
    let err = store.complete(id, "w2").await.unwrap_err();
    assert!(matches!(err, QueueError::LeaseLost(_)));

    store.clear().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_continuation_waits_for_parent() {
    let store = JobStore::connect(test_store_config()).await.unwrap();
    let queues = vec![DEFAULT_QUEUE.to_string()];

    let parent_id = store.enqueue(Job::new("t", json!({"n": 1}))).await.unwrap();
    let child_id = store
        .enqueue_continuation(parent_id, Job::new("t", json!({"n": 2})))
        .await
        .unwrap();

    // Only the parent is fetchable.
    let first = store
        .fetch(&queues, "w1", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.id, parent_id);
    assert!(store
        .fetch(&queues, "w2", Duration::from_secs(30))
        .await
        .unwrap()
        .is_none());

    let child = store.get_job(child_id).await.unwrap().unwrap();
    assert_eq!(child.state, JobState::AwaitingContinuation);

    // Parent success releases the child.
    store.complete(parent_id, "w1").await.unwrap();
    let second = store
        .fetch(&queues, "w2", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.id, child_id);

    store.clear().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_terminal_failure_cascades_down_the_chain() {
    let store = JobStore::connect(test_store_config()).await.unwrap();
    let queues = vec![DEFAULT_QUEUE.to_string()];

    let a = store.enqueue(Job::new("t", json!({"n": 1}))).await.unwrap();
    let b = store
        .enqueue_continuation(a, Job::new("t", json!({"n": 2})))
        .await
        .unwrap();
    let c = store
        .enqueue_continuation(b, Job::new("t", json!({"n": 3})))
        .await
        .unwrap();

    store
        .fetch(&queues, "w1", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();

    // No retry requested: terminal.
    let outcome = store.fail(a, "w1", "boom", None).await.unwrap();
    assert_eq!(outcome, FailOutcome::Discarded);

    for id in [a, b, c] {
        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
    }
    assert_eq!(store.queue_len(FAILED_QUEUE).await.unwrap(), 3);

    store.clear().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_retry_scheduling_and_promotion() {
    let store = JobStore::connect(test_store_config()).await.unwrap();
    let queues = vec![DEFAULT_QUEUE.to_string()];

    let id = store.enqueue(Job::new("t", json!({}))).await.unwrap();
    store
        .fetch(&queues, "w1", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();

    let retry_at = chrono::Utc::now() - chrono::Duration::seconds(1);
    let outcome = store
        .fail(id, "w1", "connect refused", Some(retry_at))
        .await
        .unwrap();
    assert_eq!(outcome, FailOutcome::Retried);

    let scheduled = store.get_job(id).await.unwrap().unwrap();
    assert_eq!(scheduled.state, JobState::Scheduled);
    assert!(scheduled.next_attempt_at.is_some());

    // Already due: the promotion pass moves it back into its queue.
    let promoted = store.promote_due(100).await.unwrap();
    assert_eq!(promoted, 1);

    let again = store
        .fetch(&queues, "w1", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.id, id);
    assert_eq!(again.attempts, 2);

    store.clear().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_orphaned_lease_recovered_without_counting_attempt() {
    let store = JobStore::connect(test_store_config()).await.unwrap();
    let queues = vec![DEFAULT_QUEUE.to_string()];

    let id = store.enqueue(Job::new("t", json!({}))).await.unwrap();

    // Lease so short it has lapsed by the time the reaper runs.
    let job = store
        .fetch(&queues, "w1", Duration::from_millis(10))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.attempts, 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let recovered = store.reenqueue_orphaned().await.unwrap();
    assert_eq!(recovered, 1);

    let back = store.get_job(id).await.unwrap().unwrap();
    assert_eq!(back.state, JobState::Enqueued);
    // The interrupted attempt was voided.
    assert_eq!(back.attempts, 0);
    assert!(back.owner_token.is_none());

    store.clear().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_named_locks_exclude_and_release() {
    let store = JobStore::connect(test_store_config()).await.unwrap();

    assert!(store
        .try_lock("email-poll", "a", Duration::from_secs(60))
        .await
        .unwrap());
    assert!(!store
        .try_lock("email-poll", "b", Duration::from_secs(60))
        .await
        .unwrap());

    // Release under the wrong token is a no-op.
    store.unlock("email-poll", "b").await.unwrap();
    assert!(!store
        .try_lock("email-poll", "b", Duration::from_secs(60))
        .await
        .unwrap());

    store.unlock("email-poll", "a").await.unwrap();
    assert!(store
        .try_lock("email-poll", "b", Duration::from_secs(60))
        .await
        .unwrap());

    store.clear().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_recurring_schedule_cas() {
    let store = JobStore::connect(test_store_config()).await.unwrap();

    let next = chrono::Utc::now();
    let sched = RecurringSchedule::new("email-processing", "*/5 * * * *", "email-poll", next);
    store.upsert_recurring(&sched).await.unwrap();

    let due = store.due_recurring(chrono::Utc::now()).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].name, "email-processing");

    let fired = chrono::Utc::now();
    let advanced = store
        .reschedule_recurring(
            "email-processing",
            fired,
            fired + chrono::Duration::minutes(5),
            next,
        )
        .await
        .unwrap();
    assert!(advanced);

    // A second scheduler holding the stale expectation loses the race.
    let raced = store
        .reschedule_recurring(
            "email-processing",
            fired,
            fired + chrono::Duration::minutes(10),
            next,
        )
        .await
        .unwrap();
    assert!(!raced);

    store.clear().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_worker_runs_handlers_end_to_end() {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    let store = JobStore::connect(test_store_config()).await.unwrap();
    let counter = Arc::new(AtomicU32::new(0));

    let mut worker = Worker::with_config(store.clone(), WorkerConfig {
        concurrency: 2,
        poll_interval: Duration::from_millis(50),
        ..WorkerConfig::default()
    });

    let seen = counter.clone();
    worker.register_handler("count", HandlerOptions::default(), move |_ctx| {
        let seen = seen.clone();
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    worker.start().unwrap();

    for i in 0..3 {
        store
            .enqueue(Job::new("count", json!({"i": i})))
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    worker.stop().await.unwrap();
    store.clear().await.unwrap();
}
