//! Integration tests for pricewire-cron.
//!
//! The Redis-backed scenarios are `#[ignore]`d; run them with
//! `cargo test -- --ignored` against a local instance.

use pricewire_cron::*;
use pricewire_queue::{JobStore, StoreConfig, DEFAULT_QUEUE};
use std::time::Duration;

#[test]
fn test_default_polling_expression_parses() {
    // The deployment default for the e-mail poll.
    let expr = CronExpression::parse("*/5 * * * *").unwrap();
    assert!(expr.next().is_some());
}

#[test]
fn test_seconds_form_also_accepted() {
    assert!(CronExpression::parse("0 */5 * * * *").is_ok());
}

#[test]
fn test_rejects_malformed_expressions() {
    assert!(CronExpression::parse("every five minutes").is_err());
    assert!(CronExpression::parse("* *").is_err());
}

fn test_store_config() -> StoreConfig {
    StoreConfig::new("redis://localhost:6379")
        .with_key_prefix(format!("pwcron-{}", uuid::Uuid::new_v4()))
}

#[tokio::test]
#[ignore]
async fn test_ensure_schedule_persists() {
    let store = JobStore::connect(test_store_config()).await.unwrap();
    let scheduler = Scheduler::new(store.clone());

    scheduler
        .ensure_schedule(
            "email-processing",
            "*/5 * * * *",
            "email-poll",
            serde_json::json!({}),
        )
        .await
        .unwrap();

    // Not yet due: next fire is in the future.
    let due = store.due_recurring(chrono::Utc::now()).await.unwrap();
    assert!(due.is_empty());

    let due = store
        .due_recurring(chrono::Utc::now() + chrono::Duration::minutes(6))
        .await
        .unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].handler, "email-poll");

    store.clear().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_tick_fires_due_schedule_once() {
    let store = JobStore::connect(test_store_config()).await.unwrap();

    // Seed a schedule that is already due.
    let past = chrono::Utc::now() - chrono::Duration::minutes(1);
    let schedule = pricewire_queue::RecurringSchedule::new(
        "email-processing",
        "*/5 * * * *",
        "email-poll",
        past,
    );
    store.upsert_recurring(&schedule).await.unwrap();

    let mut scheduler = Scheduler::with_config(store.clone(), SchedulerConfig {
        tick_interval: Duration::from_millis(100),
        ..SchedulerConfig::default()
    });
    scheduler.start().unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.stop().await.unwrap();

    // Several ticks elapsed, but the CAS admits exactly one fire.
    assert_eq!(store.queue_len(DEFAULT_QUEUE).await.unwrap(), 1);

    store.clear().await.unwrap();
}
