//! Control-plane HTTP surface.
//!
//! Four routes: liveness, transport identity, an immediate-poll trigger,
//! and mock-mailbox seeding for the test harness.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use pricewire_log::info;
use pricewire_mail::{Attachment, EmailMessage, MockTransport};
use pricewire_queue::{Job, JobStore};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::handlers::EMAIL_POLL;

/// Shared control-plane state.
#[derive(Clone)]
pub struct AppState {
    pub store: JobStore,
    /// Set only when the bound transport is the mock; enables seeding.
    pub mock: Option<Arc<MockTransport>>,
    /// Identity of the bound transport (`pop3`, `imap`, `mock`).
    pub transport_name: &'static str,
}

/// Build the control-plane router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/transport", get(transport_identity))
        .route("/jobs/email-poll", post(trigger_poll))
        .route("/test/emails", post(seed_email))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "degraded", "error": e.to_string()})),
        ),
    }
}

async fn transport_identity(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({"transport": state.transport_name}))
}

/// Enqueue an immediate mailbox poll, outside the recurring schedule.
async fn trigger_poll(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let job = Job::new(EMAIL_POLL, json!({}));
    match state.store.enqueue(job).await {
        Ok(id) => {
            info!("Manual poll requested: job {}", id);
            Ok(Json(json!({"jobId": id})))
        }
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": e.to_string()})),
        )),
    }
}

/// A seeded test message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedEmailRequest {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<SeedAttachment>,
}

/// A seeded attachment; content is the literal file text.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedAttachment {
    pub filename: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub content: String,
}

fn default_content_type() -> String {
    "text/csv".to_string()
}

async fn seed_email(
    State(state): State<AppState>,
    Json(request): Json<SeedEmailRequest>,
) -> Result<StatusCode, (StatusCode, Json<serde_json::Value>)> {
    let Some(mock) = &state.mock else {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({
                "error": format!(
                    "seeding requires the mock transport; bound transport is '{}'",
                    state.transport_name
                )
            })),
        ));
    };

    let message = EmailMessage {
        id: request.id,
        from: request.from,
        subject: request.subject,
        received_at: request.received_at.unwrap_or_else(Utc::now),
        attachments: request
            .attachments
            .into_iter()
            .map(|a| Attachment::new(a.filename, a.content_type, a.content.into_bytes()))
            .collect(),
    };

    info!(
        "Seeded test message {} ({} attachments)",
        message.id,
        message.attachments.len()
    );
    mock.seed(message).await;
    Ok(StatusCode::CREATED)
}
