//! Application wiring: settings in, running pipeline out.

use anyhow::Context;
use pricewire_config::{EmailProvider, Settings, StorageBackend};
use pricewire_cron::Scheduler;
use pricewire_http_client::{ApiClient, ApiClientConfig};
use pricewire_log::info;
use pricewire_mail::{
    EmailTransport, ImapConfig, ImapTransport, MockTransport, Pop3Config, Pop3Transport,
    ReplyMailer, SmtpConfig,
};
use pricewire_queue::{JobStore, StoreConfig, Worker, WorkerConfig};
use pricewire_storage::{MemoryStore, ObjectStore, S3Config, S3Store};
use std::sync::Arc;
use std::time::Duration;

use crate::handlers::{self, HandlerDeps, EMAIL_POLL};
use crate::routes::{self, AppState};

/// Name of the recurring mailbox-poll schedule.
pub const POLL_SCHEDULE: &str = "email-processing";

/// Run the pipeline until shutdown. Every error out of here is fatal
/// startup or shutdown trouble; the binary maps it to a non-zero exit.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let store = JobStore::connect(
        StoreConfig::new(&settings.jobs.redis_url).with_key_prefix(&settings.jobs.key_prefix),
    )
    .await
    .context("connecting to the job store backend")?;

    let (transport, mock, transport_name) = build_transport(&settings)?;
    let objects = build_object_store(&settings).context("initializing the object store")?;

    let mut api_config = ApiClientConfig::new(&settings.api.base_url, &settings.api.endpoint)
        .with_timeout(Duration::from_secs(settings.api.timeout_seconds));
    if let Some(key) = &settings.api.api_key {
        api_config = api_config.with_api_key(key);
    }
    if let Some(token) = &settings.api.bearer_token {
        api_config = api_config.with_bearer_token(token);
    }
    let api = ApiClient::new(api_config).context("building the API client")?;

    let deps = Arc::new(HandlerDeps {
        store: store.clone(),
        transport: transport.clone(),
        objects,
        api,
        batch_size: settings.jobs.batch_size,
        retry_delays: settings
            .jobs
            .retry_delays_seconds
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect(),
    });

    let worker_config = WorkerConfig {
        concurrency: settings
            .jobs
            .worker_count
            .unwrap_or_else(|| WorkerConfig::default().concurrency),
        lease_ttl: Duration::from_secs(settings.jobs.lease_ttl_seconds),
        ..WorkerConfig::default()
    };
    let mut worker = Worker::with_config(store.clone(), worker_config);
    handlers::register_all(&mut worker, deps);

    let mut scheduler = Scheduler::new(store.clone());
    scheduler
        .ensure_schedule(
            POLL_SCHEDULE,
            &settings.email_polling.cron_expression,
            EMAIL_POLL,
            serde_json::json!({}),
        )
        .await
        .context("registering the recurring poll schedule")?;

    worker.start().context("starting the worker pool")?;
    scheduler.start().context("starting the scheduler")?;

    let state = AppState {
        store,
        mock,
        transport_name,
    };
    let listener = tokio::net::TcpListener::bind(&settings.server.bind)
        .await
        .with_context(|| format!("binding control plane to {}", settings.server.bind))?;
    info!(
        "Pricewire up: transport={}, control plane on {}",
        transport_name, settings.server.bind
    );

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("control plane server")?;

    info!("Shutdown requested; draining");
    scheduler.stop().await.ok();
    worker.stop().await.ok();
    Ok(())
}

/// Bind the configured mailbox transport.
fn build_transport(
    settings: &Settings,
) -> anyhow::Result<(
    Arc<dyn EmailTransport>,
    Option<Arc<MockTransport>>,
    &'static str,
)> {
    match settings.email.provider {
        EmailProvider::Mock => {
            let mock = Arc::new(MockTransport::new());
            Ok((mock.clone(), Some(mock), "mock"))
        }
        EmailProvider::Pop3 => {
            let pop3 = &settings.email.pop3;
            let config = Pop3Config::new(&pop3.host, &pop3.username, &pop3.password)
                .port(pop3.port.unwrap_or(if pop3.ssl { 995 } else { 110 }))
                .ssl(pop3.ssl);
            Ok((Arc::new(Pop3Transport::new(config)), None, "pop3"))
        }
        EmailProvider::Imap => {
            let imap = &settings.email.imap;
            let mut config = ImapConfig::new(&imap.host, &imap.username, &imap.password);
            if let Some(port) = imap.port {
                config = config.port(port);
            }

            let smtp = &settings.email.smtp;
            let mailer = if smtp.host.is_empty() {
                None
            } else {
                let mut smtp_config = SmtpConfig::new(&smtp.host, &smtp.from);
                if let Some(port) = smtp.port {
                    smtp_config = smtp_config.port(port);
                }
                if !smtp.username.is_empty() {
                    smtp_config = smtp_config.credentials(&smtp.username, &smtp.password);
                }
                Some(ReplyMailer::new(smtp_config).context("building the SMTP reply mailer")?)
            };

            Ok((
                Arc::new(ImapTransport::new(config, mailer)),
                None,
                "imap",
            ))
        }
    }
}

/// Bind the configured object store.
fn build_object_store(settings: &Settings) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match settings.object_store.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::S3 => {
            let os = &settings.object_store;
            let mut config = S3Config::new(&os.endpoint, &os.access_key, &os.secret_key, &os.bucket)
                .with_ssl(os.ssl);
            if let Some(prefix) = &os.key_prefix {
                config = config.with_key_prefix(prefix);
            }
            Ok(Arc::new(S3Store::connect(config)?))
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
