//! Otto daemon bootstrap: opens the store, seeds system jobs, and starts
//! the scheduler, the outbound delivery worker, and both HTTP control
//! planes. Deliberately thin — process bootstrap and deep CLI argument
//! parsing are out of scope (§1); this binary only wires components
//! together and gets out of the way.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing::{info, warn};

use otto_core::agent::tools::QueueTelegramMessageTool;
use otto_core::agent::ToolRegistry;
use otto_core::config;
use otto_core::database;
use otto_core::http::{self, auth::BearerToken, state::AppState};
use otto_core::outbound::{DeliveryWorker, SendOutcome, Transport};
use otto_core::repository::{AuditLog, JobRepository, OutboundQueueRepository, ProfileRepository};
use otto_core::scheduler::handler::{JobHandler, JobOutcome};
use otto_core::scheduler::{HandlerRegistry, TokioScheduler};
use otto_core::services::{NoopRestart, TaskMutationService};

#[derive(Parser, Debug)]
#[command(name = "otto-daemon", version)]
struct Args {
    /// Overrides `OTTO_HOME`; defaults to the platform data directory.
    #[arg(long)]
    home: Option<PathBuf>,
}

/// A no-op handler for system-reserved jobs whose real behavior (heartbeat
/// delivery, watchdog scanning) is owned by the conversational agent layer,
/// out of scope here (§1). Keeps the seeded jobs firing without error.
struct SystemJobHandler;

#[async_trait]
impl JobHandler for SystemJobHandler {
    async fn run(&self, _payload: Option<String>, _cancelled: tokio::sync::watch::Receiver<bool>) -> JobOutcome {
        JobOutcome::Success { result_json: None }
    }
}

/// Logs outbound messages instead of shipping them. Telegram ingestion and
/// its wire protocol are out of scope (§1); a real deployment injects a
/// transport that speaks to the upstream chat API.
struct LoggingTransport;

#[async_trait]
impl Transport for LoggingTransport {
    async fn send(&self, chat_id: i64, content: &str) -> SendOutcome {
        info!(chat_id, content, "would deliver outbound message");
        SendOutcome::Ok
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(home) = &args.home {
        // SAFETY: set once, before any other thread reads it, during startup.
        unsafe { std::env::set_var("OTTO_HOME", home) };
    }

    let home = config::home_dir();
    let log_dir = home.join("logs");
    let _log_guard = otto_core::logging::init(Some(&log_dir));

    info!(home = %home.display(), "starting otto-daemon");

    let app_config = config::load_default_config();

    let db_path = home.join("state.db");
    let pool = database::init(&db_path)?;

    let jobs = JobRepository::new(pool.clone());
    let outbound = OutboundQueueRepository::new(pool.clone());
    let audit = AuditLog::new(pool.clone());
    let profile_repo = ProfileRepository::new(pool.clone());

    let mut handlers = HandlerRegistry::new();
    for job_type in otto_core::scheduler::SYSTEM_RESERVED_JOB_TYPES {
        handlers.register(*job_type, Arc::new(SystemJobHandler));
    }

    let scheduler = Arc::new(TokioScheduler::new(jobs.clone(), handlers, app_config.scheduler.clone()));
    let now = otto_core::now_millis();
    let profile = profile_repo.get()?;
    scheduler.seed_system_jobs(now, profile.heartbeat_cadence_minutes)?;

    let delivery_worker = Arc::new(DeliveryWorker::new(
        outbound.clone(),
        Arc::new(LoggingTransport),
        app_config.delivery.clone(),
    ));

    let mutations = Arc::new(TaskMutationService::new(jobs.clone(), audit.clone()));

    let app_state = AppState {
        jobs: jobs.clone(),
        outbound: outbound.clone(),
        audit: audit.clone(),
        profile: profile_repo.clone(),
        mutations,
        restart: Arc::new(NoopRestart),
        started_at: now,
        version: env!("CARGO_PKG_VERSION"),
    };

    let mut tool_registry = ToolRegistry::new();
    tool_registry.register(
        "queue_telegram_message",
        Arc::new(QueueTelegramMessageTool::new(app_state.clone())),
    );

    let secrets_dir = home.join("secrets");
    let internal_token = BearerToken::new(http::auth::load_or_create_token(
        &secrets_dir.join("internal-api.token"),
    )?);
    let external_token = BearerToken::new(http::auth::load_or_create_token(
        &secrets_dir.join("external-api.token"),
    )?);

    let scheduler_task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };
    let delivery_task = {
        let worker = delivery_worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    let internal_addr = format!("{}:{}", app_config.http.internal_host, app_config.http.internal_port);
    let external_addr = format!("{}:{}", app_config.http.external_host, app_config.http.external_port);

    let internal_router = http::internal::router(app_state.clone(), internal_token);
    let external_router = http::external::router(app_state.clone(), external_token);

    let internal_listener = tokio::net::TcpListener::bind(&internal_addr).await?;
    let external_listener = tokio::net::TcpListener::bind(&external_addr).await?;

    info!(addr = %internal_addr, "internal control plane listening");
    info!(addr = %external_addr, "external control plane listening");

    let internal_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(internal_listener, internal_router).await {
            warn!(error = %e, "internal control plane stopped");
        }
    });
    let external_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(external_listener, external_router).await {
            warn!(error = %e, "external control plane stopped");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    scheduler.stop();
    delivery_worker.stop();
    internal_server.abort();
    external_server.abort();
    scheduler_task.abort();
    delivery_task.abort();

    Ok(())
}
