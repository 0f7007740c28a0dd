//! Internal control plane (§4.H): loopback HTTP server, bearer-token authN,
//! routes to the task mutation service and the outbound queue.

use std::sync::Arc;

use axum::{
    extract::State,
    middleware,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::instrument;
use uuid::Uuid;

use crate::database::models::{Lane, OutboundMessage, MessageStatus};
use crate::error::{OttoError, OttoResult};
use crate::repository::outbound_repository::EnqueueOutcome;
use crate::services::task_mutation::{CreateTaskRequest, UpdateTaskRequest};

use super::auth::BearerToken;
use super::dto::{parse_priority, JobListItem, QueueTelegramMessageRequest, QueueTelegramMessageResponse};
use super::state::AppState;

pub fn router(state: AppState, token: BearerToken) -> Router {
    Router::new()
        .route("/internal/tools/queue-telegram-message", post(queue_telegram_message))
        .route("/internal/tools/tasks/create", post(tasks_create))
        .route("/internal/tools/tasks/update", post(tasks_update))
        .route("/internal/tools/tasks/delete", post(tasks_delete))
        .route("/internal/tools/tasks/list", post(tasks_list))
        .route("/internal/tools/notification-profile/set", post(notification_profile_set))
        .route("/internal/tools/background-jobs/show", post(background_jobs_show))
        .layer(middleware::from_fn_with_state(token, BearerToken::middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Shared with the agent-loop tool surface: both `executeTools` and this
/// endpoint enqueue through the same function.
#[instrument(skip(state))]
pub async fn queue_telegram_message_tool(
    state: &AppState,
    req: QueueTelegramMessageRequest,
) -> OttoResult<QueueTelegramMessageResponse> {
    // Session-to-chat binding resolution lives in the Telegram ingestion
    // collaborator, out of scope here (§1); only a directly supplied
    // chat_id can be resolved.
    let chat_id = req
        .chat_id
        .ok_or_else(|| OttoError::missing_chat("unable to resolve chat_id"))?;

    if req.content.trim().is_empty() {
        return Err(OttoError::invalid("content must be non-empty"));
    }

    let now = crate::now_millis();
    let msg = OutboundMessage {
        id: Uuid::new_v4().to_string(),
        chat_id,
        content: req.content,
        priority: parse_priority(req.priority.as_deref()),
        status: MessageStatus::Queued,
        dedupe_key: req.dedupe_key.clone(),
        attempt_count: 0,
        next_attempt_at: None,
        sent_at: None,
        failed_at: None,
        error_message: None,
        created_at: now,
    };

    let outcome = state.outbound.enqueue_or_ignore_dedupe(&msg)?;
    let (status, queued_count, duplicate_count) = match outcome {
        EnqueueOutcome::Enqueued => ("enqueued", 1, 0),
        EnqueueOutcome::Duplicate => ("duplicate", 0, 1),
    };

    Ok(QueueTelegramMessageResponse {
        status,
        queued_count,
        duplicate_count,
        dedupe_key: req.dedupe_key,
    })
}

async fn queue_telegram_message(
    State(state): State<AppState>,
    Json(req): Json<QueueTelegramMessageRequest>,
) -> OttoResult<Json<QueueTelegramMessageResponse>> {
    Ok(Json(queue_telegram_message_tool(&state, req).await?))
}

async fn tasks_create(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> OttoResult<Json<serde_json::Value>> {
    let now = crate::now_millis();
    let result = state.mutations.create_task(req, Lane::Interactive, "internal_tool", now)?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
struct TaskIdBody {
    id: String,
    #[serde(flatten)]
    update: UpdateTaskRequest,
}

async fn tasks_update(
    State(state): State<AppState>,
    Json(body): Json<TaskIdBody>,
) -> OttoResult<Json<serde_json::Value>> {
    let now = crate::now_millis();
    let result = state
        .mutations
        .update_task(&body.id, body.update, Lane::Interactive, "internal_tool", now)?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
struct DeleteTaskBody {
    id: String,
    reason: Option<String>,
}

async fn tasks_delete(
    State(state): State<AppState>,
    Json(body): Json<DeleteTaskBody>,
) -> OttoResult<Json<serde_json::Value>> {
    let now = crate::now_millis();
    let reason = body.reason.unwrap_or_else(|| "deleted via internal tool".to_string());
    let result = state
        .mutations
        .delete_task(&body.id, &reason, Lane::Interactive, "internal_tool", now)?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

async fn tasks_list(State(state): State<AppState>) -> OttoResult<Json<Vec<JobListItem>>> {
    let jobs = state.jobs.list_tasks()?;
    Ok(Json(jobs.iter().map(JobListItem::from).collect()))
}

#[derive(Debug, Deserialize)]
struct NotificationProfileSetBody {
    #[serde(flatten)]
    fields: serde_json::Value,
}

async fn notification_profile_set(
    State(state): State<AppState>,
    Json(body): Json<NotificationProfileSetBody>,
) -> OttoResult<Json<serde_json::Value>> {
    let mut profile = state.profile.get()?;
    super::external::merge_profile_fields(&mut profile, &body.fields)?;
    profile.updated_at = crate::now_millis();
    state.profile.update(&profile)?;

    state.audit.record_command(
        &Uuid::new_v4().to_string(),
        "notification-profile/set",
        Lane::Interactive,
        crate::database::models::CommandStatus::Success,
        None,
        None,
        crate::now_millis(),
    )?;

    Ok(Json(json!({ "profile": profile })))
}

#[derive(Debug, Deserialize)]
struct BackgroundJobsShowBody {
    id: String,
}

async fn background_jobs_show(
    State(state): State<AppState>,
    Json(body): Json<BackgroundJobsShowBody>,
) -> OttoResult<Json<serde_json::Value>> {
    let job = state
        .jobs
        .get_by_id(&body.id)?
        .ok_or_else(|| OttoError::NotFound(format!("job '{}' not found", body.id)))?;
    Ok(Json(serde_json::to_value(JobListItem::from(&job)).unwrap_or_default()))
}

