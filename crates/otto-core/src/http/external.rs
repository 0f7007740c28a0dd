//! External control plane (§4.I): LAN HTTP server, shared-token authN,
//! read/mutate jobs + outbound queue + audit + settings, system status,
//! safe restart.

use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::database::models::{CommandStatus, Lane, QuietMode, UserProfile};
use crate::error::{ErrorDetail, OttoError, OttoResult};
use crate::services::task_mutation::{CreateTaskRequest, UpdateTaskRequest};

use super::auth::BearerToken;
use super::dto::{
    JobListItem, RestartAcceptedResponse, RunDetail, RuntimeStatus, ServiceStatus,
    SystemStatusResponse,
};
use super::state::AppState;

pub fn router(state: AppState, token: BearerToken) -> Router {
    Router::new()
        .route("/external/health", get(health))
        .route("/external/system/status", get(system_status))
        .route("/external/system/restart", post(system_restart))
        .route(
            "/external/settings/notification-profile",
            get(get_notification_profile).put(put_notification_profile),
        )
        .route("/external/models/catalog", get(models_unavailable))
        .route("/external/models/refresh", post(models_unavailable))
        .route(
            "/external/models/defaults",
            get(models_unavailable).put(models_unavailable),
        )
        .route("/external/jobs", get(list_jobs).post(create_job))
        .route(
            "/external/jobs/{id}",
            get(get_job).patch(update_job).delete(delete_job),
        )
        .route("/external/jobs/{id}/run-now", post(run_job_now))
        .route("/external/jobs/{id}/audit", get(job_audit))
        .route("/external/jobs/{id}/runs", get(job_runs))
        .route("/external/jobs/{id}/runs/{run_id}", get(job_run_detail))
        .layer(middleware::from_fn_with_state(token, BearerToken::middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn system_status(State(state): State<AppState>) -> Json<SystemStatusResponse> {
    let now = crate::now_millis();
    let services = vec![ServiceStatus {
        id: "store".to_string(),
        label: "embedded store".to_string(),
        status: "ok",
        message: None,
    }];
    let degraded = services.iter().any(|s| s.status == "degraded");

    Json(SystemStatusResponse {
        status: if degraded { "degraded" } else { "ok" },
        checked_at: now,
        runtime: RuntimeStatus {
            version: state.version.to_string(),
            pid: std::process::id(),
            started_at: state.started_at,
            uptime_sec: (now - state.started_at) / 1000,
        },
        services,
    })
}

async fn system_restart(State(state): State<AppState>) -> OttoResult<Json<RestartAcceptedResponse>> {
    let now = crate::now_millis();
    let result = state.restart.restart().await;

    let (status, message) = match &result {
        Ok(()) => (CommandStatus::Success, "restart accepted".to_string()),
        Err(e) => (CommandStatus::Failed, e.clone()),
    };
    state.audit.record_command(
        &Uuid::new_v4().to_string(),
        "system/restart",
        Lane::OperatorApi,
        status,
        result.as_ref().err().cloned(),
        None,
        now,
    )?;

    Ok(Json(RestartAcceptedResponse {
        status: "accepted",
        requested_at: now,
        message,
    }))
}

async fn get_notification_profile(State(state): State<AppState>) -> OttoResult<Json<UserProfile>> {
    Ok(Json(state.profile.get()?))
}

async fn put_notification_profile(
    State(state): State<AppState>,
    Json(patch): Json<serde_json::Value>,
) -> OttoResult<Json<serde_json::Value>> {
    let mut profile = state.profile.get()?;
    let changed_fields = merge_profile_fields(&mut profile, &patch)?;
    profile.updated_at = crate::now_millis();
    state.profile.update(&profile)?;

    Ok(Json(serde_json::json!({
        "profile": profile,
        "changedFields": changed_fields,
    })))
}

/// Merge-write the singleton profile with per-field validation: `HH:MM`
/// pattern for time fields, IANA timezone, cadence `30..=1440` minutes
/// (§4.I). Returns the list of field names actually changed.
pub fn merge_profile_fields(
    profile: &mut UserProfile,
    patch: &serde_json::Value,
) -> OttoResult<Vec<String>> {
    let obj = patch
        .as_object()
        .ok_or_else(|| OttoError::invalid("request body must be a JSON object"))?;
    let mut changed = Vec::new();

    if let Some(v) = obj.get("timezone").and_then(|v| v.as_str()) {
        if !is_valid_timezone(v) {
            return Err(OttoError::invalid_with_details(
                "validation failed",
                vec![ErrorDetail::new("timezone", "must be a valid IANA timezone")],
            ));
        }
        profile.timezone = v.to_string();
        changed.push("timezone".to_string());
    }
    if let Some(v) = obj.get("quietHoursStart") {
        set_time_field(&mut profile.quiet_hours_start, v, "quietHoursStart", &mut changed)?;
    }
    if let Some(v) = obj.get("quietHoursEnd") {
        set_time_field(&mut profile.quiet_hours_end, v, "quietHoursEnd", &mut changed)?;
    }
    if let Some(v) = obj.get("quietMode").and_then(|v| v.as_str()) {
        profile.quiet_mode = QuietMode::parse(v).ok_or_else(|| {
            OttoError::invalid_with_details(
                "validation failed",
                vec![ErrorDetail::new("quietMode", "must be 'critical_only' or 'off'")],
            )
        })?;
        changed.push("quietMode".to_string());
    }
    if let Some(v) = obj.get("muteUntil") {
        profile.mute_until = v.as_i64();
        changed.push("muteUntil".to_string());
    }
    if let Some(v) = obj.get("heartbeatTime1") {
        set_time_field(&mut profile.heartbeat_time_1, v, "heartbeatTime1", &mut changed)?;
    }
    if let Some(v) = obj.get("heartbeatTime2") {
        set_time_field(&mut profile.heartbeat_time_2, v, "heartbeatTime2", &mut changed)?;
    }
    if let Some(v) = obj.get("heartbeatTime3") {
        set_time_field(&mut profile.heartbeat_time_3, v, "heartbeatTime3", &mut changed)?;
    }
    if let Some(v) = obj.get("heartbeatCadenceMinutes").and_then(|v| v.as_i64()) {
        if !(30..=1440).contains(&v) {
            return Err(OttoError::invalid_with_details(
                "validation failed",
                vec![ErrorDetail::new("heartbeatCadenceMinutes", "must be between 30 and 1440")],
            ));
        }
        profile.heartbeat_cadence_minutes = v;
        changed.push("heartbeatCadenceMinutes".to_string());
    }
    if let Some(v) = obj.get("heartbeatOnlyIfSignal").and_then(|v| v.as_bool()) {
        profile.heartbeat_only_if_signal = v;
        changed.push("heartbeatOnlyIfSignal".to_string());
    }

    Ok(changed)
}

fn set_time_field(
    field: &mut Option<String>,
    value: &serde_json::Value,
    name: &str,
    changed: &mut Vec<String>,
) -> OttoResult<()> {
    if value.is_null() {
        *field = None;
        changed.push(name.to_string());
        return Ok(());
    }
    let s = value
        .as_str()
        .ok_or_else(|| OttoError::invalid_with_details("validation failed", vec![ErrorDetail::new(name, "must be a string or null")]))?;
    if !is_valid_hh_mm(s) {
        return Err(OttoError::invalid_with_details(
            "validation failed",
            vec![ErrorDetail::new(name, "must match HH:MM")],
        ));
    }
    *field = Some(s.to_string());
    changed.push(name.to_string());
    Ok(())
}

fn is_valid_hh_mm(s: &str) -> bool {
    let Some((h, m)) = s.split_once(':') else { return false };
    if h.len() != 2 || m.len() != 2 {
        return false;
    }
    match (h.parse::<u32>(), m.parse::<u32>()) {
        (Ok(h), Ok(m)) => h < 24 && m < 60,
        _ => false,
    }
}

fn is_valid_timezone(s: &str) -> bool {
    s == "UTC" || (!s.trim().is_empty() && s.contains('/'))
}

async fn models_unavailable() -> OttoError {
    OttoError::ServiceUnavailable("model catalog collaborator is not configured".to_string())
}

#[derive(Debug, Deserialize)]
struct JobsListQuery {
    #[allow(dead_code)]
    lane: Option<String>,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(_query): Query<JobsListQuery>,
) -> OttoResult<Json<Vec<JobListItem>>> {
    let jobs = state.jobs.list_tasks()?;
    Ok(Json(jobs.iter().map(JobListItem::from).collect()))
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> OttoResult<Json<JobListItem>> {
    let job = state
        .jobs
        .get_by_id(&id)?
        .ok_or_else(|| OttoError::NotFound(format!("job '{id}' not found")))?;
    Ok(Json(JobListItem::from(&job)))
}

async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> OttoResult<Json<serde_json::Value>> {
    let now = crate::now_millis();
    let result = state.mutations.create_task(req, Lane::OperatorApi, "control_plane", now)?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> OttoResult<Json<serde_json::Value>> {
    let now = crate::now_millis();
    let result = state
        .mutations
        .update_task(&id, req, Lane::OperatorApi, "control_plane", now)?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

#[derive(Debug, Deserialize, Default)]
struct DeleteQuery {
    reason: Option<String>,
}

async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> OttoResult<Json<serde_json::Value>> {
    let now = crate::now_millis();
    let reason = query.reason.unwrap_or_else(|| "deleted via external control plane".to_string());
    let result = state
        .mutations
        .delete_task(&id, &reason, Lane::OperatorApi, "control_plane", now)?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

async fn run_job_now(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> OttoResult<Json<serde_json::Value>> {
    let now = crate::now_millis();
    let result = state.mutations.run_task_now(&id, Lane::OperatorApi, "control_plane", now)?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

#[derive(Debug, Deserialize, Default)]
struct LimitQuery {
    limit: Option<i64>,
}

async fn job_audit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> OttoResult<Json<serde_json::Value>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let entries = state.audit.list_by_task_id(&id, limit)?;
    Ok(Json(serde_json::to_value(entries).unwrap_or_default()))
}

#[derive(Debug, Deserialize, Default)]
struct RunsQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn job_runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RunsQuery>,
) -> OttoResult<Json<serde_json::Value>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);
    let runs = state.jobs.list_runs_by_job_id(&id, limit, offset)?;
    let total = state.jobs.count_runs_by_job_id(&id)?;
    Ok(Json(serde_json::json!({
        "runs": runs.iter().map(RunDetail::from).collect::<Vec<_>>(),
        "total": total,
    })))
}

async fn job_run_detail(
    State(state): State<AppState>,
    Path((_id, run_id)): Path<(String, String)>,
) -> OttoResult<Json<RunDetail>> {
    let run = state
        .jobs
        .get_run_by_id(&run_id)?
        .ok_or_else(|| OttoError::NotFound(format!("run '{run_id}' not found")))?;
    Ok(Json(RunDetail::from(&run)))
}
