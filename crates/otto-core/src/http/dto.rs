//! Wire shapes for the two control planes (§6).

use serde::{Deserialize, Serialize};

use crate::database::models::{Job, JobRun, ManagedBy, Priority};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListItem {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub schedule_type: &'static str,
    pub profile_id: Option<String>,
    pub model_ref: Option<String>,
    pub status: &'static str,
    pub run_at: Option<i64>,
    pub cadence_minutes: Option<i64>,
    pub next_run_at: Option<i64>,
    pub terminal_state: Option<&'static str>,
    pub terminal_reason: Option<String>,
    pub updated_at: i64,
    pub managed_by: &'static str,
    pub is_mutable: bool,
}

impl From<&Job> for JobListItem {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            job_type: job.job_type.clone(),
            schedule_type: job.schedule_type.as_str(),
            profile_id: job.profile_id.clone(),
            model_ref: job.model_ref.clone(),
            status: job.status.as_str(),
            run_at: job.run_at,
            cadence_minutes: job.cadence_minutes,
            next_run_at: job.next_run_at,
            terminal_state: job.terminal_state.map(|t| t.as_str()),
            terminal_reason: job.terminal_reason.clone(),
            updated_at: job.updated_at,
            managed_by: job.managed_by.as_str(),
            is_mutable: job.managed_by == ManagedBy::Operator,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetail {
    pub id: String,
    pub job_id: String,
    pub scheduled_for: Option<i64>,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub status: &'static str,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub result_json: Option<String>,
}

impl From<&JobRun> for RunDetail {
    fn from(run: &JobRun) -> Self {
        Self {
            id: run.id.clone(),
            job_id: run.job_id.clone(),
            scheduled_for: run.scheduled_for,
            started_at: run.started_at,
            finished_at: run.finished_at,
            status: run.status.as_str(),
            error_code: run.error_code.clone(),
            error_message: run.error_message.clone(),
            result_json: run.result_json.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueTelegramMessageRequest {
    pub session_id: Option<String>,
    pub chat_id: Option<i64>,
    pub content: String,
    pub dedupe_key: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueTelegramMessageResponse {
    pub status: &'static str,
    pub queued_count: u32,
    pub duplicate_count: u32,
    pub dedupe_key: Option<String>,
}

pub fn parse_priority(value: Option<&str>) -> Priority {
    value.and_then(Priority::parse).unwrap_or(Priority::Normal)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatusResponse {
    pub status: &'static str,
    pub checked_at: i64,
    pub runtime: RuntimeStatus,
    pub services: Vec<ServiceStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub version: String,
    pub pid: u32,
    pub started_at: i64,
    pub uptime_sec: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub id: String,
    pub label: String,
    pub status: &'static str,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartAcceptedResponse {
    pub status: &'static str,
    pub requested_at: i64,
    pub message: String,
}
