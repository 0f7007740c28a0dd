//! Row-mapped domain types for the Otto store. All timestamps are epoch
//! milliseconds; all identifiers are opaque non-empty strings.

use rusqlite::{Row, Result as SqlResult};
use serde::{Deserialize, Serialize};

// ─── Job ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleType {
    Recurring,
    Oneshot,
}

impl ScheduleType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recurring => "recurring",
            Self::Oneshot => "oneshot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recurring" => Some(Self::Recurring),
            "oneshot" => Some(Self::Oneshot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Running,
    Paused,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalState {
    Completed,
    Expired,
    Cancelled,
}

impl TerminalState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagedBy {
    System,
    Operator,
}

impl ManagedBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Operator => "operator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "operator" => Some(Self::Operator),
            _ => None,
        }
    }
}

/// The set of job `type` values that are system-reserved and therefore
/// immutable via the control planes (§4.G mutability check).
pub const SYSTEM_RESERVED_JOB_TYPES: &[&str] = &["heartbeat", "watchdog_failures"];

pub fn is_system_reserved_type(job_type: &str) -> bool {
    SYSTEM_RESERVED_JOB_TYPES.contains(&job_type)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub schedule_type: ScheduleType,
    pub status: JobStatus,
    pub profile_id: Option<String>,
    pub model_ref: Option<String>,
    pub payload: Option<String>,
    pub run_at: Option<i64>,
    pub cadence_minutes: Option<i64>,
    pub last_run_at: Option<i64>,
    pub next_run_at: Option<i64>,
    pub terminal_state: Option<TerminalState>,
    pub terminal_reason: Option<String>,
    pub lock_token: Option<String>,
    pub lock_expires_at: Option<i64>,
    pub managed_by: ManagedBy,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Job {
    pub fn is_mutable(&self) -> bool {
        self.managed_by == ManagedBy::Operator
    }

    pub fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            job_type: row.get("type")?,
            schedule_type: ScheduleType::parse(&row.get::<_, String>("schedule_type")?)
                .unwrap_or(ScheduleType::Oneshot),
            status: JobStatus::parse(&row.get::<_, String>("status")?).unwrap_or(JobStatus::Idle),
            profile_id: row.get("profile_id")?,
            model_ref: row.get("model_ref")?,
            payload: row.get("payload")?,
            run_at: row.get("run_at")?,
            cadence_minutes: row.get("cadence_minutes")?,
            last_run_at: row.get("last_run_at")?,
            next_run_at: row.get("next_run_at")?,
            terminal_state: row
                .get::<_, Option<String>>("terminal_state")?
                .and_then(|s| TerminalState::parse(&s)),
            terminal_reason: row.get("terminal_reason")?,
            lock_token: row.get("lock_token")?,
            lock_expires_at: row.get("lock_expires_at")?,
            managed_by: ManagedBy::parse(&row.get::<_, String>("managed_by")?)
                .unwrap_or(ManagedBy::Operator),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

// ─── JobRun ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
    Skipped,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub id: String,
    pub job_id: String,
    pub scheduled_for: Option<i64>,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub status: RunStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub result_json: Option<String>,
    pub created_at: i64,
}

impl JobRun {
    pub fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            scheduled_for: row.get("scheduled_for")?,
            started_at: row.get("started_at")?,
            finished_at: row.get("finished_at")?,
            status: RunStatus::parse(&row.get::<_, String>("status")?).unwrap_or(RunStatus::Failed),
            error_code: row.get("error_code")?,
            error_message: row.get("error_message")?,
            result_json: row.get("result_json")?,
            created_at: row.get("created_at")?,
        })
    }
}

// ─── OutboundMessage ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Rank used for delivery ordering: higher priority sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Sent,
    Failed,
    Cancelled,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub id: String,
    pub chat_id: i64,
    pub content: String,
    pub priority: Priority,
    pub status: MessageStatus,
    pub dedupe_key: Option<String>,
    pub attempt_count: i64,
    pub next_attempt_at: Option<i64>,
    pub sent_at: Option<i64>,
    pub failed_at: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: i64,
}

impl OutboundMessage {
    pub fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            chat_id: row.get("chat_id")?,
            content: row.get("content")?,
            priority: Priority::parse(&row.get::<_, String>("priority")?).unwrap_or(Priority::Normal),
            status: MessageStatus::parse(&row.get::<_, String>("status")?)
                .unwrap_or(MessageStatus::Queued),
            dedupe_key: row.get("dedupe_key")?,
            attempt_count: row.get("attempt_count")?,
            next_attempt_at: row.get("next_attempt_at")?,
            sent_at: row.get("sent_at")?,
            failed_at: row.get("failed_at")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
        })
    }
}

// ─── Audit ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Interactive,
    Scheduled,
    #[serde(rename = "operator-api")]
    OperatorApi,
}

impl Lane {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Scheduled => "scheduled",
            Self::OperatorApi => "operator-api",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "interactive" => Some(Self::Interactive),
            "scheduled" => Some(Self::Scheduled),
            "operator-api" => Some(Self::OperatorApi),
            _ => None,
        }
    }

    /// Only `interactive` and `operator-api` callers may mutate (§4.G).
    pub fn may_mutate(self) -> bool {
        matches!(self, Self::Interactive | Self::OperatorApi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskAuditAction {
    Create,
    Update,
    Delete,
}

impl TaskAuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAudit {
    pub id: String,
    pub task_id: String,
    pub action: TaskAuditAction,
    pub lane: Lane,
    pub actor: String,
    pub before_json: Option<String>,
    pub after_json: Option<String>,
    pub metadata_json: Option<String>,
    pub created_at: i64,
}

impl TaskAudit {
    pub fn from_row(row: &Row) -> SqlResult<Self> {
        let action = match row.get::<_, String>("action")?.as_str() {
            "create" => TaskAuditAction::Create,
            "delete" => TaskAuditAction::Delete,
            _ => TaskAuditAction::Update,
        };
        Ok(Self {
            id: row.get("id")?,
            task_id: row.get("task_id")?,
            action,
            lane: Lane::parse(&row.get::<_, String>("lane")?).unwrap_or(Lane::Scheduled),
            actor: row.get("actor")?,
            before_json: row.get("before_json")?,
            after_json: row.get("after_json")?,
            metadata_json: row.get("metadata_json")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Success,
    Failed,
    Denied,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAudit {
    pub id: String,
    pub command: String,
    pub lane: Lane,
    pub status: CommandStatus,
    pub error_message: Option<String>,
    pub metadata_json: Option<String>,
    pub created_at: i64,
}

impl CommandAudit {
    pub fn from_row(row: &Row) -> SqlResult<Self> {
        let status = match row.get::<_, String>("status")?.as_str() {
            "success" => CommandStatus::Success,
            "denied" => CommandStatus::Denied,
            _ => CommandStatus::Failed,
        };
        Ok(Self {
            id: row.get("id")?,
            command: row.get("command")?,
            lane: Lane::parse(&row.get::<_, String>("lane")?).unwrap_or(Lane::Scheduled),
            status,
            error_message: row.get("error_message")?,
            metadata_json: row.get("metadata_json")?,
            created_at: row.get("created_at")?,
        })
    }
}

// ─── UserProfile ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuietMode {
    CriticalOnly,
    Off,
}

impl QuietMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CriticalOnly => "critical_only",
            Self::Off => "off",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical_only" => Some(Self::CriticalOnly),
            "off" => Some(Self::Off),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub timezone: String,
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
    pub quiet_mode: QuietMode,
    pub mute_until: Option<i64>,
    pub heartbeat_time_1: Option<String>,
    pub heartbeat_time_2: Option<String>,
    pub heartbeat_time_3: Option<String>,
    pub heartbeat_cadence_minutes: i64,
    pub heartbeat_only_if_signal: bool,
    pub onboarded_at: Option<i64>,
    pub last_digest_at: Option<i64>,
    pub updated_at: i64,
}

impl UserProfile {
    pub fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(Self {
            timezone: row.get("timezone")?,
            quiet_hours_start: row.get("quiet_hours_start")?,
            quiet_hours_end: row.get("quiet_hours_end")?,
            quiet_mode: QuietMode::parse(&row.get::<_, String>("quiet_mode")?)
                .unwrap_or(QuietMode::Off),
            mute_until: row.get("mute_until")?,
            heartbeat_time_1: row.get("heartbeat_time_1")?,
            heartbeat_time_2: row.get("heartbeat_time_2")?,
            heartbeat_time_3: row.get("heartbeat_time_3")?,
            heartbeat_cadence_minutes: row.get("heartbeat_cadence_minutes")?,
            heartbeat_only_if_signal: row.get::<_, i64>("heartbeat_only_if_signal")? != 0,
            onboarded_at: row.get("onboarded_at")?,
            last_digest_at: row.get("last_digest_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}
