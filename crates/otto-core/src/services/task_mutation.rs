//! Task mutation service (§4.G): validated create/update/delete/run-now on
//! the job repository with lane policy, terminal-state guards, and audit
//! emission.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::{
    is_system_reserved_type, Job, JobStatus, Lane, ManagedBy, ScheduleType, TaskAuditAction,
};
use crate::error::{ErrorDetail, OttoError, OttoResult};
use crate::repository::{AuditLog, JobRepository};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub job_type: String,
    pub schedule_type: ScheduleType,
    pub cadence_minutes: Option<i64>,
    pub run_at: Option<i64>,
    pub profile_id: Option<String>,
    pub model_ref: Option<String>,
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub schedule_type: Option<ScheduleType>,
    pub cadence_minutes: Option<i64>,
    pub run_at: Option<i64>,
    pub status: Option<JobStatus>,
    pub profile_id: Option<String>,
    pub model_ref: Option<String>,
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[allow(clippy::large_enum_variant)]
pub enum MutationResponse {
    Created { id: String },
    Updated { id: String },
    Deleted { id: String },
    RunNowScheduled { id: String, scheduled_for: i64 },
}

pub struct TaskMutationService {
    jobs: JobRepository,
    audit: AuditLog,
}

impl TaskMutationService {
    pub fn new(jobs: JobRepository, audit: AuditLog) -> Self {
        Self { jobs, audit }
    }

    fn require_mutation_allowed(&self, lane: Lane) -> OttoResult<()> {
        if !lane.may_mutate() {
            return Err(OttoError::ForbiddenMutation(
                "the scheduled lane is read-only".to_string(),
            ));
        }
        Ok(())
    }

    fn require_mutable_job(&self, job: &Job) -> OttoResult<()> {
        if job.managed_by == ManagedBy::System || is_system_reserved_type(&job.job_type) {
            return Err(OttoError::ForbiddenMutation(format!(
                "job '{}' is system-managed and immutable",
                job.id
            )));
        }
        Ok(())
    }

    fn require_not_terminal(&self, job: &Job) -> OttoResult<()> {
        if job.terminal_state.is_some() {
            return Err(OttoError::StateConflict(format!(
                "job '{}' is already in a terminal state",
                job.id
            )));
        }
        Ok(())
    }

    /// `createTask`: computes `nextRunAt` from `runAt` (one-shot) or `now`
    /// (recurring start) and writes `{action:create, beforeJson:null}`.
    pub fn create_task(
        &self,
        req: CreateTaskRequest,
        lane: Lane,
        actor: &str,
        now: i64,
    ) -> OttoResult<MutationResponse> {
        self.require_mutation_allowed(lane)?;

        if is_system_reserved_type(&req.job_type) {
            return Err(OttoError::ForbiddenMutation(format!(
                "job type '{}' is system-reserved",
                req.job_type
            )));
        }
        if req.job_type.trim().is_empty() {
            return Err(OttoError::invalid_with_details(
                "validation failed",
                vec![ErrorDetail::new("type", "must be non-empty")],
            ));
        }

        let next_run_at = match req.schedule_type {
            ScheduleType::Oneshot => {
                let run_at = req.run_at.ok_or_else(|| {
                    OttoError::invalid_with_details(
                        "validation failed",
                        vec![ErrorDetail::new("runAt", "required when scheduleType=oneshot")],
                    )
                })?;
                if req.cadence_minutes.is_some() {
                    return Err(OttoError::invalid_with_details(
                        "validation failed",
                        vec![ErrorDetail::new(
                            "cadenceMinutes",
                            "must be null when scheduleType=oneshot",
                        )],
                    ));
                }
                run_at
            }
            ScheduleType::Recurring => {
                let cadence = req.cadence_minutes.ok_or_else(|| {
                    OttoError::invalid_with_details(
                        "validation failed",
                        vec![ErrorDetail::new(
                            "cadenceMinutes",
                            "required when scheduleType=recurring",
                        )],
                    )
                })?;
                if cadence <= 0 {
                    return Err(OttoError::invalid_with_details(
                        "validation failed",
                        vec![ErrorDetail::new("cadenceMinutes", "must be a positive integer")],
                    ));
                }
                now
            }
        };

        let id = req.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let payload = req.payload.map(|v| v.to_string());

        let job = Job {
            id: id.clone(),
            job_type: req.job_type,
            schedule_type: req.schedule_type,
            status: JobStatus::Idle,
            profile_id: req.profile_id,
            model_ref: req.model_ref,
            payload,
            run_at: req.run_at,
            cadence_minutes: req.cadence_minutes,
            last_run_at: None,
            next_run_at: Some(next_run_at),
            terminal_state: None,
            terminal_reason: None,
            lock_token: None,
            lock_expires_at: None,
            managed_by: ManagedBy::Operator,
            created_at: now,
            updated_at: now,
        };
        self.jobs.upsert(&job)?;

        let after_json = serde_json::to_string(&job).ok();
        self.audit.record_task_mutation(
            &Uuid::new_v4().to_string(),
            &id,
            TaskAuditAction::Create,
            lane,
            actor,
            None,
            after_json.as_deref(),
            None,
            now,
        )?;

        Ok(MutationResponse::Created { id })
    }

    /// `updateTask`: loads the existing record, merges only submitted
    /// fields, re-validates invariants, recomputes `nextRunAt` if schedule
    /// fields change, and writes `{action:update, beforeJson, afterJson}`.
    pub fn update_task(
        &self,
        id: &str,
        req: UpdateTaskRequest,
        lane: Lane,
        actor: &str,
        now: i64,
    ) -> OttoResult<MutationResponse> {
        self.require_mutation_allowed(lane)?;

        let before = self
            .jobs
            .get_by_id(id)?
            .ok_or_else(|| OttoError::NotFound(format!("job '{id}' not found")))?;
        self.require_mutable_job(&before)?;
        self.require_not_terminal(&before)?;

        let before_json = serde_json::to_string(&before).ok();
        let mut after = before.clone();

        let schedule_changed =
            req.schedule_type.is_some() || req.cadence_minutes.is_some() || req.run_at.is_some();

        if let Some(schedule_type) = req.schedule_type {
            after.schedule_type = schedule_type;
        }
        if req.cadence_minutes.is_some() {
            after.cadence_minutes = req.cadence_minutes;
        }
        if req.run_at.is_some() {
            after.run_at = req.run_at;
        }
        if let Some(status) = req.status {
            after.status = status;
        }
        if req.profile_id.is_some() {
            after.profile_id = req.profile_id;
        }
        if req.model_ref.is_some() {
            after.model_ref = req.model_ref;
        }
        if let Some(payload) = req.payload {
            after.payload = Some(payload.to_string());
        }

        match after.schedule_type {
            ScheduleType::Oneshot => {
                if after.run_at.is_none() {
                    return Err(OttoError::invalid_with_details(
                        "validation failed",
                        vec![ErrorDetail::new("runAt", "required when scheduleType=oneshot")],
                    ));
                }
                if after.cadence_minutes.is_some() {
                    return Err(OttoError::invalid_with_details(
                        "validation failed",
                        vec![ErrorDetail::new(
                            "cadenceMinutes",
                            "must be null when scheduleType=oneshot",
                        )],
                    ));
                }
                if schedule_changed {
                    after.next_run_at = after.run_at;
                }
            }
            ScheduleType::Recurring => {
                let cadence = after.cadence_minutes.unwrap_or(0);
                if cadence <= 0 {
                    return Err(OttoError::invalid_with_details(
                        "validation failed",
                        vec![ErrorDetail::new("cadenceMinutes", "must be a positive integer")],
                    ));
                }
                if schedule_changed {
                    after.next_run_at = Some(now);
                }
            }
        }

        after.updated_at = now;
        self.jobs.upsert(&after)?;

        let after_json = serde_json::to_string(&after).ok();
        self.audit.record_task_mutation(
            &Uuid::new_v4().to_string(),
            id,
            TaskAuditAction::Update,
            lane,
            actor,
            before_json.as_deref(),
            after_json.as_deref(),
            None,
            now,
        )?;

        Ok(MutationResponse::Updated { id: id.to_string() })
    }

    /// `deleteTask`: logical cancel — `status=idle`, `nextRunAt=null`,
    /// `terminalState=cancelled`; writes
    /// `{action:delete, afterJson:null, metadataJson:{reason}}`.
    pub fn delete_task(
        &self,
        id: &str,
        reason: &str,
        lane: Lane,
        actor: &str,
        now: i64,
    ) -> OttoResult<MutationResponse> {
        self.require_mutation_allowed(lane)?;

        let before = self
            .jobs
            .get_by_id(id)?
            .ok_or_else(|| OttoError::NotFound(format!("job '{id}' not found")))?;
        self.require_mutable_job(&before)?;

        let before_json = serde_json::to_string(&before).ok();
        self.jobs.cancel_task(id, reason, now)?;

        let metadata = serde_json::json!({ "reason": reason }).to_string();
        self.audit.record_task_mutation(
            &Uuid::new_v4().to_string(),
            id,
            TaskAuditAction::Delete,
            lane,
            actor,
            before_json.as_deref(),
            None,
            Some(&metadata),
            now,
        )?;

        Ok(MutationResponse::Deleted { id: id.to_string() })
    }

    /// `runTaskNow`: sets `nextRunAt=now`, leaves other fields intact;
    /// writes `{action:update, metadataJson:{runNow:true}}`.
    pub fn run_task_now(
        &self,
        id: &str,
        lane: Lane,
        actor: &str,
        now: i64,
    ) -> OttoResult<MutationResponse> {
        self.require_mutation_allowed(lane)?;

        let before = self
            .jobs
            .get_by_id(id)?
            .ok_or_else(|| OttoError::NotFound(format!("job '{id}' not found")))?;
        self.require_mutable_job(&before)?;
        self.require_not_terminal(&before)?;

        let before_json = serde_json::to_string(&before).ok();
        let mut after = before.clone();
        after.next_run_at = Some(now);
        after.updated_at = now;
        self.jobs.upsert(&after)?;

        let metadata = serde_json::json!({ "runNow": true }).to_string();
        let after_json = serde_json::to_string(&after).ok();
        self.audit.record_task_mutation(
            &Uuid::new_v4().to_string(),
            id,
            TaskAuditAction::Update,
            lane,
            actor,
            before_json.as_deref(),
            after_json.as_deref(),
            Some(&metadata),
            now,
        )?;

        Ok(MutationResponse::RunNowScheduled {
            id: id.to_string(),
            scheduled_for: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_in_memory;

    fn setup() -> TaskMutationService {
        let pool = init_in_memory().unwrap();
        TaskMutationService::new(JobRepository::new(pool.clone()), AuditLog::new(pool))
    }

    #[test]
    fn create_recurring_task_sets_next_run_at_to_now() {
        let svc = setup();
        let req = CreateTaskRequest {
            id: Some("t1".to_string()),
            job_type: "daily_digest".to_string(),
            schedule_type: ScheduleType::Recurring,
            cadence_minutes: Some(60),
            run_at: None,
            profile_id: None,
            model_ref: None,
            payload: None,
        };
        let result = svc.create_task(req, Lane::Interactive, "tester", 1000).unwrap();
        match result {
            MutationResponse::Created { id } => assert_eq!(id, "t1"),
            other => panic!("unexpected response: {other:?}"),
        }

        let job = svc.jobs.get_by_id("t1").unwrap().unwrap();
        assert_eq!(job.next_run_at, Some(1000));

        let audit = svc.audit.list_by_task_id("t1", 10).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, TaskAuditAction::Create);
        assert_eq!(audit[0].task_id, "t1");
    }

    #[test]
    fn create_oneshot_without_run_at_is_rejected() {
        let svc = setup();
        let req = CreateTaskRequest {
            id: None,
            job_type: "send_reminder".to_string(),
            schedule_type: ScheduleType::Oneshot,
            cadence_minutes: None,
            run_at: None,
            profile_id: None,
            model_ref: None,
            payload: None,
        };
        let err = svc.create_task(req, Lane::Interactive, "tester", 1000).unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[test]
    fn scheduled_lane_cannot_mutate() {
        let svc = setup();
        let req = CreateTaskRequest {
            id: None,
            job_type: "daily_digest".to_string(),
            schedule_type: ScheduleType::Recurring,
            cadence_minutes: Some(60),
            run_at: None,
            profile_id: None,
            model_ref: None,
            payload: None,
        };
        let err = svc.create_task(req, Lane::Scheduled, "scheduler", 1000).unwrap_err();
        assert_eq!(err.kind(), "forbidden_mutation");
    }

    #[test]
    fn system_reserved_type_cannot_be_created() {
        let svc = setup();
        let req = CreateTaskRequest {
            id: None,
            job_type: "heartbeat".to_string(),
            schedule_type: ScheduleType::Recurring,
            cadence_minutes: Some(60),
            run_at: None,
            profile_id: None,
            model_ref: None,
            payload: None,
        };
        let err = svc.create_task(req, Lane::Interactive, "tester", 1000).unwrap_err();
        assert_eq!(err.kind(), "forbidden_mutation");
    }

    #[test]
    fn delete_is_idempotent_terminal_state() {
        let svc = setup();
        svc.create_task(
            CreateTaskRequest {
                id: Some("t2".to_string()),
                job_type: "x".to_string(),
                schedule_type: ScheduleType::Recurring,
                cadence_minutes: Some(5),
                run_at: None,
                profile_id: None,
                model_ref: None,
                payload: None,
            },
            Lane::Interactive,
            "tester",
            1000,
        )
        .unwrap();

        svc.delete_task("t2", "no longer needed", Lane::Interactive, "tester", 2000)
            .unwrap();
        let job = svc.jobs.get_by_id("t2").unwrap().unwrap();
        assert_eq!(job.terminal_state, Some(crate::database::models::TerminalState::Cancelled));
        assert!(job.next_run_at.is_none());

        let audit = svc.audit.list_by_task_id("t2", 10).unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].action, TaskAuditAction::Delete);
        assert_eq!(audit[1].action, TaskAuditAction::Create);
    }

    #[test]
    fn update_task_records_one_audit_row_with_before_and_after() {
        let svc = setup();
        svc.create_task(
            CreateTaskRequest {
                id: Some("t3".to_string()),
                job_type: "daily_digest".to_string(),
                schedule_type: ScheduleType::Recurring,
                cadence_minutes: Some(60),
                run_at: None,
                profile_id: None,
                model_ref: None,
                payload: None,
            },
            Lane::Interactive,
            "tester",
            1000,
        )
        .unwrap();

        svc.update_task(
            "t3",
            UpdateTaskRequest {
                cadence_minutes: Some(30),
                ..Default::default()
            },
            Lane::Interactive,
            "tester",
            2000,
        )
        .unwrap();

        let audit = svc.audit.list_by_task_id("t3", 10).unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].action, TaskAuditAction::Update);
        assert!(audit[0].before_json.is_some());
        assert!(audit[0].after_json.is_some());
    }
}
