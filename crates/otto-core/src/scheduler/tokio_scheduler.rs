//! Tokio-backed scheduler: a tick loop over [`JobRepository::claim_due`]
//! dispatching to a bounded worker pool (§4.E, §5 concurrency model).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::database::models::{Job, JobRun, ManagedBy, RunStatus, ScheduleType, TerminalState};
use crate::error::OttoResult;
use crate::repository::JobRepository;

use super::handler::{HandlerRegistry, JobOutcome};

/// Error code a handler reports when it missed its scheduled window for a
/// one-shot job; the scheduler finalizes such jobs as `expired` rather than
/// `completed`.
pub const MISSED_WINDOW_ERROR_CODE: &str = "missed_window";

pub struct TokioScheduler {
    repo: JobRepository,
    handlers: Arc<HandlerRegistry>,
    config: SchedulerConfig,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl TokioScheduler {
    pub fn new(repo: JobRepository, handlers: HandlerRegistry, config: SchedulerConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            repo,
            handlers: Arc::new(handlers),
            config,
            stop_tx,
            stop_rx,
        }
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Seed `heartbeat` and `watchdog_failures` jobs if absent, with
    /// `managedBy=system` and `nextRunAt` from the profile's heartbeat
    /// cadence (§4.E step 1).
    #[instrument(skip(self))]
    pub fn seed_system_jobs(&self, now: i64, heartbeat_cadence_minutes: i64) -> OttoResult<()> {
        for job_type in super::SYSTEM_RESERVED_JOB_TYPES {
            if self.repo.get_by_id(job_type)?.is_some() {
                continue;
            }
            let job = Job {
                id: job_type.to_string(),
                job_type: job_type.to_string(),
                schedule_type: ScheduleType::Recurring,
                status: crate::database::models::JobStatus::Idle,
                profile_id: None,
                model_ref: None,
                payload: None,
                run_at: None,
                cadence_minutes: Some(heartbeat_cadence_minutes),
                last_run_at: None,
                next_run_at: Some(now),
                terminal_state: None,
                terminal_reason: None,
                lock_token: None,
                lock_expires_at: None,
                managed_by: ManagedBy::System,
                created_at: now,
                updated_at: now,
            };
            self.repo.upsert(&job)?;
            info!(job_type, "seeded system-reserved job");
        }
        Ok(())
    }

    /// Run the tick loop until [`Self::stop`] is called. Intended to be
    /// spawned as its own task.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.tick_ms));
        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool_size));
        let mut stop_rx = self.stop_rx.clone();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(&semaphore).await {
                        error!(error = %e, "scheduler tick failed");
                    }
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        info!("scheduler stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self, semaphore: &Arc<Semaphore>) -> OttoResult<()> {
        let now = crate::now_millis();
        let lock_token = Uuid::new_v4().to_string();

        let claimed = self.repo.claim_due(
            now,
            self.config.claim_batch_limit,
            &lock_token,
            self.config.lease_ms as i64,
        )?;

        for job in claimed {
            let permit = semaphore.clone().acquire_owned().await;
            let repo = self.repo.clone();
            let handlers = self.handlers.clone();
            let lease_ms = self.config.lease_ms;
            let lock_token = lock_token.clone();

            tokio::spawn(async move {
                let _permit = permit;
                process_job(repo, handlers, job, lock_token, lease_ms).await;
            });
        }

        Ok(())
    }
}

#[instrument(skip(repo, handlers, job), fields(job_id = %job.id, job_type = %job.job_type))]
async fn process_job(
    repo: JobRepository,
    handlers: Arc<HandlerRegistry>,
    job: Job,
    lock_token: String,
    lease_ms: u64,
) {
    let run_id = Uuid::new_v4().to_string();
    let started_at = crate::now_millis();

    let run = JobRun {
        id: run_id.clone(),
        job_id: job.id.clone(),
        scheduled_for: job.next_run_at,
        started_at,
        finished_at: None,
        status: RunStatus::Failed,
        error_code: None,
        error_message: None,
        result_json: None,
        created_at: started_at,
    };
    if let Err(e) = repo.insert_run(&run) {
        error!(error = %e, "failed to insert job run");
        return;
    }

    let outcome = match handlers.get(&job.job_type) {
        None => JobOutcome::Failed {
            error_code: Some("handler_not_found".to_string()),
            error_message: format!("no handler registered for job type '{}'", job.job_type),
        },
        Some(handler) => {
            let (cancel_tx, cancel_rx) = watch::channel(false);
            let lease_guard = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(lease_ms)).await;
                let _ = cancel_tx.send(true);
            });

            let outcome = handler.run(job.payload.clone(), cancel_rx).await;
            lease_guard.abort();
            outcome
        }
    };

    let finished_at = crate::now_millis();
    let (status, error_code, error_message, result_json) = match &outcome {
        JobOutcome::Success { result_json } => (RunStatus::Success, None, None, result_json.clone()),
        JobOutcome::Failed { error_code, error_message } => {
            (RunStatus::Failed, error_code.clone(), Some(error_message.clone()), None)
        }
        JobOutcome::Skipped { error_message } => {
            (RunStatus::Skipped, None, error_message.clone(), None)
        }
    };

    if let Err(e) = repo.mark_run_finished(
        &run_id,
        status,
        finished_at,
        error_code.as_deref(),
        error_message.as_deref(),
        result_json.as_deref(),
    ) {
        error!(error = %e, "failed to mark run finished");
    }

    if let Err(e) = finalize_or_reschedule(&repo, &job, &lock_token, started_at, error_code.as_deref()) {
        warn!(error = %e, "reschedule/finalize failed");
    }
}

/// Reschedule a recurring job or finalize a one-shot job, guarded atomically
/// by `lock_token` (§4.E step 5).
fn finalize_or_reschedule(
    repo: &JobRepository,
    job: &Job,
    lock_token: &str,
    started_at: i64,
    error_code: Option<&str>,
) -> OttoResult<()> {
    let now = crate::now_millis();

    match job.schedule_type {
        ScheduleType::Recurring => {
            let cadence_ms = job.cadence_minutes.unwrap_or(1).max(1) * 60_000;
            let mut next_run_at = started_at + cadence_ms;
            while next_run_at <= now {
                next_run_at += cadence_ms;
            }
            repo.reschedule_recurring(&job.id, lock_token, started_at, next_run_at, now)?;
        }
        ScheduleType::Oneshot => {
            let terminal_state = if error_code == Some(MISSED_WINDOW_ERROR_CODE) {
                TerminalState::Expired
            } else {
                TerminalState::Completed
            };
            repo.finalize_oneshot(&job.id, lock_token, terminal_state, None, started_at, now)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_in_memory;
    use crate::database::models::JobStatus;
    use crate::scheduler::handler::JobHandler;

    struct AlwaysSucceeds;

    #[async_trait::async_trait]
    impl JobHandler for AlwaysSucceeds {
        async fn run(&self, _payload: Option<String>, _cancelled: watch::Receiver<bool>) -> JobOutcome {
            JobOutcome::Success { result_json: None }
        }
    }

    fn recurring_job(id: &str, next_run_at: i64) -> Job {
        Job {
            id: id.to_string(),
            job_type: "daily_digest".to_string(),
            schedule_type: ScheduleType::Recurring,
            status: JobStatus::Idle,
            profile_id: None,
            model_ref: None,
            payload: None,
            run_at: None,
            cadence_minutes: Some(60),
            last_run_at: None,
            next_run_at: Some(next_run_at),
            terminal_state: None,
            terminal_reason: None,
            lock_token: None,
            lock_expires_at: None,
            managed_by: ManagedBy::Operator,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn seed_system_jobs_is_idempotent() {
        let repo = JobRepository::new(init_in_memory().unwrap());
        let scheduler = TokioScheduler::new(repo.clone(), HandlerRegistry::new(), SchedulerConfig::default());

        scheduler.seed_system_jobs(1000, 480).unwrap();
        scheduler.seed_system_jobs(2000, 480).unwrap();

        for job_type in crate::scheduler::SYSTEM_RESERVED_JOB_TYPES {
            let job = repo.get_by_id(job_type).unwrap().unwrap();
            assert_eq!(job.managed_by, ManagedBy::System);
            // Re-seeding must not clobber the first seed's next_run_at.
            assert_eq!(job.next_run_at, Some(1000));
        }
    }

    /// Scenario 1 / P2: a recurring job processed twice in a row ends up
    /// idle both times with a strictly advancing `next_run_at`, never
    /// terminal.
    #[tokio::test]
    async fn recurring_job_fires_twice_and_keeps_advancing() {
        let repo = JobRepository::new(init_in_memory().unwrap());
        repo.upsert(&recurring_job("r1", 1000)).unwrap();

        let mut handlers = HandlerRegistry::new();
        handlers.register("daily_digest", Arc::new(AlwaysSucceeds));
        let handlers = Arc::new(handlers);

        let claimed = repo.claim_due(1000, 10, "lock-1", 60_000).unwrap();
        process_job(repo.clone(), handlers.clone(), claimed[0].clone(), "lock-1".to_string(), 60_000).await;

        let after_first = repo.get_by_id("r1").unwrap().unwrap();
        assert_eq!(after_first.status, JobStatus::Idle);
        assert!(after_first.terminal_state.is_none());
        let first_next_run_at = after_first.next_run_at.unwrap();
        assert!(first_next_run_at > 1000);

        let claimed = repo.claim_due(first_next_run_at, 10, "lock-2", 60_000).unwrap();
        assert_eq!(claimed.len(), 1, "job should be due again after its cadence elapses");
        process_job(repo.clone(), handlers, claimed[0].clone(), "lock-2".to_string(), 60_000).await;

        let after_second = repo.get_by_id("r1").unwrap().unwrap();
        assert_eq!(after_second.status, JobStatus::Idle);
        assert!(after_second.terminal_state.is_none());
        assert!(after_second.next_run_at.unwrap() >= first_next_run_at);
        assert_eq!(repo.count_runs_by_job_id("r1").unwrap(), 2);
    }

    /// Scenario 2 / P3: a one-shot job processed once becomes terminal and
    /// is never claimable again.
    #[tokio::test]
    async fn oneshot_job_completes_and_becomes_terminal() {
        let repo = JobRepository::new(init_in_memory().unwrap());
        let mut job = recurring_job("o1", 1000);
        job.schedule_type = ScheduleType::Oneshot;
        job.cadence_minutes = None;
        job.run_at = Some(1000);
        repo.upsert(&job).unwrap();

        let mut handlers = HandlerRegistry::new();
        handlers.register("daily_digest", Arc::new(AlwaysSucceeds));
        let handlers = Arc::new(handlers);

        let claimed = repo.claim_due(1000, 10, "lock-1", 60_000).unwrap();
        process_job(repo.clone(), handlers, claimed[0].clone(), "lock-1".to_string(), 60_000).await;

        let job = repo.get_by_id("o1").unwrap().unwrap();
        assert_eq!(job.terminal_state, Some(TerminalState::Completed));
        assert!(job.next_run_at.is_none());

        let claimed_again = repo.claim_due(100_000, 10, "lock-2", 60_000).unwrap();
        assert!(claimed_again.is_empty());
    }

    /// §5 / P1: a job whose lease expired before the handler finished is
    /// reclaimable by a second worker, and only that worker's
    /// reschedule/finalize call takes effect.
    #[tokio::test]
    async fn lease_expiry_allows_reclaim_and_stale_worker_loses() {
        let repo = JobRepository::new(init_in_memory().unwrap());
        repo.upsert(&recurring_job("r2", 1000)).unwrap();

        let claimed = repo.claim_due(1000, 10, "lock-stale", 1_000).unwrap();
        assert_eq!(claimed.len(), 1);

        // The lease has since expired; a second worker reclaims the job.
        let reclaimed = repo.claim_due(5000, 10, "lock-fresh", 60_000).unwrap();
        assert_eq!(reclaimed.len(), 1);

        // The stale worker's finalize, arriving late, must not win.
        let stale_result = finalize_or_reschedule(&repo, &claimed[0], "lock-stale", 1000, None);
        assert!(stale_result.is_ok());
        let job = repo.get_by_id("r2").unwrap().unwrap();
        assert_eq!(job.lock_token.as_deref(), Some("lock-fresh"));

        let fresh_result = finalize_or_reschedule(&repo, &reclaimed[0], "lock-fresh", 5000, None);
        assert!(fresh_result.is_ok());
        let job = repo.get_by_id("r2").unwrap().unwrap();
        assert!(job.lock_token.is_none());
        assert_eq!(job.status, JobStatus::Idle);
    }
}
