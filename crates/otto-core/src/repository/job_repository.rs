//! Job repository (§4.B): CRUD, due-claim, and run-history for scheduled
//! jobs.

use rusqlite::{params, OptionalExtension};

use crate::database::{
    models::{Job, JobRun, ManagedBy, RunStatus, TerminalState},
    DbPool,
};
use crate::error::{OttoError, OttoResult};

#[derive(Clone)]
pub struct JobRepository {
    pool: DbPool,
}

impl JobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn upsert(&self, job: &Job) -> OttoResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO jobs (
                id, type, schedule_type, status, profile_id, model_ref, payload,
                run_at, cadence_minutes, last_run_at, next_run_at,
                terminal_state, terminal_reason, lock_token, lock_expires_at,
                managed_by, created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)
            ON CONFLICT(id) DO UPDATE SET
                type=excluded.type, schedule_type=excluded.schedule_type,
                status=excluded.status, profile_id=excluded.profile_id,
                model_ref=excluded.model_ref, payload=excluded.payload,
                run_at=excluded.run_at, cadence_minutes=excluded.cadence_minutes,
                last_run_at=excluded.last_run_at, next_run_at=excluded.next_run_at,
                terminal_state=excluded.terminal_state, terminal_reason=excluded.terminal_reason,
                lock_token=excluded.lock_token, lock_expires_at=excluded.lock_expires_at,
                managed_by=excluded.managed_by, updated_at=excluded.updated_at",
            params![
                job.id,
                job.job_type,
                job.schedule_type.as_str(),
                job.status.as_str(),
                job.profile_id,
                job.model_ref,
                job.payload,
                job.run_at,
                job.cadence_minutes,
                job.last_run_at,
                job.next_run_at,
                job.terminal_state.map(TerminalState::as_str),
                job.terminal_reason,
                job.lock_token,
                job.lock_expires_at,
                job.managed_by.as_str(),
                job.created_at,
                job.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_by_id(&self, id: &str) -> OttoResult<Option<Job>> {
        let conn = self.pool.get()?;
        conn.query_row("SELECT * FROM jobs WHERE id = ?1", params![id], Job::from_row)
            .optional()
            .map_err(OttoError::from)
    }

    pub fn list_tasks(&self) -> OttoResult<Vec<Job>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT * FROM jobs ORDER BY updated_at DESC")?;
        let rows = stmt
            .query_map([], Job::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_profile(&self, id: &str, profile_id: Option<&str>, now: i64) -> OttoResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE jobs SET profile_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![profile_id, now, id],
        )?;
        Ok(())
    }

    /// Logical cancel: terminal state `cancelled`.
    pub fn cancel_task(&self, id: &str, reason: &str, now: i64) -> OttoResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE jobs SET status='idle', next_run_at=NULL,
             terminal_state='cancelled', terminal_reason=?1, updated_at=?2
             WHERE id = ?3",
            params![reason, now, id],
        )?;
        Ok(())
    }

    /// Atomically claim up to `limit` due jobs, leasing them to `lock_token`
    /// for `lease_ms`. Guarded by `BEGIN IMMEDIATE` so the select-then-update
    /// forms a single critical section (§4.B `claimDue`).
    pub fn claim_due(
        &self,
        now: i64,
        limit: i64,
        lock_token: &str,
        lease_ms: i64,
    ) -> OttoResult<Vec<Job>> {
        let mut conn = self.pool.get()?;
        crate::database::with_immediate_tx(&mut conn, |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM jobs
                 WHERE status != 'paused'
                   AND next_run_at IS NOT NULL AND next_run_at <= ?1
                   AND terminal_state IS NULL
                   AND (lock_token IS NULL OR lock_expires_at <= ?1)
                 ORDER BY next_run_at ASC, id ASC
                 LIMIT ?2",
            )?;
            let ids: Vec<String> = stmt
                .query_map(params![now, limit], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;

            let new_lease_expiry = now + lease_ms;
            let mut claimed = Vec::with_capacity(ids.len());
            for id in &ids {
                let changed = conn.execute(
                    "UPDATE jobs SET status='running', lock_token=?1, lock_expires_at=?2, updated_at=?3
                     WHERE id = ?4
                       AND status != 'paused'
                       AND next_run_at IS NOT NULL AND next_run_at <= ?3
                       AND terminal_state IS NULL
                       AND (lock_token IS NULL OR lock_expires_at <= ?3)",
                    params![lock_token, new_lease_expiry, now, id],
                )?;
                if changed == 1 {
                    if let Some(job) = conn
                        .query_row("SELECT * FROM jobs WHERE id = ?1", params![id], Job::from_row)
                        .optional()?
                    {
                        claimed.push(job);
                    }
                }
            }
            Ok(claimed)
        })
    }

    /// Clear lock fields iff `lock_token` matches. Abort/panic path only.
    pub fn release_lock(&self, id: &str, lock_token: &str) -> OttoResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE jobs SET lock_token=NULL, lock_expires_at=NULL
             WHERE id = ?1 AND lock_token = ?2",
            params![id, lock_token],
        )?;
        Ok(())
    }

    pub fn insert_run(&self, run: &JobRun) -> OttoResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO job_runs (
                id, job_id, scheduled_for, started_at, finished_at,
                status, error_code, error_message, result_json, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                run.id,
                run.job_id,
                run.scheduled_for,
                run.started_at,
                run.finished_at,
                run.status.as_str(),
                run.error_code,
                run.error_message,
                run.result_json,
                run.created_at,
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn mark_run_finished(
        &self,
        run_id: &str,
        status: RunStatus,
        finished_at: i64,
        error_code: Option<&str>,
        error_message: Option<&str>,
        result_json: Option<&str>,
    ) -> OttoResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE job_runs SET status=?1, finished_at=?2, error_code=?3,
             error_message=?4, result_json=?5 WHERE id = ?6",
            params![
                status.as_str(),
                finished_at,
                error_code,
                error_message,
                result_json,
                run_id
            ],
        )?;
        Ok(())
    }

    /// Atomic recurring completion: clear lock, set `status=idle`, guarded
    /// by `lock_token` so a stale worker cannot clobber a fresh claim.
    pub fn reschedule_recurring(
        &self,
        id: &str,
        lock_token: &str,
        last_run_at: i64,
        next_run_at: i64,
        now: i64,
    ) -> OttoResult<bool> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE jobs SET status='idle', lock_token=NULL, lock_expires_at=NULL,
             last_run_at=?1, next_run_at=?2, updated_at=?3
             WHERE id = ?4 AND lock_token = ?5",
            params![last_run_at, next_run_at, now, id, lock_token],
        )?;
        Ok(changed == 1)
    }

    /// Atomic one-shot completion: clear lock and `next_run_at`, set
    /// terminal fields, guarded by `lock_token`.
    pub fn finalize_oneshot(
        &self,
        id: &str,
        lock_token: &str,
        terminal_state: TerminalState,
        reason: Option<&str>,
        last_run_at: i64,
        now: i64,
    ) -> OttoResult<bool> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE jobs SET status='idle', lock_token=NULL, lock_expires_at=NULL,
             next_run_at=NULL, terminal_state=?1, terminal_reason=?2,
             last_run_at=?3, updated_at=?4
             WHERE id = ?5 AND lock_token = ?6",
            params![
                terminal_state.as_str(),
                reason,
                last_run_at,
                now,
                id,
                lock_token
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn list_runs_by_job_id(&self, job_id: &str, limit: i64, offset: i64) -> OttoResult<Vec<JobRun>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM job_runs WHERE job_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![job_id, limit, offset], JobRun::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_runs_by_job_id(&self, job_id: &str) -> OttoResult<i64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM job_runs WHERE job_id = ?1",
            params![job_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn get_run_by_id(&self, run_id: &str) -> OttoResult<Option<JobRun>> {
        let conn = self.pool.get()?;
        conn.query_row("SELECT * FROM job_runs WHERE id = ?1", params![run_id], JobRun::from_row)
            .optional()
            .map_err(OttoError::from)
    }

    pub fn list_recent_failed_runs(&self, since_ts: i64, limit: i64) -> OttoResult<Vec<JobRun>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM job_runs WHERE status = 'failed' AND created_at >= ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![since_ts, limit], JobRun::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_recent_runs(&self, since_ts: i64, limit: i64) -> OttoResult<Vec<JobRun>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM job_runs WHERE created_at >= ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![since_ts, limit], JobRun::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Retention maintenance: delete runs older than `before_ts`, keeping at
    /// least `keep_per_job` most recent runs per job regardless of age.
    /// Implementer-invoked only; no automatic TTL (open question, resolved
    /// in the design notes).
    pub fn compact_runs(&self, before_ts: i64, keep_per_job: i64) -> OttoResult<u64> {
        let conn = self.pool.get()?;
        let deleted = conn.execute(
            "DELETE FROM job_runs
             WHERE created_at < ?1
               AND id NOT IN (
                   SELECT id FROM (
                       SELECT id, job_id,
                              ROW_NUMBER() OVER (PARTITION BY job_id ORDER BY created_at DESC) AS rn
                       FROM job_runs
                   )
                   WHERE rn <= ?2
               )",
            params![before_ts, keep_per_job],
        )?;
        Ok(deleted as u64)
    }

    pub fn is_system_managed(&self, id: &str) -> OttoResult<bool> {
        Ok(self
            .get_by_id(id)?
            .map(|j| j.managed_by == ManagedBy::System)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_in_memory;
    use crate::database::models::{JobStatus, ScheduleType};

    fn due_job(id: &str, next_run_at: i64) -> Job {
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

    /// P1: only one claimant wins a due row — the second `claim_due` call
    /// against an already-leased row returns nothing.
    #[test]
    fn only_one_claim_wins_a_due_job() {
        let repo = JobRepository::new(init_in_memory().unwrap());
        repo.upsert(&due_job("j1", 1000)).unwrap();

        let first = repo.claim_due(1000, 10, "lock-a", 60_000).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, "j1");

        let second = repo.claim_due(1000, 10, "lock-b", 60_000).unwrap();
        assert!(second.is_empty());
    }

    /// P1/§5: once a lease expires, a fresh claim can reclaim the row with a
    /// new lock token.
    #[test]
    fn expired_lease_can_be_reclaimed() {
        let repo = JobRepository::new(init_in_memory().unwrap());
        repo.upsert(&due_job("j2", 1000)).unwrap();

        let first = repo.claim_due(1000, 10, "lock-a", 1_000).unwrap();
        assert_eq!(first.len(), 1);

        // The lease expired at 2000; a claim at 5000 should reclaim it.
        let reclaimed = repo.claim_due(5000, 10, "lock-b", 60_000).unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].lock_token.as_deref(), Some("lock-b"));
    }

    /// P2: recurrence strictly advances `next_run_at`.
    #[test]
    fn reschedule_recurring_produces_strictly_greater_next_run_at() {
        let repo = JobRepository::new(init_in_memory().unwrap());
        repo.upsert(&due_job("j3", 1000)).unwrap();
        repo.claim_due(1000, 10, "lock-a", 60_000).unwrap();

        let changed = repo
            .reschedule_recurring("j3", "lock-a", 1000, 4_600_000, 1000)
            .unwrap();
        assert!(changed);

        let job = repo.get_by_id("j3").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Idle);
        assert!(job.lock_token.is_none());
        assert!(job.next_run_at.unwrap() > 1000);
    }

    /// Guard: a stale lock token cannot reschedule a job that was already
    /// reclaimed by a fresh worker.
    #[test]
    fn reschedule_recurring_rejects_stale_lock_token() {
        let repo = JobRepository::new(init_in_memory().unwrap());
        repo.upsert(&due_job("j4", 1000)).unwrap();
        repo.claim_due(1000, 10, "lock-a", 60_000).unwrap();

        let changed = repo
            .reschedule_recurring("j4", "stale-token", 1000, 4_600_000, 1000)
            .unwrap();
        assert!(!changed);
    }

    /// P3: a finalized one-shot job leaves `terminal_state` set and
    /// `next_run_at` cleared.
    #[test]
    fn finalize_oneshot_sets_terminal_state_and_clears_next_run_at() {
        let mut job = due_job("j5", 1000);
        job.schedule_type = ScheduleType::Oneshot;
        job.cadence_minutes = None;
        job.run_at = Some(1000);

        let repo = JobRepository::new(init_in_memory().unwrap());
        repo.upsert(&job).unwrap();
        repo.claim_due(1000, 10, "lock-a", 60_000).unwrap();

        let changed = repo
            .finalize_oneshot("j5", "lock-a", TerminalState::Completed, None, 1000, 1500)
            .unwrap();
        assert!(changed);

        let job = repo.get_by_id("j5").unwrap().unwrap();
        assert_eq!(job.terminal_state, Some(TerminalState::Completed));
        assert!(job.next_run_at.is_none());
        assert!(job.lock_token.is_none());
    }
}
