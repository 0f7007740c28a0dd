//! Audit log (§4.D): immutable task-mutation and command-execution ledgers.
//! Append-only; no update or delete operation is ever exposed.

use rusqlite::params;

use crate::database::{
    models::{CommandAudit, CommandStatus, Lane, TaskAudit, TaskAuditAction},
    DbPool,
};
use crate::error::OttoResult;

#[derive(Clone)]
pub struct AuditLog {
    pool: DbPool,
}

impl AuditLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_task_mutation(
        &self,
        id: &str,
        task_id: &str,
        action: TaskAuditAction,
        lane: Lane,
        actor: &str,
        before_json: Option<&str>,
        after_json: Option<&str>,
        metadata_json: Option<&str>,
        now: i64,
    ) -> OttoResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO task_audit (
                id, task_id, action, lane, actor, before_json, after_json, metadata_json, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                id,
                task_id,
                action.as_str(),
                lane.as_str(),
                actor,
                before_json,
                after_json,
                metadata_json,
                now
            ],
        )?;
        Ok(())
    }

    pub fn list_by_task_id(&self, task_id: &str, limit: i64) -> OttoResult<Vec<TaskAudit>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM task_audit WHERE task_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![task_id, limit], TaskAudit::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_recent_task_audit(&self, since_ts: i64, limit: i64) -> OttoResult<Vec<TaskAudit>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM task_audit WHERE created_at >= ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![since_ts, limit], TaskAudit::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn record_command(
        &self,
        id: &str,
        command: &str,
        lane: Lane,
        status: CommandStatus,
        error_message: Option<&str>,
        metadata_json: Option<&str>,
        now: i64,
    ) -> OttoResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO command_audit (
                id, command, lane, status, error_message, metadata_json, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                id,
                command,
                lane.as_str(),
                status.as_str(),
                error_message,
                metadata_json,
                now
            ],
        )?;
        Ok(())
    }

    pub fn list_recent_commands(&self, since_ts: i64, limit: i64) -> OttoResult<Vec<CommandAudit>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM command_audit WHERE created_at >= ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![since_ts, limit], CommandAudit::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_in_memory;

    #[test]
    fn task_mutation_is_append_only_and_ordered_most_recent_first() {
        let log = AuditLog::new(init_in_memory().unwrap());
        log.record_task_mutation(
            "a1", "job1", TaskAuditAction::Create, Lane::Interactive, "tester", None, Some("{}"), None, 1000,
        )
        .unwrap();
        log.record_task_mutation(
            "a2", "job1", TaskAuditAction::Update, Lane::Interactive, "tester", Some("{}"), Some("{}"), None, 2000,
        )
        .unwrap();

        let rows = log.list_by_task_id("job1", 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].action, TaskAuditAction::Update);
        assert_eq!(rows[1].action, TaskAuditAction::Create);
    }

    #[test]
    fn record_command_round_trips_status_and_error() {
        let log = AuditLog::new(init_in_memory().unwrap());
        log.record_command(
            "c1",
            "system.restart",
            Lane::OperatorApi,
            CommandStatus::Denied,
            Some("lane not permitted"),
            None,
            1000,
        )
        .unwrap();

        let rows = log.list_recent_commands(0, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, CommandStatus::Denied);
        assert_eq!(rows[0].error_message.as_deref(), Some("lane not permitted"));
    }
}
