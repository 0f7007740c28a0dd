//! Outbound queue repository (§4.C): enqueue-with-dedupe, due-scan,
//! mark-sent / retry / failed.

use rusqlite::{params, OptionalExtension};

use crate::database::{models::OutboundMessage, DbPool};
use crate::error::{OttoError, OttoResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    Duplicate,
}

#[derive(Clone)]
pub struct OutboundQueueRepository {
    pool: DbPool,
}

impl OutboundQueueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert `msg`; on a unique-constraint violation against `dedupe_key`,
    /// report [`EnqueueOutcome::Duplicate`] instead of failing.
    pub fn enqueue_or_ignore_dedupe(&self, msg: &OutboundMessage) -> OttoResult<EnqueueOutcome> {
        let conn = self.pool.get()?;
        let result = conn.execute(
            "INSERT INTO outbound_messages (
                id, chat_id, content, priority, status, dedupe_key,
                attempt_count, next_attempt_at, sent_at, failed_at, error_message, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                msg.id,
                msg.chat_id,
                msg.content,
                msg.priority.as_str(),
                msg.status.as_str(),
                msg.dedupe_key,
                msg.attempt_count,
                msg.next_attempt_at,
                msg.sent_at,
                msg.failed_at,
                msg.error_message,
                msg.created_at,
            ],
        );

        match result {
            Ok(_) => Ok(EnqueueOutcome::Enqueued),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && msg.dedupe_key.is_some() =>
            {
                // Could be the dedupe_key unique constraint, or some other
                // constraint; re-check to make sure it is actually a
                // duplicate dedupe key before reporting it as one.
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT id FROM outbound_messages WHERE dedupe_key = ?1",
                        params![msg.dedupe_key],
                        |row| row.get(0),
                    )
                    .optional()?;
                if existing.is_some() {
                    Ok(EnqueueOutcome::Duplicate)
                } else {
                    Err(OttoError::Internal(format!("constraint violation: {e}")))
                }
            }
            Err(e) => Err(OttoError::from(e)),
        }
    }

    /// Insert unconditionally; caller manages dedupe elsewhere.
    pub fn enqueue(&self, msg: &OutboundMessage) -> OttoResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO outbound_messages (
                id, chat_id, content, priority, status, dedupe_key,
                attempt_count, next_attempt_at, sent_at, failed_at, error_message, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                msg.id,
                msg.chat_id,
                msg.content,
                msg.priority.as_str(),
                msg.status.as_str(),
                msg.dedupe_key,
                msg.attempt_count,
                msg.next_attempt_at,
                msg.sent_at,
                msg.failed_at,
                msg.error_message,
                msg.created_at,
            ],
        )?;
        Ok(())
    }

    /// Rows where `status='queued'` and eligible for delivery, ordered
    /// priority desc then `created_at` asc (§4.F ordering decision,
    /// documented in DESIGN.md).
    pub fn list_due(&self, now: i64, limit: i64) -> OttoResult<Vec<OutboundMessage>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM outbound_messages
             WHERE status = 'queued' AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
             ORDER BY
                CASE priority
                    WHEN 'critical' THEN 3
                    WHEN 'high' THEN 2
                    WHEN 'normal' THEN 1
                    ELSE 0
                END DESC,
                created_at ASC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![now, limit], OutboundMessage::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn mark_sent(&self, id: &str, attempt_count: i64, ts: i64) -> OttoResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE outbound_messages SET status='sent', attempt_count=?1, sent_at=?2
             WHERE id = ?3",
            params![attempt_count, ts, id],
        )?;
        Ok(())
    }

    pub fn mark_retry(
        &self,
        id: &str,
        attempt_count: i64,
        next_attempt_at: i64,
        error_message: &str,
        ts: i64,
    ) -> OttoResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE outbound_messages SET attempt_count=?1, next_attempt_at=?2,
             error_message=?3 WHERE id = ?4 AND status = 'queued'",
            params![attempt_count, next_attempt_at, error_message, id],
        )?;
        let _ = ts;
        Ok(())
    }

    pub fn mark_failed(&self, id: &str, attempt_count: i64, error_message: &str, ts: i64) -> OttoResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE outbound_messages SET status='failed', attempt_count=?1,
             error_message=?2, failed_at=?3 WHERE id = ?4",
            params![attempt_count, error_message, ts, id],
        )?;
        Ok(())
    }

    pub fn get_by_id(&self, id: &str) -> OttoResult<Option<OutboundMessage>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT * FROM outbound_messages WHERE id = ?1",
            params![id],
            OutboundMessage::from_row,
        )
        .optional()
        .map_err(OttoError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_in_memory;
    use crate::database::models::{MessageStatus, Priority};

    fn message(id: &str, dedupe_key: Option<&str>) -> OutboundMessage {
        OutboundMessage {
            id: id.to_string(),
            chat_id: 42,
            content: "hello".to_string(),
            priority: Priority::Normal,
            status: MessageStatus::Queued,
            dedupe_key: dedupe_key.map(str::to_string),
            attempt_count: 0,
            next_attempt_at: None,
            sent_at: None,
            failed_at: None,
            error_message: None,
            created_at: 1000,
        }
    }

    /// P4: repeated enqueues with the same `dedupeKey` leave exactly one
    /// row in the store, with the remaining attempts reported as duplicates.
    #[test]
    fn enqueue_with_same_dedupe_key_n_times_yields_one_row() {
        let repo = OutboundQueueRepository::new(init_in_memory().unwrap());

        let mut enqueued = 0;
        let mut duplicate = 0;
        for i in 0..5 {
            let outcome = repo
                .enqueue_or_ignore_dedupe(&message(&format!("m{i}"), Some("digest-2024-01-01")))
                .unwrap();
            match outcome {
                EnqueueOutcome::Enqueued => enqueued += 1,
                EnqueueOutcome::Duplicate => duplicate += 1,
            }
        }

        assert_eq!(enqueued, 1);
        assert_eq!(duplicate, 4);
        assert_eq!(enqueued + duplicate, 5);

        let rows = repo.list_due(2000, 10).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn enqueue_without_dedupe_key_never_collapses() {
        let repo = OutboundQueueRepository::new(init_in_memory().unwrap());
        for i in 0..3 {
            let outcome = repo
                .enqueue_or_ignore_dedupe(&message(&format!("m{i}"), None))
                .unwrap();
            assert_eq!(outcome, EnqueueOutcome::Enqueued);
        }
        let rows = repo.list_due(2000, 10).unwrap();
        assert_eq!(rows.len(), 3);
    }
}
