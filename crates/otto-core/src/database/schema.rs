//! SQL schema DDL for the Otto store.

use rusqlite::Connection;

use crate::error::OttoResult;

/// Create all tables and indexes if absent. Idempotent — safe to call on
/// every startup.
pub fn apply(conn: &Connection) -> OttoResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id               TEXT PRIMARY KEY,
            type             TEXT NOT NULL,
            schedule_type    TEXT NOT NULL CHECK (schedule_type IN ('recurring','oneshot')),
            status           TEXT NOT NULL CHECK (status IN ('idle','running','paused')),
            profile_id       TEXT,
            model_ref        TEXT,
            payload          TEXT,
            run_at           INTEGER,
            cadence_minutes  INTEGER,
            last_run_at      INTEGER,
            next_run_at      INTEGER,
            terminal_state   TEXT CHECK (terminal_state IN ('completed','expired','cancelled')),
            terminal_reason  TEXT,
            lock_token       TEXT,
            lock_expires_at  INTEGER,
            managed_by       TEXT NOT NULL CHECK (managed_by IN ('system','operator')),
            created_at       INTEGER NOT NULL,
            updated_at       INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_due
            ON jobs (next_run_at)
            WHERE terminal_state IS NULL;

        CREATE TABLE IF NOT EXISTS job_runs (
            id              TEXT PRIMARY KEY,
            job_id          TEXT NOT NULL REFERENCES jobs(id),
            scheduled_for   INTEGER,
            started_at      INTEGER NOT NULL,
            finished_at     INTEGER,
            status          TEXT NOT NULL CHECK (status IN ('success','failed','skipped')),
            error_code      TEXT,
            error_message   TEXT,
            result_json     TEXT,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_job_runs_job_id ON job_runs (job_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS outbound_messages (
            id                TEXT PRIMARY KEY,
            chat_id           INTEGER NOT NULL,
            content           TEXT NOT NULL,
            priority          TEXT NOT NULL CHECK (priority IN ('low','normal','high','critical')),
            status            TEXT NOT NULL CHECK (status IN ('queued','sent','failed','cancelled')),
            dedupe_key        TEXT UNIQUE,
            attempt_count     INTEGER NOT NULL DEFAULT 0,
            next_attempt_at   INTEGER,
            sent_at           INTEGER,
            failed_at         INTEGER,
            error_message     TEXT,
            created_at        INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_outbound_due
            ON outbound_messages (created_at)
            WHERE status = 'queued';

        CREATE TABLE IF NOT EXISTS task_audit (
            id             TEXT PRIMARY KEY,
            task_id        TEXT NOT NULL,
            action         TEXT NOT NULL CHECK (action IN ('create','update','delete')),
            lane           TEXT NOT NULL CHECK (lane IN ('interactive','scheduled','operator-api')),
            actor          TEXT NOT NULL,
            before_json    TEXT,
            after_json     TEXT,
            metadata_json  TEXT,
            created_at     INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_task_audit_task_id ON task_audit (task_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS command_audit (
            id             TEXT PRIMARY KEY,
            command        TEXT NOT NULL,
            lane           TEXT NOT NULL CHECK (lane IN ('interactive','scheduled','operator-api')),
            status         TEXT NOT NULL CHECK (status IN ('success','failed','denied')),
            error_message  TEXT,
            metadata_json  TEXT,
            created_at     INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_command_audit_created_at ON command_audit (created_at DESC);

        CREATE TABLE IF NOT EXISTS user_profile (
            id                        INTEGER PRIMARY KEY CHECK (id = 1),
            timezone                  TEXT NOT NULL DEFAULT 'UTC',
            quiet_hours_start         TEXT,
            quiet_hours_end           TEXT,
            quiet_mode                TEXT NOT NULL CHECK (quiet_mode IN ('critical_only','off')) DEFAULT 'off',
            mute_until                INTEGER,
            heartbeat_time_1          TEXT,
            heartbeat_time_2          TEXT,
            heartbeat_time_3          TEXT,
            heartbeat_cadence_minutes INTEGER NOT NULL DEFAULT 60,
            heartbeat_only_if_signal  INTEGER NOT NULL DEFAULT 0,
            onboarded_at              INTEGER,
            last_digest_at            INTEGER,
            updated_at                INTEGER NOT NULL
        );
        ",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO user_profile (id, updated_at) VALUES (1, 0)",
        [],
    )?;

    Ok(())
}
