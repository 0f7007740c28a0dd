//! Embedded SQLite store: connection pool, schema migrations, and the
//! `BEGIN IMMEDIATE` primitive used for atomic claim-due scheduling.

pub mod models;
pub mod schema;

use std::path::Path;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::error::{OttoError, OttoResult};

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Open (or create) the SQLite database at `path`, enable WAL mode and
/// foreign keys on every pooled connection, and apply the schema.
pub fn init(path: &Path) -> OttoResult<DbPool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| OttoError::Internal(format!("failed to create db directory: {e}")))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = r2d2::Pool::builder()
        .max_size(16)
        .build(manager)
        .map_err(|e| OttoError::Internal(format!("failed to build connection pool: {e}")))?;

    {
        let conn = pool.get()?;
        schema::apply(&conn)?;
    }

    Ok(pool)
}

/// Open an in-memory pool for tests. Schema is applied immediately; WAL mode
/// is skipped since SQLite ignores it for `:memory:` databases anyway.
pub fn init_in_memory() -> OttoResult<DbPool> {
    let manager = SqliteConnectionManager::memory().with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| OttoError::Internal(format!("failed to build connection pool: {e}")))?;

    {
        let conn = pool.get()?;
        schema::apply(&conn)?;
    }

    Ok(pool)
}

/// Run `f` inside a `BEGIN IMMEDIATE` transaction, committing on `Ok` and
/// rolling back on `Err`. Used by claim-due style compare-and-set updates
/// that must not interleave with another writer.
pub fn with_immediate_tx<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Connection) -> OttoResult<T>,
) -> OttoResult<T> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            conn.execute_batch("ROLLBACK").ok();
            Err(e)
        }
    }
}
