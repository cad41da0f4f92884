//! SQLite connection pool tuned for the session engine.
//!
//! The access pattern is read-heavy: every change notification makes
//! subscribers re-query their tables, so each write is followed by a burst
//! of concurrent reads. WAL mode lets those re-queries run while a write
//! commits, and the busy timeout absorbs contention on the single WAL
//! writer.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use thiserror::Error;

/// Runtime tunables for the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a connection waits on the WAL writer before giving up,
    /// in milliseconds.
    pub busy_timeout_ms: u64,

    /// Upper bound on pooled connections: one writer plus the expected
    /// burst of notification-driven readers.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// Pool handing out configured SQLite connections.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors that can occur when creating the database pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to build connection pool: {0}")]
    Build(#[from] r2d2::Error),
}

/// Opens (or creates) the database at `path` and builds a pool around it.
///
/// Every connection the pool hands out has WAL mode, foreign keys, and the
/// busy timeout applied. `:memory:` is accepted but gives each pooled
/// connection its own private database; state shared across connections
/// needs a file.
pub fn create_pool(
    path: impl AsRef<Path>,
    settings: DbRuntimeSettings,
) -> Result<DbPool, PoolError> {
    let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
        conn.pragma_update(None, "busy_timeout", settings.busy_timeout_ms as i64)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        // In-memory databases report "memory" here; that is the one mode
        // other than WAL the engine accepts.
        conn.pragma_update_and_check(None, "journal_mode", "wal", |row| {
            let mode: String = row.get(0)?;
            if mode == "wal" || mode == "memory" {
                Ok(())
            } else {
                Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!("journal_mode is {mode}, not wal")),
                ))
            }
        })
    });

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?;
    Ok(pool)
}
