//! SQLite persistence
//!
//! A single connection guarded by a mutex. Each ledger service borrows it
//! through [`Storage::with_conn`] or [`Storage::with_tx`] and keeps its own
//! queries next to its domain logic.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use log::{error, info};
use rusqlite::{Connection, Transaction};

use crate::core::error::{AppError, AppResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    full_name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    photo_url TEXT,
    role TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

CREATE TABLE IF NOT EXISTS workers (
    id TEXT PRIMARY KEY,
    supervisor_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    full_name TEXT NOT NULL,
    phone_number TEXT NOT NULL UNIQUE,
    base_rate REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workers_supervisor ON workers(supervisor_id);

CREATE TABLE IF NOT EXISTS work_days (
    id TEXT PRIMARY KEY,
    worker_id TEXT NOT NULL REFERENCES workers(id) ON DELETE CASCADE,
    work_date TEXT NOT NULL,
    check_in TEXT,
    check_out TEXT,
    leave_start TEXT,
    leave_end TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (worker_id, work_date)
);

CREATE TABLE IF NOT EXISTS payments (
    id TEXT PRIMARY KEY,
    worker_id TEXT NOT NULL REFERENCES workers(id) ON DELETE CASCADE,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    base_rate REAL NOT NULL,
    total_days INTEGER NOT NULL,
    total_amount REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'paid',
    created_at TEXT NOT NULL,
    UNIQUE (worker_id, period_start, period_end)
);
CREATE INDEX IF NOT EXISTS idx_payments_period ON payments(worker_id, period_end);
"#;

/// Handle to the service database
#[derive(Debug)]
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open (or create) the database file and apply the schema
    pub fn open(path: &str) -> AppResult<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    AppError::Storage(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        info!("Opened database at {}", path);
        Self::from_connection(conn)
    }

    /// Fresh private database, used by tests
    pub fn open_in_memory() -> AppResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> AppResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            error!("Database connection mutex poisoned");
            AppError::Internal("database connection unavailable".to_string())
        })
    }

    /// Run queries against the connection
    pub fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run queries inside a transaction, committing only when `f` succeeds
    pub fn with_tx<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> AppResult<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

/// True when the error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_applies_twice() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_conn(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let storage = Storage::open_in_memory().unwrap();
        let enabled: i64 = storage
            .with_conn(|conn| Ok(conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let storage = Storage::open_in_memory().unwrap();
        let result: AppResult<()> = storage.with_tx(|tx| {
            tx.execute(
                "INSERT INTO users (id, full_name, email, password_hash, role, created_at, updated_at)
                 VALUES ('u1', 'A', 'a@b.c', 'x', 'admin', '2024-01-01', '2024-01-01')",
                [],
            )?;
            Err(AppError::bad_request("abort"))
        });
        assert!(result.is_err());

        let count: i64 = storage
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_unique_violation_detected() {
        let storage = Storage::open_in_memory().unwrap();
        let insert = "INSERT INTO users (id, full_name, email, password_hash, role, created_at, updated_at)
                      VALUES (?1, 'A', 'dup@b.c', 'x', 'admin', '2024-01-01', '2024-01-01')";
        storage
            .with_conn(|conn| {
                conn.execute(insert, ["u1"])?;
                Ok(())
            })
            .unwrap();

        let err = storage
            .with_conn(|conn| Ok(conn.execute(insert, ["u2"]).map_err(|e| is_unique_violation(&e))))
            .unwrap();
        assert_eq!(err, Err(true));
    }
}
