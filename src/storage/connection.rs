//! SQLite connection management
//!
//! Single blocking connection behind a mutex. The executor is strictly
//! sequential; no locking protocol beyond what SQLite provides internally
//! is layered on top.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::{RecallError, Result};

/// Storage engine wrapping a SQLite connection
///
/// `close()` drops the connection; every clone observes the closed state
/// and subsequent operations fail with [`RecallError::Closed`].
pub struct Storage {
    db_path: String,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl Storage {
    /// Open or create a database at the given path
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Self::create_connection(db_path)?;
        run_migrations(&conn)?;

        Ok(Self {
            db_path: db_path.to_string(),
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn create_connection(db_path: &str) -> Result<Connection> {
        let conn = if db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            Connection::open_with_flags(db_path, flags)?
        };

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA cache_size=-32000;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            "#,
        )?;

        Ok(conn)
    }

    /// Execute a function with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(RecallError::Closed)?;
        f(conn)
    }

    /// Execute a function inside a transaction
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(RecallError::Closed)?;
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Release the underlying connection; safe to call multiple times
    pub fn close(&self) {
        let mut guard = self.conn.lock();
        if let Some(conn) = guard.take() {
            // Best effort; an in-flight WAL checkpoint failure is not fatal
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }

    /// Whether the connection has been released
    pub fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }

    /// Get database path
    pub fn db_path(&self) -> &str {
        &self.db_path
    }
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        Self {
            db_path: self.db_path.clone(),
            conn: self.conn.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.db_path(), ":memory:");
        assert!(!storage.is_closed());
    }

    #[test]
    fn close_is_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        storage.close();
        storage.close();
        assert!(storage.is_closed());

        let err = storage.with_connection(|_| Ok(())).unwrap_err();
        assert!(matches!(err, RecallError::Closed));
    }

    #[test]
    fn clones_share_closed_state() {
        let storage = Storage::open_in_memory().unwrap();
        let other = storage.clone();
        storage.close();
        assert!(other.is_closed());
    }
}
