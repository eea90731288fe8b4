//! Database connection pool.
//!
//! A single Mutex-protected connection. Settings are read once at startup and
//! written on Run and Quit, so there is never real contention.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, StorageError};
use crate::schema::run_migrations;

/// Thread-safe handle to the settings database.
#[derive(Clone)]
pub struct ConnectionPool {
    conn: Arc<Mutex<Connection>>,
}

impl ConnectionPool {
    /// Opens (or creates) a file-based database and migrates it.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Creates an in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Borrows the connection.
    pub fn get(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Config("Connection pool poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_pool() {
        let pool = ConnectionPool::in_memory().unwrap();
        let conn = pool.get().unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM config", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_pool_is_clone() {
        let pool1 = ConnectionPool::in_memory().unwrap();
        let pool2 = pool1.clone();

        {
            drop(pool1.get().unwrap());
        }
        drop(pool2.get().unwrap());
    }

    #[test]
    fn test_file_pool_reopens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.db");

        {
            let pool = ConnectionPool::new(&path).unwrap();
            pool.get()
                .unwrap()
                .execute(
                    "INSERT INTO config (key, value, updated_at) VALUES ('k', '1', 'now')",
                    [],
                )
                .unwrap();
        }

        let pool = ConnectionPool::new(&path).unwrap();
        let value: String = pool
            .get()
            .unwrap()
            .query_row("SELECT value FROM config WHERE key = 'k'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(value, "1");
    }
}
