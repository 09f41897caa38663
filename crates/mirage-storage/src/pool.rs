//! Database connection pool.
//!
//! A Mutex-protected connection is enough here: the cache sees one short
//! read or write per request and SQLite serializes writers anyway.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, StorageError};
use crate::schema::run_migrations;

/// Thread-safe handle to the cache database.
#[derive(Clone)]
pub struct ConnectionPool {
    conn: Arc<Mutex<Connection>>,
}

impl ConnectionPool {
    /// Opens (or creates) a file-backed database.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::setup_connection(&conn)?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::setup_connection(&conn)?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Borrows the connection.
    pub fn get(&self) -> Result<PooledConnection<'_>> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| StorageError::Config("connection pool poisoned".to_string()))?;

        Ok(PooledConnection { guard })
    }

    /// Connection pragmas: WAL keeps concurrent handler reads cheap while a
    /// miss is being written.
    fn setup_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA cache_size = -2000;")?;
        Ok(())
    }
}

/// A connection borrowed from the pool.
pub struct PooledConnection<'a> {
    guard: MutexGuard<'a, Connection>,
}

impl<'a> std::ops::Deref for PooledConnection<'a> {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_pool_has_cache_table() {
        let pool = ConnectionPool::in_memory().unwrap();
        let conn = pool.get().unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn pool_clones_share_the_database() {
        let pool1 = ConnectionPool::in_memory().unwrap();
        let pool2 = pool1.clone();

        pool1
            .get()
            .unwrap()
            .execute(
                "INSERT INTO cache (cachedAt, key, response) VALUES ('2026-01-01T00:00:00+00:00', 'k', x'00')",
                [],
            )
            .unwrap();

        let count: i64 = pool2
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
