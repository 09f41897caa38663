//! The response cache.
//!
//! Key -> (cachedAt, blob) with TTL checked at read time. Expired rows stay
//! on disk; the next write for the key replaces them.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::error::Result;
use crate::pool::ConnectionPool;

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// A fresh entry.
    Hit(Vec<u8>),
    /// The newest entry for the key is older than the TTL.
    Expired,
    /// No entry for the key.
    Miss,
}

/// Durable cache of synthesized responses.
#[derive(Clone)]
pub struct ResponseCache {
    pool: ConnectionPool,
}

impl ResponseCache {
    /// Opens (or creates) the cache at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(Self {
            pool: ConnectionPool::new(path)?,
        })
    }

    /// Opens an in-memory cache (for testing).
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            pool: ConnectionPool::in_memory()?,
        })
    }

    /// Reads the newest entry for `key`, applying the TTL.
    pub fn get(&self, key: &str, ttl: chrono::Duration) -> Result<Lookup> {
        let conn = self.pool.get()?;

        let row = conn.query_row(
            "SELECT cachedAt, response FROM cache
             WHERE key = ?1 ORDER BY cachedAt DESC LIMIT 1",
            [key],
            |row| {
                Ok((
                    row.get::<_, DateTime<Utc>>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                ))
            },
        );

        match row {
            Ok((cached_at, response)) => {
                if Utc::now() - cached_at > ttl {
                    Ok(Lookup::Expired)
                } else {
                    Ok(Lookup::Hit(response))
                }
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(Lookup::Miss),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert-or-replace the entry for `key`.
    pub fn put(&self, key: &str, response: &[u8], now: DateTime<Utc>) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache (cachedAt, key, response) VALUES (?1, ?2, ?3)",
            params![now, key, response],
        )?;
        Ok(())
    }
}
