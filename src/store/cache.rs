// ABOUTME: SQLite-backed key-value cache with per-key expiry.
// ABOUTME: Default CacheStore implementation; expired rows are reaped lazily on read.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{CacheStore, StoreError};

#[derive(Clone)]
pub struct SqliteCacheStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteCacheStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Permanent(format!("create store directory: {e}")))?;
        }
        let conn = Connection::open(path.as_ref())?;
        Self::init(&conn)?;
        tracing::info!(path = %path.as_ref().display(), "cache store opened");
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn init(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at TEXT
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.db
            .lock()
            .map_err(|e| StoreError::Permanent(format!("cache store mutex poisoned: {e}")))
    }

    fn expiry_from(expire: Option<Duration>) -> Option<String> {
        expire.map(|d| {
            (Utc::now() + ChronoDuration::milliseconds(d.as_millis() as i64)).to_rfc3339()
        })
    }

    fn is_expired(expires_at: &Option<String>) -> bool {
        match expires_at {
            Some(stamp) => DateTime::parse_from_rfc3339(stamp)
                .map(|t| t.with_timezone(&Utc) <= Utc::now())
                .unwrap_or(true),
            None => false,
        }
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn set(
        &self,
        key: &str,
        value: &str,
        expire: Option<Duration>,
    ) -> Result<(), StoreError> {
        let db = self.lock()?;
        db.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET value = ?2, expires_at = ?3",
            params![key, value, Self::expiry_from(expire)],
        )?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let db = self.lock()?;
        let row: Option<(String, Option<String>)> = match db.query_row(
            "SELECT value, expires_at FROM kv WHERE key = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        ) {
            Ok(row) => Some(row),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };
        match row {
            Some((_, ref expires_at)) if Self::is_expired(expires_at) => {
                db.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let db = self.lock()?;
        db.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    async fn incr(&self, key: &str, amount: i64) -> Result<i64, StoreError> {
        let db = self.lock()?;
        db.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, NULL)
             ON CONFLICT (key) DO UPDATE SET
                 value = CAST(CAST(kv.value AS INTEGER) + ?3 AS TEXT)",
            params![key, amount.to_string(), amount],
        )?;
        let value: String = db.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        value
            .parse::<i64>()
            .map_err(|e| StoreError::Permanent(format!("counter value not an integer: {e}")))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let db = self.lock()?;
        db.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}
