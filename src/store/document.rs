// ABOUTME: SQLite-backed document store: (collection, id) rows holding JSON bodies.
// ABOUTME: Default DocumentStore implementation behind the store boundary trait.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{DocumentStore, StoreError};

#[derive(Clone)]
pub struct SqliteDocumentStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Permanent(format!("create store directory: {e}")))?;
        }
        let conn = Connection::open(path.as_ref())?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )",
            [],
        )?;
        tracing::info!(path = %path.as_ref().display(), "document store opened");
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )",
            [],
        )?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.db
            .lock()
            .map_err(|e| StoreError::Permanent(format!("document store mutex poisoned: {e}")))
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn put(
        &self,
        collection: &str,
        id: &str,
        doc: serde_json::Value,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_string(&doc)?;
        let db = self.lock()?;
        db.execute(
            "INSERT INTO documents (collection, id, body, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (collection, id) DO UPDATE SET body = ?3, updated_at = ?4",
            params![collection, id, body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let db = self.lock()?;
        let body: Option<String> = match db.query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| row.get(0),
        ) {
            Ok(body) => Some(body),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let db = self.lock()?;
        let removed = db.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(removed > 0)
    }

    async fn append(&self, collection: &str, doc: serde_json::Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.put(collection, &id, doc).await?;
        Ok(id)
    }

    async fn recent(
        &self,
        collection: &str,
        limit: usize,
    ) -> Result<Vec<(String, serde_json::Value)>, StoreError> {
        let db = self.lock()?;
        let mut stmt = db.prepare(
            "SELECT id, body FROM documents WHERE collection = ?1
             ORDER BY updated_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![collection, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut docs = Vec::new();
        for row in rows {
            let (id, body) = row?;
            docs.push((id, serde_json::from_str(&body)?));
        }
        Ok(docs)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let db = self.lock()?;
        db.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}
