// ABOUTME: Store boundary: DocumentStore and CacheStore traits plus the shared error taxonomy.
// ABOUTME: Concrete SQLite implementations and the lifecycle manager live in submodules.

pub mod cache;
pub mod document;
pub mod manager;

pub use cache::SqliteCacheStore;
pub use document::SqliteDocumentStore;
pub use manager::StoreManager;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Which backing store a handle or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Document,
    Cache,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Document => write!(f, "document"),
            Self::Cache => write!(f, "cache"),
        }
    }
}

/// Store failures, classified so callers know what is worth retrying.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store is degraded or was never connected; fail fast, degrade gracefully
    #[error("{kind} store unavailable")]
    Unavailable { kind: StoreKind },

    /// Retryable failure (busy, locked, connection hiccup)
    #[error("transient store failure: {0}")]
    Transient(String),

    /// Non-retryable failure (schema, disk, constraint)
    #[error("permanent store failure: {0}")]
    Permanent(String),

    /// Stored payload did not decode
    #[error("malformed stored document: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Unavailable { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &e {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Transient(e.to_string())
            }
            _ => Self::Permanent(e.to_string()),
        }
    }
}

/// Document CRUD keyed by (collection, document id). Values are JSON.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace a document.
    async fn put(&self, collection: &str, id: &str, doc: serde_json::Value)
        -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str)
        -> Result<Option<serde_json::Value>, StoreError>;

    /// Returns true if a document was removed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    /// Append a document under a fresh id (event logging); returns the id.
    async fn append(&self, collection: &str, doc: serde_json::Value) -> Result<String, StoreError>;

    /// Most recent documents in a collection, newest first.
    async fn recent(
        &self,
        collection: &str,
        limit: usize,
    ) -> Result<Vec<(String, serde_json::Value)>, StoreError>;

    /// Cheap liveness check used by the health loop.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Flush and release resources. Called once at shutdown.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Key-value cache with optional expiry. Best-effort by contract.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn set(
        &self,
        key: &str,
        value: &str,
        expire: Option<Duration>,
    ) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomic increment; missing keys start at zero. Returns the new value.
    async fn incr(&self, key: &str, amount: i64) -> Result<i64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
