// ABOUTME: Tests for the store layer: SQLite document and cache stores plus the
// ABOUTME: lifecycle manager's degraded fail-fast behavior.

use std::sync::Arc;
use std::time::Duration;

use chirp::backoff::BackoffConfig;
use chirp::config::StoreConfig;
use chirp::store::{
    CacheStore, DocumentStore, SqliteCacheStore, SqliteDocumentStore, StoreError, StoreKind,
    StoreManager,
};

fn document_store() -> SqliteDocumentStore {
    SqliteDocumentStore::open_in_memory().expect("in-memory document store")
}

fn cache_store() -> SqliteCacheStore {
    SqliteCacheStore::open_in_memory().expect("in-memory cache store")
}

// =============================================================================
// Document store
// =============================================================================

#[tokio::test]
async fn put_then_get_round_trips_json() {
    let store = document_store();
    let doc = serde_json::json!({"name": "alice", "count": 3});
    store.put("users", "alice", doc.clone()).await.unwrap();

    let loaded = store.get("users", "alice").await.unwrap();
    assert_eq!(loaded, Some(doc));
}

#[tokio::test]
async fn put_replaces_existing_document() {
    let store = document_store();
    store
        .put("users", "alice", serde_json::json!({"v": 1}))
        .await
        .unwrap();
    store
        .put("users", "alice", serde_json::json!({"v": 2}))
        .await
        .unwrap();

    let loaded = store.get("users", "alice").await.unwrap().unwrap();
    assert_eq!(loaded["v"], 2);
}

#[tokio::test]
async fn get_missing_document_is_none() {
    let store = document_store();
    assert_eq!(store.get("users", "nobody").await.unwrap(), None);
}

#[tokio::test]
async fn delete_reports_whether_anything_was_removed() {
    let store = document_store();
    store
        .put("users", "alice", serde_json::json!({}))
        .await
        .unwrap();
    assert!(store.delete("users", "alice").await.unwrap());
    assert!(!store.delete("users", "alice").await.unwrap());
}

#[tokio::test]
async fn append_assigns_unique_ids() {
    let store = document_store();
    let a = store
        .append("events", serde_json::json!({"n": 1}))
        .await
        .unwrap();
    let b = store
        .append("events", serde_json::json!({"n": 2}))
        .await
        .unwrap();
    assert_ne!(a, b);
    assert!(store.get("events", &a).await.unwrap().is_some());
}

#[tokio::test]
async fn recent_returns_newest_first_and_respects_limit() {
    let store = document_store();
    for n in 1..=3 {
        store
            .append("events", serde_json::json!({"n": n}))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let recent = store.recent("events", 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].1["n"], 3);
    assert_eq!(recent[1].1["n"], 2);
}

#[tokio::test]
async fn collections_are_isolated() {
    let store = document_store();
    store
        .put("users", "x", serde_json::json!({"kind": "user"}))
        .await
        .unwrap();
    assert_eq!(store.get("guilds", "x").await.unwrap(), None);
}

// =============================================================================
// Cache store
// =============================================================================

#[tokio::test]
async fn cache_set_get_delete() {
    let cache = cache_store();
    cache.set("greeting", "hello", None).await.unwrap();
    assert_eq!(cache.get("greeting").await.unwrap().as_deref(), Some("hello"));

    cache.delete("greeting").await.unwrap();
    assert_eq!(cache.get("greeting").await.unwrap(), None);
}

#[tokio::test]
async fn expired_keys_read_as_missing() {
    let cache = cache_store();
    cache
        .set("ephemeral", "x", Some(Duration::from_millis(30)))
        .await
        .unwrap();
    assert!(cache.get("ephemeral").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.get("ephemeral").await.unwrap(), None);
}

#[tokio::test]
async fn incr_starts_at_zero_and_accumulates() {
    let cache = cache_store();
    assert_eq!(cache.incr("counter", 1).await.unwrap(), 1);
    assert_eq!(cache.incr("counter", 4).await.unwrap(), 5);
    assert_eq!(cache.incr("counter", -2).await.unwrap(), 3);
}

// =============================================================================
// Store manager
// =============================================================================

#[tokio::test]
async fn absent_stores_fail_fast_with_unavailable() {
    let manager = StoreManager::with_stores(
        None,
        None,
        Duration::from_secs(60),
        BackoffConfig::default(),
    );
    assert!(matches!(
        manager.document(),
        Err(StoreError::Unavailable {
            kind: StoreKind::Document
        })
    ));
    assert!(matches!(
        manager.cache(),
        Err(StoreError::Unavailable {
            kind: StoreKind::Cache
        })
    ));
}

#[tokio::test]
async fn healthy_stores_hand_out_usable_handles() {
    let manager = StoreManager::with_stores(
        Some(Arc::new(document_store())),
        Some(Arc::new(cache_store())),
        Duration::from_secs(60),
        BackoffConfig::default(),
    );
    assert!(manager.is_healthy(StoreKind::Document));

    let documents = manager.document().unwrap();
    documents
        .put("users", "alice", serde_json::json!({}))
        .await
        .unwrap();
    assert!(documents.get("users", "alice").await.unwrap().is_some());

    manager.check_now().await;
    assert!(manager.is_healthy(StoreKind::Document));
    assert!(manager.is_healthy(StoreKind::Cache));
}

/// Document store double whose ping can be flipped to failing.
struct FlakyDocumentStore {
    inner: SqliteDocumentStore,
    failing: std::sync::atomic::AtomicBool,
}

impl FlakyDocumentStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteDocumentStore::open_in_memory().unwrap(),
            failing: std::sync::atomic::AtomicBool::new(false),
        })
    }

    fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl DocumentStore for FlakyDocumentStore {
    async fn put(
        &self,
        collection: &str,
        id: &str,
        doc: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.inner.put(collection, id, doc).await
    }

    async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.inner.delete(collection, id).await
    }

    async fn append(&self, collection: &str, doc: serde_json::Value) -> Result<String, StoreError> {
        self.inner.append(collection, doc).await
    }

    async fn recent(
        &self,
        collection: &str,
        limit: usize,
    ) -> Result<Vec<(String, serde_json::Value)>, StoreError> {
        self.inner.recent(collection, limit).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Transient("connection refused".into()));
        }
        self.inner.ping().await
    }
}

#[tokio::test]
async fn failed_health_checks_degrade_the_handle_until_recovery() {
    let flaky = FlakyDocumentStore::new();
    let manager = StoreManager::with_stores(
        Some(Arc::clone(&flaky) as Arc<dyn DocumentStore>),
        None,
        Duration::from_secs(60),
        BackoffConfig::default(),
    );
    assert!(manager.document().is_ok());

    flaky.set_failing(true);
    manager.check_now().await;
    assert!(!manager.is_healthy(StoreKind::Document));
    assert!(matches!(
        manager.document(),
        Err(StoreError::Unavailable {
            kind: StoreKind::Document
        })
    ));

    flaky.set_failing(false);
    manager.check_now().await;
    assert!(manager.is_healthy(StoreKind::Document));
    assert!(manager.document().is_ok());
}

#[tokio::test]
async fn failed_open_is_retried_and_recovers() {
    let dir = tempfile::tempdir().unwrap();
    // A plain file where the store directory should be makes the open fail.
    let blocker = dir.path().join("docs");
    std::fs::write(&blocker, b"in the way").unwrap();

    let config = StoreConfig {
        document_path: dir
            .path()
            .join("docs/docs.db")
            .to_string_lossy()
            .into_owned(),
        cache_path: dir.path().join("cache.db").to_string_lossy().into_owned(),
        health_check_secs: 1,
    };
    let manager = StoreManager::connect(&config, BackoffConfig::default());

    assert!(matches!(
        manager.document(),
        Err(StoreError::Unavailable {
            kind: StoreKind::Document
        })
    ));
    assert!(manager.cache().is_ok());

    // Still down while the underlying cause persists.
    manager.check_now().await;
    assert!(!manager.is_healthy(StoreKind::Document));

    std::fs::remove_file(&blocker).unwrap();
    manager.check_now().await;
    assert!(manager.is_healthy(StoreKind::Document));

    let documents = manager.document().unwrap();
    documents
        .put("users", "alice", serde_json::json!({}))
        .await
        .unwrap();
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let manager = StoreManager::with_stores(
        Some(Arc::new(document_store())),
        Some(Arc::new(cache_store())),
        Duration::from_secs(60),
        BackoffConfig::default(),
    );
    manager.shutdown().await;
    manager.shutdown().await;
}

#[tokio::test]
async fn unavailable_errors_are_retryable() {
    let err = StoreError::Unavailable {
        kind: StoreKind::Cache,
    };
    assert!(err.is_retryable());
    assert!(!StoreError::Permanent("schema".into()).is_retryable());
}
