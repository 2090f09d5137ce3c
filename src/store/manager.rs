// ABOUTME: Store lifecycle manager: connect with reopen-on-failure, periodic health
// ABOUTME: checks with backoff, degraded fail-fast handles, and a once-only shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;

use crate::backoff::{Backoff, BackoffConfig};
use crate::config::StoreConfig;
use crate::metrics;

use super::{CacheStore, DocumentStore, SqliteCacheStore, SqliteDocumentStore, StoreError, StoreKind};

/// Owns both store connections and their health state. Handlers only ever see
/// this through `document()` / `cache()`, which fail fast while degraded.
pub struct StoreManager {
    document: RwLock<Option<Arc<dyn DocumentStore>>>,
    cache: RwLock<Option<Arc<dyn CacheStore>>>,
    /// Paths retained so a failed open can be retried by the health loop
    document_path: Option<String>,
    cache_path: Option<String>,
    document_healthy: AtomicBool,
    cache_healthy: AtomicBool,
    closed: AtomicBool,
    health_interval: Duration,
    backoff: BackoffConfig,
}

impl StoreManager {
    /// Open both stores from config. Each store is independently optional: a
    /// failed open is reported and leaves that store degraded, and its health
    /// loop keeps retrying the open until it succeeds.
    pub fn connect(config: &StoreConfig, backoff: BackoffConfig) -> Arc<Self> {
        let document: Option<Arc<dyn DocumentStore>> =
            match SqliteDocumentStore::open(&config.document_path) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    tracing::error!(error = %e, path = %config.document_path, "document store unavailable");
                    None
                }
            };
        let cache: Option<Arc<dyn CacheStore>> = match SqliteCacheStore::open(&config.cache_path) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::error!(error = %e, path = %config.cache_path, "cache store unavailable");
                None
            }
        };
        Self::assemble(
            document,
            cache,
            Some(config.document_path.clone()),
            Some(config.cache_path.clone()),
            Duration::from_secs(config.health_check_secs),
            backoff,
        )
    }

    /// Assemble a manager from pre-built stores. Used by tests and embedders
    /// that bring their own store implementations; absent stores stay absent.
    pub fn with_stores(
        document: Option<Arc<dyn DocumentStore>>,
        cache: Option<Arc<dyn CacheStore>>,
        health_interval: Duration,
        backoff: BackoffConfig,
    ) -> Arc<Self> {
        Self::assemble(document, cache, None, None, health_interval, backoff)
    }

    fn assemble(
        document: Option<Arc<dyn DocumentStore>>,
        cache: Option<Arc<dyn CacheStore>>,
        document_path: Option<String>,
        cache_path: Option<String>,
        health_interval: Duration,
        backoff: BackoffConfig,
    ) -> Arc<Self> {
        let document_healthy = document.is_some();
        let cache_healthy = cache.is_some();
        Arc::new(Self {
            document: RwLock::new(document),
            cache: RwLock::new(cache),
            document_path,
            cache_path,
            document_healthy: AtomicBool::new(document_healthy),
            cache_healthy: AtomicBool::new(cache_healthy),
            closed: AtomicBool::new(false),
            health_interval,
            backoff,
        })
    }

    fn document_slot(&self) -> Option<Arc<dyn DocumentStore>> {
        self.document
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn cache_slot(&self) -> Option<Arc<dyn CacheStore>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Current document store handle, or Unavailable while degraded.
    pub fn document(&self) -> Result<Arc<dyn DocumentStore>, StoreError> {
        match self.document_slot() {
            Some(store) if self.document_healthy.load(Ordering::Acquire) => Ok(store),
            _ => Err(StoreError::Unavailable {
                kind: StoreKind::Document,
            }),
        }
    }

    /// Current cache store handle, or Unavailable while degraded.
    pub fn cache(&self) -> Result<Arc<dyn CacheStore>, StoreError> {
        match self.cache_slot() {
            Some(store) if self.cache_healthy.load(Ordering::Acquire) => Ok(store),
            _ => Err(StoreError::Unavailable {
                kind: StoreKind::Cache,
            }),
        }
    }

    pub fn is_healthy(&self, kind: StoreKind) -> bool {
        match kind {
            StoreKind::Document => self.document_healthy.load(Ordering::Acquire),
            StoreKind::Cache => self.cache_healthy.load(Ordering::Acquire),
        }
    }

    /// Check one store: ping it if open, otherwise retry the open from the
    /// retained path. None means there is nothing to manage for this kind.
    async fn check_one(&self, kind: StoreKind) -> Option<bool> {
        match kind {
            StoreKind::Document => {
                if let Some(store) = self.document_slot() {
                    return Some(store.ping().await.is_ok());
                }
                let path = self.document_path.as_deref()?;
                match SqliteDocumentStore::open(path) {
                    Ok(store) => {
                        *self.document.write().unwrap_or_else(|e| e.into_inner()) =
                            Some(Arc::new(store));
                        Some(true)
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, path, "document store reopen failed");
                        Some(false)
                    }
                }
            }
            StoreKind::Cache => {
                if let Some(store) = self.cache_slot() {
                    return Some(store.ping().await.is_ok());
                }
                let path = self.cache_path.as_deref()?;
                match SqliteCacheStore::open(path) {
                    Ok(store) => {
                        *self.cache.write().unwrap_or_else(|e| e.into_inner()) =
                            Some(Arc::new(store));
                        Some(true)
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, path, "cache store reopen failed");
                        Some(false)
                    }
                }
            }
        }
    }

    /// Run one health check round against both stores, updating degraded
    /// state and reopening stores whose initial connect failed.
    pub async fn check_now(&self) {
        if let Some(ok) = self.check_one(StoreKind::Document).await {
            self.mark(StoreKind::Document, ok);
        }
        if let Some(ok) = self.check_one(StoreKind::Cache).await {
            self.mark(StoreKind::Cache, ok);
        }
    }

    fn mark(&self, kind: StoreKind, healthy: bool) {
        let flag = match kind {
            StoreKind::Document => &self.document_healthy,
            StoreKind::Cache => &self.cache_healthy,
        };
        let was = flag.swap(healthy, Ordering::AcqRel);
        if was && !healthy {
            tracing::warn!(store = %kind, "store degraded, retrying with backoff");
            metrics::record_store_degraded(match kind {
                StoreKind::Document => "document",
                StoreKind::Cache => "cache",
            });
        } else if !was && healthy {
            tracing::info!(store = %kind, "store recovered");
        }
    }

    /// Spawn the periodic health loops, one per managed store. While a store
    /// is healthy it is pinged on the configured interval; once degraded (or
    /// never opened) the retry cadence follows the shared backoff policy
    /// until it comes up.
    pub fn spawn_health_loops(self: &Arc<Self>, shutdown: watch::Receiver<bool>) {
        if self.document_slot().is_some() || self.document_path.is_some() {
            tokio::spawn(Self::health_loop(
                Arc::clone(self),
                StoreKind::Document,
                shutdown.clone(),
            ));
        }
        if self.cache_slot().is_some() || self.cache_path.is_some() {
            tokio::spawn(Self::health_loop(
                Arc::clone(self),
                StoreKind::Cache,
                shutdown,
            ));
        }
    }

    async fn health_loop(manager: Arc<Self>, kind: StoreKind, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(manager.backoff.clone());
        let mut delay = manager.health_interval;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                    continue;
                }
            }

            let Some(ok) = manager.check_one(kind).await else {
                return;
            };
            manager.mark(kind, ok);

            delay = if ok {
                backoff.reset();
                manager.health_interval
            } else {
                backoff.next_delay()
            };
        }
    }

    /// Ordered close of both stores. Safe to call from multiple exit paths;
    /// only the first call does anything.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(store) = self.document_slot() {
            if let Err(e) = store.close().await {
                tracing::error!(error = %e, "document store close failed");
            }
        }
        if let Some(store) = self.cache_slot() {
            if let Err(e) = store.close().await {
                tracing::error!(error = %e, "cache store close failed");
            }
        }
        tracing::info!("stores shut down");
    }
}
