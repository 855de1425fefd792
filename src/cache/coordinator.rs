//! Cache coordination: lookup on the request path, background store on miss.

use std::sync::Arc;

use crate::cache::key::CacheKey;
use crate::cache::store::{CacheStore, CachedEntry};
use crate::lifecycle::background::BackgroundTasks;
use crate::observability::metrics;

/// Front door to the cache store for the request pipeline.
///
/// Store failures never reach the request: a failed lookup is a miss and a
/// failed write is logged and dropped.
#[derive(Clone)]
pub struct CacheCoordinator {
    store: Arc<dyn CacheStore>,
    tasks: BackgroundTasks,
    enabled: bool,
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn CacheStore>, tasks: BackgroundTasks, enabled: bool) -> Self {
        Self {
            store,
            tasks,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn lookup(&self, key: &CacheKey) -> Option<CachedEntry> {
        if !self.enabled {
            return None;
        }
        match self.store.lookup(key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Schedule a write and return immediately.
    pub fn store(&self, key: CacheKey, entry: CachedEntry) {
        if !self.enabled {
            return;
        }
        let store = self.store.clone();
        self.tasks.spawn("cache_store", async move {
            match store.put(key.clone(), entry).await {
                Ok(()) => {
                    tracing::debug!(key = %key, "Cached response");
                    metrics::record_cache_store("ok");
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Background cache write failed");
                    metrics::record_cache_store("error");
                }
            }
        });
    }
}
