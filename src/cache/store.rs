//! Cache store abstraction and the in-memory implementation.
//!
//! # Responsibilities
//! - Define the `lookup`/`put` boundary to the edge cache
//! - Hold responses until the lifetime written in their own headers passes
//! - Bound the number of entries
//!
//! # Design Decisions
//! - Entries are immutable once stored; a put replaces the whole entry
//! - Expiry is lazy: stale entries are dropped when looked up or when space is needed
//! - A full store rejects the write instead of evicting fresh entries

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;

use crate::cache::key::CacheKey;
use crate::observability::metrics;

/// `CDN-Cache-Control`, the edge-only lifetime.
pub static CDN_CACHE_CONTROL: HeaderName = HeaderName::from_static("cdn-cache-control");

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store is full ({0} entries)")]
    Full(usize),

    #[error("response carries no cache lifetime")]
    NotCacheable,
}

/// A stored HTTP response.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub stored_at: SystemTime,
}

impl CachedEntry {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            stored_at: SystemTime::now(),
        }
    }

    /// Edge lifetime: `CDN-Cache-Control` max-age, then `s-maxage`, then `max-age`.
    pub fn ttl(&self) -> Option<Duration> {
        let cdn = self
            .headers
            .get(&CDN_CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| directive_seconds(v, "max-age"));
        let cache_control = self
            .headers
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok());
        let shared = cache_control.and_then(|v| directive_seconds(v, "s-maxage"));
        let browser = cache_control.and_then(|v| directive_seconds(v, "max-age"));

        cdn.or(shared).or(browser).map(Duration::from_secs)
    }

    /// Seconds since the entry was stored.
    pub fn age(&self, now: SystemTime) -> u64 {
        now.duration_since(self.stored_at).unwrap_or_default().as_secs()
    }

    pub fn is_fresh(&self, now: SystemTime) -> bool {
        match self.ttl() {
            Some(ttl) => now.duration_since(self.stored_at).unwrap_or_default() < ttl,
            None => false,
        }
    }
}

/// Numeric value of `name=N` in a Cache-Control style header.
pub fn directive_seconds(value: &str, name: &str) -> Option<u64> {
    value.split(',').find_map(|directive| {
        let (key, seconds) = directive.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case(name) {
            seconds.trim().trim_matches('"').parse().ok()
        } else {
            None
        }
    })
}

/// Key-value store of HTTP responses.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a fresh entry, if any.
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CachedEntry>, StoreError>;

    /// Store (or replace) an entry.
    async fn put(&self, key: CacheKey, entry: CachedEntry) -> Result<(), StoreError>;
}

/// In-process store backed by a concurrent map.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<DashMap<CacheKey, CachedEntry>>,
    max_entries: usize,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self, now: SystemTime) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, entry| entry.is_fresh(now));
        before - self.inner.len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CachedEntry>, StoreError> {
        let now = SystemTime::now();
        let entry = self.inner.get(key).map(|r| r.value().clone());

        match entry {
            Some(entry) if entry.is_fresh(now) => Ok(Some(entry)),
            Some(_) => {
                self.inner.remove(key);
                metrics::record_cache_entries(self.inner.len());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: CacheKey, entry: CachedEntry) -> Result<(), StoreError> {
        if entry.ttl().is_none() {
            return Err(StoreError::NotCacheable);
        }

        if !self.inner.contains_key(&key) && self.inner.len() >= self.max_entries {
            let swept = self.sweep(SystemTime::now());
            tracing::debug!(swept, "Swept expired cache entries");
            if self.inner.len() >= self.max_entries {
                return Err(StoreError::Full(self.max_entries));
            }
        }

        self.inner.insert(key, entry);
        metrics::record_cache_entries(self.inner.len());
        Ok(())
    }
}
