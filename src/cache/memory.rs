//! Key/value cache with optional per-entry expiry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use crate::error::ApiResult;
use crate::observability::metrics;

/// Cache tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// TTL applied by callers that ask for "the default" expiry.
    pub default_ttl: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(60),
        }
    }
}

struct CacheEntry<V> {
    value: V,
    expiry: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expiry: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expiry, Some(expiry) if expiry < now)
    }
}

type InFlight<V> = Shared<BoxFuture<'static, ApiResult<V>>>;

/// A thread-safe cache. Clones share the same underlying maps.
pub struct MemoryCache<V> {
    entries: Arc<DashMap<String, CacheEntry<V>>>,
    in_flight: Arc<DashMap<String, InFlight<V>>>,
    options: CacheOptions,
}

impl<V> Clone for MemoryCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            in_flight: self.in_flight.clone(),
            options: self.options,
        }
    }
}

impl<V> Default for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

impl<V> MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache.
    pub fn new(options: CacheOptions) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            options,
        }
    }

    pub fn options(&self) -> CacheOptions {
        self.options
    }

    /// Store `value`, replacing any previous entry. `None` means no expiry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        self.entries.insert(key.into(), CacheEntry::new(value, ttl));
    }

    /// Fetch a live entry. An expired entry is removed as a side effect.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
        };

        if expired {
            // Re-checked under the write lock: a concurrent `set` may have
            // replaced the entry since we looked.
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        None
    }

    /// Remove an entry. Returns whether one was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of resident entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the cached value or compute, store and return a fresh one.
    ///
    /// `compute` runs at most once per call. Concurrent misses on the same
    /// key are not coordinated; each may compute and overwrite. Failed
    /// computations are not stored.
    pub async fn get_or_set<F, Fut, E>(
        &self,
        key: &str,
        compute: F,
        ttl: Option<Duration>,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            metrics::record_cache_lookup(true);
            return Ok(value);
        }
        metrics::record_cache_lookup(false);

        let value = compute().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    /// Like [`get_or_set`](Self::get_or_set), but concurrent misses on the
    /// same key await a single shared computation.
    pub async fn get_or_set_shared<F, Fut>(
        &self,
        key: &str,
        compute: F,
        ttl: Option<Duration>,
    ) -> ApiResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<V>> + Send + 'static,
    {
        if let Some(value) = self.get(key) {
            metrics::record_cache_lookup(true);
            return Ok(value);
        }

        let computation = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(running) => {
                tracing::trace!(key, "Joining in-flight cache computation");
                metrics::record_cache_lookup(true);
                running.get().clone()
            }
            Entry::Vacant(slot) => {
                metrics::record_cache_lookup(false);
                let entries = self.entries.clone();
                let in_flight = self.in_flight.clone();
                let owned_key = key.to_string();
                let pending = compute();

                let computation = async move {
                    let result = pending.await;
                    if let Ok(value) = &result {
                        entries.insert(owned_key.clone(), CacheEntry::new(value.clone(), ttl));
                    }
                    in_flight.remove(&owned_key);
                    result
                }
                .boxed()
                .shared();

                slot.insert(computation.clone());
                computation
            }
        };

        computation.await
    }
}
