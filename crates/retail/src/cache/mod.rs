//! Cache-aside layer.
//!
//! [`CacheStore`] is the raw backend: string keys, opaque string payloads,
//! a TTL per entry. [`CacheAside`] sits on top, serializes values as JSON and
//! swallows every backend failure: a broken cache degrades to a miss on read
//! and a no-op on write, and never fails the surrounding operation.
//!
//! Callers own invalidation and must await it after their write commits.

pub mod keys;
mod moka_store;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

pub use moka_store::MokaCacheStore;

/// Errors raised by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A value could not be encoded or decoded.
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend itself failed (connection loss, eviction error, ...).
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// A key-value store with per-entry expiration.
///
/// `get` of an absent or expired key is `Ok(None)`; `invalidate` of an
/// absent key is `Ok(())`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the payload stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Remove `key`.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;
}

/// Typed, failure-tolerant access to a [`CacheStore`].
#[derive(Clone)]
pub struct CacheAside {
    store: Arc<dyn CacheStore>,
}

impl CacheAside {
    /// Wrap a backend.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Read and decode a cached value. Any failure is a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "Cached value could not be decoded, treating as miss");
                None
            }
        }
    }

    /// Encode and store a value. Failures are logged and dropped.
    pub async fn set<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %CacheError::from(e), "Skipping cache write");
                return;
            }
        };

        if let Err(e) = self.store.set(key, raw, ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    /// Remove one key. Failures are logged and dropped.
    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.invalidate(key).await {
            warn!(key, error = %e, "Cache invalidation failed");
        }
    }

    /// Remove several keys, in order.
    pub async fn invalidate_all<K: AsRef<str>>(&self, keys: &[K]) {
        for key in keys {
            self.invalidate(key.as_ref()).await;
        }
    }

    /// Read-through: serve `key` from cache, or load it and cache the result.
    ///
    /// # Errors
    ///
    /// Returns whatever `load` returns; cache failures never surface.
    pub async fn read_through<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        load: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(cached);
        }

        let value = load().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    /// Like [`read_through`](Self::read_through) for lookups that may find
    /// nothing. Absent results are not cached.
    ///
    /// # Errors
    ///
    /// Returns whatever `load` returns; cache failures never surface.
    pub async fn read_through_optional<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        load: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>, E>> + Send,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(Some(cached));
        }

        let value = load().await?;
        if let Some(found) = &value {
            self.set(key, found, ttl).await;
        }
        Ok(value)
    }
}

impl std::fmt::Debug for CacheAside {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAside").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// A backend where every call fails.
    pub(crate) struct BrokenCache;

    #[async_trait]
    impl CacheStore for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Backend("connection refused".to_owned()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_owned()))
        }

        async fn invalidate(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_owned()))
        }
    }

    fn moka() -> CacheAside {
        CacheAside::new(Arc::new(MokaCacheStore::new(100)))
    }

    #[tokio::test]
    async fn test_read_through_loads_once() {
        let cache = moka();
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<Vec<i32>, std::convert::Infallible> = cache
                .read_through("numbers", Duration::from_secs(60), || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await;
            assert_eq!(value.unwrap(), vec![1, 2, 3]);
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_through_optional_does_not_cache_absent() {
        let cache = moka();
        let loads = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Result<Option<String>, std::convert::Infallible> = cache
                .read_through_optional("ghost", Duration::from_secs(60), || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                })
                .await;
            assert!(value.unwrap().is_none());
        }

        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_load_error_is_not_cached() {
        let cache = moka();

        let first: Result<i32, &str> = cache
            .read_through("flaky", Duration::from_secs(60), || async { Err("down") })
            .await;
        assert_eq!(first, Err("down"));

        let second: Result<i32, &str> = cache
            .read_through("flaky", Duration::from_secs(60), || async { Ok(7) })
            .await;
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn test_invalidate_absent_key_is_noop() {
        let cache = moka();
        cache.invalidate("never-set").await;
        cache.invalidate("never-set").await;
        assert!(cache.get::<i32>("never-set").await.is_none());
    }

    #[tokio::test]
    async fn test_broken_backend_degrades_to_miss() {
        let cache = CacheAside::new(Arc::new(BrokenCache));

        cache.set("k", &1, Duration::from_secs(60)).await;
        cache.invalidate("k").await;
        assert!(cache.get::<i32>("k").await.is_none());

        let value: Result<i32, std::convert::Infallible> = cache
            .read_through("k", Duration::from_secs(60), || async { Ok(5) })
            .await;
        assert_eq!(value.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_undecodable_value_is_a_miss() {
        let store = Arc::new(MokaCacheStore::new(100));
        store
            .set("k", "not json".to_owned(), Duration::from_secs(60))
            .await
            .unwrap();

        let cache = CacheAside::new(store);
        assert!(cache.get::<Vec<i32>>("k").await.is_none());
    }
}
