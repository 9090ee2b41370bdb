//! In-process cache backend built on `moka`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use super::{CacheError, CacheStore};

/// A cached payload together with the TTL it was written with.
#[derive(Clone)]
struct Entry {
    payload: Arc<str>,
    ttl: Duration,
}

/// Expires each entry after the TTL it was last written with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// [`CacheStore`] backed by a bounded `moka` cache.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct MokaCacheStore {
    cache: Cache<String, Entry>,
}

impl MokaCacheStore {
    /// Create a cache holding at most `max_capacity` entries.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache }
    }

    /// Number of live entries (approximate; pending maintenance is not run).
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl std::fmt::Debug for MokaCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCacheStore")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[async_trait]
impl CacheStore for MokaCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.cache.get(key).await.map(|entry| entry.payload.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.cache
            .insert(
                key.to_owned(),
                Entry {
                    payload: Arc::from(value),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}
