use crate::models::ApodResult;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::sync::Arc;
use std::time::Duration;

/// Short-lived metadata cache keyed by canonical date or the "today" sentinel.
///
/// Entries are never updated in place: a key is written once per miss and
/// then only read until its TTL runs out. With no refreshes to reorder
/// things, least-recently-used is close to oldest-first: the victim is an
/// archive date somebody looked at once and left. The "today" key is read
/// on almost every request, so it stays resident.
///
/// Failed lookups are not stored here, so an upstream outage is retried on
/// the next request instead of being pinned for a full TTL.
#[derive(Clone)]
pub struct ApodCache {
    cache: Arc<Cache<String, ApodResult>>,
}

impl ApodCache {
    /// `ttl` is measured from insertion, not from the last read.
    pub fn new(max_capacity: usize, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity as u64)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self {
            cache: Arc::new(cache),
        }
    }

    pub async fn get(&self, key: &str) -> Option<ApodResult> {
        self.cache.get(key).await
    }

    /// Replaces whatever was stored under `key`.
    pub async fn insert(&self, key: String, value: ApodResult) {
        self.cache.insert(key, value).await;
    }

    #[cfg(test)]
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}
