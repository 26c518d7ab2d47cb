//! Two-tier analysis cache.
//!
//! The hot tier is an in-process [`moka`] cache with a per-entry TTL. The
//! durable tier is any [`AnalysisStore`]. Both are keyed by [`cache_key`].
//! Failures in either tier are logged and never surface to the caller: a
//! broken tier degrades to a miss.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;

use crate::models::{AnalysisResult, StoreStats, cache_key};
use crate::traits::AnalysisStore;

/// Default hot-tier lifetime of an entry.
pub const DEFAULT_HOT_TTL: Duration = Duration::from_secs(86_400);

/// Configuration for the analysis cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub hot_ttl: Duration,
    pub hot_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_ttl: DEFAULT_HOT_TTL,
            hot_capacity: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn with_hot_ttl(mut self, ttl: Duration) -> Self {
        self.hot_ttl = ttl;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    hot_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
}

/// Snapshot of cache usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hot_entries: u64,
    pub hot_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
    /// `None` when the durable tier could not be queried.
    pub durable: Option<StoreStats>,
}

/// Cache of finished analyses keyed by thread URL.
#[derive(Clone)]
pub struct AnalysisCache<S: AnalysisStore> {
    hot: Cache<String, Arc<AnalysisResult>>,
    durable: S,
    counters: Arc<Counters>,
}

impl<S: AnalysisStore> AnalysisCache<S> {
    pub fn new(durable: S, config: CacheConfig) -> Self {
        let hot = Cache::builder()
            .max_capacity(config.hot_capacity)
            .time_to_live(config.hot_ttl)
            .build();
        Self {
            hot,
            durable,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn durable(&self) -> &S {
        &self.durable
    }

    /// Look up a cached analysis, hot tier first.
    ///
    /// A durable hit is written back into the hot tier and its access counter
    /// incremented; both steps are best-effort.
    pub async fn get(&self, url: &str) -> Option<AnalysisResult> {
        let key = cache_key(url);

        if let Some(hit) = self.hot.get(&key).await {
            self.counters.hot_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%key, "Hot cache hit");
            return Some(hit.as_ref().clone());
        }

        let stored = match self.durable.load(&key).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "Durable cache read failed");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let result = match serde_json::from_value::<AnalysisResult>(stored.analysis) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Discarding undecodable durable cache entry");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        self.counters.durable_hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%key, access_count = stored.access_count, "Durable cache hit");

        self.hot.insert(key.clone(), Arc::new(result.clone())).await;
        if let Err(e) = self.durable.record_access(&key).await {
            tracing::warn!(%key, error = %e, "Failed to record durable cache access");
        }

        Some(result)
    }

    /// Store an analysis in both tiers.
    pub async fn save(&self, url: &str, result: &AnalysisResult) {
        let key = cache_key(url);
        self.hot.insert(key.clone(), Arc::new(result.clone())).await;

        let payload = match serde_json::to_value(result) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Failed to serialize analysis for durable cache");
                return;
            }
        };

        match self.durable.upsert(&key, url.trim(), &payload).await {
            Ok(()) => tracing::debug!(%key, "Analysis cached"),
            Err(e) => tracing::warn!(%key, error = %e, "Durable cache write failed"),
        }
    }

    /// Remove an analysis from both tiers. Returns true if the durable tier
    /// held an entry.
    pub async fn invalidate(&self, url: &str) -> bool {
        let key = cache_key(url);
        self.hot.invalidate(&key).await;
        match self.durable.delete(&key).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Durable cache delete failed");
                false
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        self.hot.run_pending_tasks().await;
        let durable = match self.durable.stats().await {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, "Durable cache stats unavailable");
                None
            }
        };
        CacheStats {
            hot_entries: self.hot.entry_count(),
            hot_hits: self.counters.hot_hits.load(Ordering::Relaxed),
            durable_hits: self.counters.durable_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            durable,
        }
    }

    /// Release the durable tier. The hot tier is dropped with the cache.
    pub async fn close(&self) {
        self.durable.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::testutil::{MockAnalysisStore, make_test_result};
    use crate::traits::NullStore;

    const URL: &str = "https://www.reddit.com/r/rust/comments/abc123/hello";

    fn cache(store: MockAnalysisStore) -> AnalysisCache<MockAnalysisStore> {
        AnalysisCache::new(store, CacheConfig::default())
    }

    #[tokio::test]
    async fn save_then_get_returns_equal_result() {
        let cache = cache(MockAnalysisStore::new());
        let result = make_test_result("Hello");

        cache.save(URL, &result).await;
        assert_eq!(cache.get(URL).await, Some(result));
    }

    #[tokio::test]
    async fn lookup_ignores_case_whitespace_and_trailing_slash() {
        let cache = cache(MockAnalysisStore::new());
        let result = make_test_result("Hello");

        cache.save(URL, &result).await;
        let variant = format!("  {}/  ", URL.to_uppercase());
        assert_eq!(cache.get(&variant).await, Some(result));
    }

    #[tokio::test]
    async fn miss_on_empty_cache() {
        let cache = cache(MockAnalysisStore::new());
        assert!(cache.get(URL).await.is_none());
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn durable_hit_rehydrates_hot_tier() {
        let store = MockAnalysisStore::new();
        let cache = AnalysisCache::new(
            store.clone(),
            CacheConfig::default().with_hot_ttl(Duration::from_millis(30)),
        );
        let result = make_test_result("Hello");
        cache.save(URL, &result).await;

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.get(URL).await, Some(result.clone()));
        assert_eq!(store.access_count(&cache_key(URL)), Some(2));

        assert_eq!(cache.get(URL).await, Some(result));
        let stats = cache.stats().await;
        assert_eq!(stats.durable_hits, 1);
        assert_eq!(stats.hot_hits, 1);
    }

    #[tokio::test]
    async fn repeated_saves_increment_durable_counter() {
        let store = MockAnalysisStore::new();
        let cache = cache(store.clone());

        cache.save(URL, &make_test_result("one")).await;
        cache.save(URL, &make_test_result("two")).await;

        let key = cache_key(URL);
        assert_eq!(store.access_count(&key), Some(2));
        assert_eq!(cache.get(URL).await.unwrap().meta.title, "two");
    }

    #[tokio::test]
    async fn durable_write_failure_keeps_hot_entry() {
        let store = MockAnalysisStore::new();
        store.fail_with(AppError::DatabaseError("disk full".into()));
        let cache = cache(store.clone());
        let result = make_test_result("Hello");

        cache.save(URL, &result).await;

        assert_eq!(cache.get(URL).await, Some(result));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn durable_read_failure_is_a_miss() {
        let store = MockAnalysisStore::new();
        store.fail_with(AppError::DatabaseError("locked".into()));
        let cache = cache(store);

        assert!(cache.get(URL).await.is_none());
        assert!(cache.stats().await.durable.is_none());
    }

    #[tokio::test]
    async fn undecodable_durable_entry_is_a_miss() {
        let store = MockAnalysisStore::new();
        store.insert_raw(&cache_key(URL), URL, serde_json::json!({"not": "an analysis"}));
        let cache = cache(store);

        assert!(cache.get(URL).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_clears_both_tiers() {
        let store = MockAnalysisStore::new();
        let cache = cache(store.clone());
        cache.save(URL, &make_test_result("Hello")).await;

        assert!(cache.invalidate(URL).await);
        assert!(cache.get(URL).await.is_none());
        assert_eq!(store.len(), 0);
        assert!(!cache.invalidate(URL).await);
    }

    #[tokio::test]
    async fn stats_report_both_tiers() {
        let cache = cache(MockAnalysisStore::new());
        cache.save(URL, &make_test_result("Hello")).await;
        cache.get(URL).await;

        let stats = cache.stats().await;
        assert_eq!(stats.hot_entries, 1);
        assert_eq!(stats.hot_hits, 1);
        assert_eq!(
            stats.durable,
            Some(StoreStats {
                entries: 1,
                total_accesses: 1
            })
        );
    }

    #[tokio::test]
    async fn works_without_durable_tier() {
        let cache = AnalysisCache::new(NullStore, CacheConfig::default());
        let result = make_test_result("Hello");
        cache.save(URL, &result).await;
        assert_eq!(cache.get(URL).await, Some(result));
        assert!(!cache.invalidate(URL).await);
        assert!(cache.get(URL).await.is_none());
    }

    #[tokio::test]
    async fn close_releases_durable_tier() {
        let store = MockAnalysisStore::new();
        let cache = cache(store.clone());
        cache.close().await;
        assert!(store.is_closed());
    }
}
