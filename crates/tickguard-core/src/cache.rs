//! In-memory caching for API responses.
//!
//! Entries expire lazily: an expired entry is only removed when a read (or
//! [`ResponseCache::size`]) runs into it. There is no background sweep.
//! Time is read from `tokio::time::Instant`, so a paused tokio clock drives
//! expiry in tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// How a cached call interacts with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Read from the cache if a non-expired entry is present;
    /// otherwise, fetch from the network and write the response to the cache.
    #[default]
    Use,
    /// Always fetch from the network, bypassing any cached entry,
    /// and write the new response to the cache.
    Refresh,
    /// Always fetch from the network and do not read from or write to the cache.
    Bypass,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    payload: V,
    created_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_valid(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
struct CacheInner<V> {
    map: HashMap<String, CacheEntry<V>>,
}

impl<V: Clone> CacheInner<V> {
    fn get(&mut self, key: &str, now: Instant) -> Option<V> {
        let valid = self.map.get(key).map(|entry| entry.is_valid(now))?;
        if valid {
            return self.map.get(key).map(|entry| entry.payload.clone());
        }

        self.map.remove(key);
        trace!(key, "evicted expired cache entry");
        None
    }

    fn put(&mut self, key: String, payload: V, ttl: Duration, now: Instant) {
        // expires_at must stay strictly after created_at
        let ttl = ttl.max(Duration::from_millis(1));
        self.map.insert(
            key,
            CacheEntry {
                payload,
                created_at: now,
                expires_at: now + ttl,
            },
        );
    }

    fn evict_expired(&mut self, now: Instant) {
        self.map.retain(|_, entry| entry.is_valid(now));
    }
}

/// Shared response cache with per-entry expiry.
///
/// Cloning yields another handle onto the same table.
#[derive(Debug, Clone)]
pub struct ResponseCache<V = serde_json::Value> {
    inner: Arc<Mutex<CacheInner<V>>>,
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ResponseCache<V> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                map: HashMap::new(),
            })),
        }
    }

    /// Returns the payload for `key` if present and not expired.
    ///
    /// An expired entry is treated as absent and evicted.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.lock().get(key, Instant::now())
    }

    /// Stores `value` under `key` for `ttl_seconds`, replacing any prior entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl_seconds: u64) {
        self.set_for(key, value, Duration::from_secs(ttl_seconds));
    }

    pub fn set_for(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.inner
            .lock()
            .put(key.into(), value, ttl, Instant::now());
    }

    /// Removes `key`. Returns whether an entry (expired or not) was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.lock().map.remove(key).is_some()
    }

    /// Removes every key starting with `prefix`; returns how many were removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.map.len();
        inner.map.retain(|key, _| !key.starts_with(prefix));
        before - inner.map.len()
    }

    pub fn clear(&self) {
        self.inner.lock().map.clear();
    }

    /// Number of non-expired entries.
    ///
    /// Counting evicts every expired entry as a side effect.
    pub fn size(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.evict_expired(Instant::now());
        inner.map.len()
    }

    /// Age of the entry under `key`, if it is still valid.
    pub fn age(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .map
            .get(key)
            .filter(|entry| entry.is_valid(now))
            .map(|entry| now.duration_since(entry.created_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn set_then_get_returns_value_unchanged() {
        let cache = ResponseCache::new();
        let payload = json!({"symbol": "AAPL", "signals": [{"type": "BUY", "confidence": 0.82}]});

        cache.set("signals:AAPL", payload.clone(), 60);

        assert_eq!(cache.get("signals:AAPL"), Some(payload));
    }

    #[tokio::test(start_paused = true)]
    async fn get_is_idempotent_before_expiry() {
        let cache: ResponseCache<String> = ResponseCache::new();
        cache.set("k", String::from("v"), 10);

        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_absent_and_evicted_once() {
        let cache: ResponseCache<u32> = ResponseCache::new();
        cache.set("stale", 1, 1);
        cache.set("fresh", 2, 60);
        assert_eq!(cache.size(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.get("stale"), None);
        assert_eq!(cache.get("stale"), None);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get("fresh"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_invalid_exactly_at_expiry() {
        let cache: ResponseCache<u32> = ResponseCache::new();
        cache.set("k", 7, 5);

        tokio::time::advance(Duration::from_millis(4_999)).await;
        assert_eq!(cache.get("k"), Some(7));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_replaces_value_and_expiry() {
        let cache: ResponseCache<&'static str> = ResponseCache::new();
        cache.set("k", "old", 1);
        cache.set("k", "new", 30);

        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.get("k"), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_entries_expire_on_next_tick() {
        let cache: ResponseCache<u8> = ResponseCache::new();
        cache.set("k", 1, 0);
        assert_eq!(cache.get("k"), Some(1));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_removes_keys() {
        let cache: ResponseCache<u8> = ResponseCache::new();
        cache.set("signals:AAPL", 1, 60);
        cache.set("signals:MSFT", 2, 60);
        cache.set("portfolio", 3, 60);

        assert!(cache.invalidate("portfolio"));
        assert!(!cache.invalidate("portfolio"));
        assert_eq!(cache.invalidate_prefix("signals:"), 2);
        assert_eq!(cache.size(), 0);

        cache.set("a", 1, 60);
        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn age_tracks_creation_time() {
        let cache: ResponseCache<u8> = ResponseCache::new();
        cache.set("k", 1, 60);
        tokio::time::advance(Duration::from_secs(3)).await;

        assert_eq!(cache.age("k"), Some(Duration::from_secs(3)));
        assert_eq!(cache.age("missing"), None);
    }

    #[test]
    fn cache_mode_defaults_to_use() {
        assert_eq!(CacheMode::default(), CacheMode::Use);
    }
}
