//! In-memory TTL cache with prefix invalidation and single-flight `get_or_set` (§4.3).
//!
//! Backed by `dashmap` for the hot path (plain `get`/`set`/`delete`) and a small
//! `tokio::sync::Mutex`-guarded map of `Notify` handles to guarantee at-most-one
//! concurrent loader per key. A caller that loses the race to populate a key waits
//! on the winner's `Notify` and then re-reads the now-populated entry, rather than
//! invoking the loader itself.
//!
//! Cache errors are not modeled as a `Result` — per §7 "Cache errors are always
//! swallowed (fail open)", a poisoned or missing entry degrades to a miss, never to
//! a propagated error.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

#[derive(Clone)]
struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Shared key -> JSON value store with per-key TTL.
///
/// Values are stored as `serde_json::Value` rather than generic `T` so a single
/// `Cache` instance can back unrelated call sites (stats, list pages, rate-limit
/// counters) without type-erasure boilerplate at every call site; typed callers
/// serialize/deserialize at the edge.
pub struct Cache {
    entries: DashMap<String, Entry>,
    in_flight: Mutex<std::collections::HashMap<String, Arc<Notify>>>,
}

impl Cache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value, ttl: Duration) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Atomically increment a counter at `key`, resetting it to 1 and (re)arming
    /// `ttl` when the key is absent or its window has expired. Backs the §4.10
    /// per-IP rate limiter: one `DashMap` entry access per request, no separate
    /// counter store.
    pub fn increment(&self, key: &str, ttl: Duration) -> u64 {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: serde_json::json!(0u64),
            expires_at: now + ttl,
        });

        if entry.is_expired() {
            entry.value = serde_json::json!(0u64);
            entry.expires_at = now + ttl;
        }

        let count = entry.value.as_u64().unwrap_or(0) + 1;
        entry.value = serde_json::json!(count);
        count
    }

    /// Remove every key starting with `prefix`. Used by the Collector and Lifecycle
    /// Engine to invalidate `stats:*` / `blacklist:list:*` after a write (§4.3).
    pub fn delete_by_prefix(&self, prefix: &str) {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        for key in doomed {
            self.entries.remove(&key);
        }
        debug!(prefix, "invalidated cache entries by prefix");
    }

    /// Fetch `key`, or run `loader` to populate it, guaranteeing at most one
    /// concurrent execution of `loader` per key (§4.3 single-flight contract).
    ///
    /// Callers racing for the same key that lose the race do not run `loader`
    /// themselves; they wait on the winner's completion and then read the cache.
    pub async fn get_or_set<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<serde_json::Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<serde_json::Value, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let (notify, is_leader) = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let notify = Arc::new(Notify::new());
                    in_flight.insert(key.to_string(), notify.clone());
                    (notify, true)
                }
            }
        };

        if !is_leader {
            notify.notified().await;
            // The leader may have failed (no cache entry written); fall back to a
            // miss rather than blocking forever or silently re-running the loader.
            return Ok(self.get(key).unwrap_or(serde_json::Value::Null));
        }

        let result = loader().await;
        if let Ok(value) = &result {
            self.set(key, value.clone(), ttl);
        }

        {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.remove(key);
        }
        notify.notify_waiters();

        result
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn set_then_get_returns_value() {
        let cache = Cache::new();
        cache.set("k", serde_json::json!(42), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(serde_json::json!(42)));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = Cache::new();
        cache.set("k", serde_json::json!(1), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn delete_by_prefix_removes_matching_keys_only() {
        let cache = Cache::new();
        cache.set("blacklist:list:a", serde_json::json!(1), Duration::from_secs(60));
        cache.set("blacklist:list:b", serde_json::json!(2), Duration::from_secs(60));
        cache.set("stats:global", serde_json::json!(3), Duration::from_secs(60));

        cache.delete_by_prefix("blacklist:list:");

        assert_eq!(cache.get("blacklist:list:a"), None);
        assert_eq!(cache.get("blacklist:list:b"), None);
        assert!(cache.get("stats:global").is_some());
    }

    #[test]
    fn increment_counts_up_within_the_window() {
        let cache = Cache::new();
        assert_eq!(cache.increment("rate:1.2.3.4", Duration::from_secs(60)), 1);
        assert_eq!(cache.increment("rate:1.2.3.4", Duration::from_secs(60)), 2);
        assert_eq!(cache.increment("rate:1.2.3.4", Duration::from_secs(60)), 3);
    }

    #[test]
    fn increment_resets_after_the_window_expires() {
        let cache = Cache::new();
        cache.increment("rate:k", Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.increment("rate:k", Duration::from_secs(60)), 1);
    }

    #[tokio::test]
    async fn get_or_set_only_runs_loader_once_under_concurrency() {
        let cache = Arc::new(Cache::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_set::<_, _, ()>("shared", Duration::from_secs(60), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(serde_json::json!("loaded"))
                    })
                    .await
            }));
        }

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(value, serde_json::json!("loaded"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
