//! In-process caches guarded by `tokio::sync::RwLock`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// A map whose entries expire `ttl` after insertion.
///
/// Writes replace entries wholesale; expired entries are swept on insert.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<K, (V, Instant)>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(_, inserted)| inserted.elapsed() < self.ttl)
            .map(|(value, _)| value.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, (_, inserted)| inserted.elapsed() < ttl);
        entries.insert(key, (value, Instant::now()));
    }

    pub async fn remove(&self, key: &K) {
        self.entries.write().await.remove(key);
    }
}

/// Enforces a minimum interval between accepted calls per key.
#[derive(Clone)]
pub struct IntervalLimiter {
    interval: Duration,
    last_seen: Arc<RwLock<HashMap<String, Instant>>>,
}

impl IntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_seen: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns false when `key` was accepted less than `interval` ago.
    /// Rejected calls do not reset the clock.
    pub async fn check(&self, key: &str) -> bool {
        let mut last_seen = self.last_seen.write().await;
        let now = Instant::now();

        if let Some(previous) = last_seen.get(key) {
            if now.duration_since(*previous) < self.interval {
                return false;
            }
        }

        let interval = self.interval;
        last_seen.retain(|_, seen| now.duration_since(*seen) < interval);
        last_seen.insert(key.to_string(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ttl_cache_expires() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.insert("taken_name".to_string(), false).await;
        assert_eq!(cache.get(&"taken_name".to_string()).await, Some(false));

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.get(&"taken_name".to_string()).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_limiter() {
        let limiter = IntervalLimiter::new(Duration::from_secs(1));
        assert!(limiter.check("203.0.113.1").await);
        assert!(!limiter.check("203.0.113.1").await);
        assert!(limiter.check("203.0.113.2").await);

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(limiter.check("203.0.113.1").await);
    }
}
