use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use crate::context::deadline_after;
use std::time::Duration;
use tokio::time::Instant;

/// A value with its expiry instant
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// String-keyed TTL cache. Every entry lives for the same fixed `ttl`;
/// there is no size bound. Expired entries are dropped lazily on `get`
/// or in bulk by `purge_expired`.
#[derive(Debug)]
pub struct ExpiringCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a clone of the live value for `key`. An expired entry is
    /// removed before returning `None`.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        self.remove_if_expired(key, now);
        None
    }

    /// Re-check under the write lock: a concurrent `set` may have refreshed
    /// the entry after the read lock saw it expired, and a concurrent `get`
    /// may already have removed it. Returns whether an entry was dropped.
    fn remove_if_expired(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
            true
        } else {
            false
        }
    }

    /// Insert or overwrite `key`, resetting its expiry to `now + ttl`. A TTL
    /// too large to represent keeps the entry for the far future.
    pub fn set(&self, key: &str, value: V) {
        let entry = CacheEntry {
            value,
            expires_at: deadline_after(Instant::now(), self.ttl),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
    }

    /// Drop `key` regardless of expiry. Returns whether an entry was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until they are purged.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn hit_before_ttl_miss_at_ttl() {
        let cache = ExpiringCache::new(TTL);
        cache.set("abc123", 42u32);

        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert_eq!(cache.get("abc123"), Some(42));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("abc123"), None);

        // The expired entry was removed by the read
        assert!(cache.is_empty());
        assert_eq!(cache.get("abc123"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn set_overwrites_and_resets_expiry() {
        let cache = ExpiringCache::new(TTL);
        cache.set("k", "first".to_string());

        tokio::time::advance(Duration::from_secs(50)).await;
        cache.set("k", "second".to_string());

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(cache.get("k").as_deref(), Some("second"));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test]
    async fn absent_key_is_a_miss() {
        let cache: ExpiringCache<u8> = ExpiringCache::new(TTL);
        assert_eq!(cache.get("nope"), None);
        assert!(!cache.invalidate("nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_entries() {
        let cache = ExpiringCache::new(TTL);
        cache.set("old", 1);
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.set("new", 2);
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.get("new"), Some(2));
        assert_eq!(cache.get("old"), None);
    }

    #[tokio::test]
    async fn invalidate_removes_live_entry() {
        let cache = ExpiringCache::new(TTL);
        cache.set("k", 1);
        assert!(cache.invalidate("k"));
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_and_writers() {
        let cache = Arc::new(ExpiringCache::new(TTL));
        let mut handles = Vec::new();

        for worker in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..200 {
                    let key = format!("key-{}", i % 16);
                    if (i + worker) % 3 == 0 {
                        cache.set(&key, i);
                    } else if let Some(v) = cache.get(&key) {
                        assert!(v < 200);
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(cache.len() <= 16);
    }

    #[tokio::test(start_paused = true)]
    async fn lazy_delete_keeps_an_entry_refreshed_after_the_read() {
        let cache = ExpiringCache::new(TTL);
        cache.set("k", 1);
        tokio::time::advance(TTL).await;

        // A reader saw the entry expired at `seen`, then a writer refreshed
        // it before the reader took the write lock.
        let seen = Instant::now();
        cache.set("k", 2);

        assert!(!cache.remove_if_expired("k", seen));
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn lazy_delete_drops_an_entry_still_expired_under_the_write_lock() {
        let cache = ExpiringCache::new(TTL);
        cache.set("k", 1);
        tokio::time::advance(TTL).await;

        assert!(cache.remove_if_expired("k", Instant::now()));
        assert!(!cache.remove_if_expired("k", Instant::now()));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_ttl_keeps_entries_instead_of_panicking() {
        let cache = ExpiringCache::new(Duration::from_secs(u64::MAX));
        cache.set("abc123", 1);

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert_eq!(cache.get("abc123"), Some(1));
        assert_eq!(cache.purge_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_never_serves() {
        let cache = ExpiringCache::new(Duration::ZERO);
        cache.set("k", 1);
        assert_eq!(cache.get("k"), None);
    }
}
