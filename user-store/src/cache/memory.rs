//! In-process cache

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::Cache;
use crate::error::{Error, Result};

/// Writes between sweeps of expired entries
const SWEEP_EVERY: u64 = 256;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// [`Cache`] backed by a concurrent hash map
///
/// Expired entries are dropped on access and swept every few hundred
/// writes, so keys that are never read again do not accumulate. Clones share
/// entries.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use user_store::cache::{Cache, MemoryCache};
///
/// # async fn example() -> user_store::error::Result<()> {
/// let cache = MemoryCache::new();
/// cache.set("otp:jane@example.com", "123456", Duration::from_secs(600)).await?;
/// assert_eq!(
///     cache.get("otp:jane@example.com").await?.as_deref(),
///     Some("123456")
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Entry>>,
    writes: Arc<AtomicU64>,
}

impl MemoryCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    /// Whether no live entries remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    // Must not run while a shard guard is held.
    fn record_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY == 0 {
            self.purge_expired();
        }
    }
}

impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        // remove_if releases the shard lock before we read again
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        Ok(self.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.record_write();
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<u64> {
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| self.entries.remove(*key))
            .filter(|(_, entry)| entry.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<u64> {
        self.record_write();
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: now + window,
        });
        if !entry.is_live(now) {
            *entry = Entry {
                value: "0".to_string(),
                expires_at: now + window,
            };
        }

        let count: u64 = entry
            .value
            .parse()
            .map_err(|_| Error::Cache(format!("value under {} is not a counter", key)))?;
        let count = count + 1;
        entry.value = count.to_string();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.delete(&["k", "missing"]).await.unwrap(), 1);
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_absent() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_increment_counts_within_window() {
        let cache = MemoryCache::new();
        let window = Duration::from_secs(60);
        assert_eq!(cache.increment("c", window).await.unwrap(), 1);
        assert_eq!(cache.increment("c", window).await.unwrap(), 2);
        assert_eq!(cache.increment("c", window).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_increment_restarts_after_window() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment("c", Duration::ZERO).await.unwrap(), 1);
        assert_eq!(cache.increment("c", Duration::from_secs(60)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_rejects_non_counter() {
        let cache = MemoryCache::new();
        cache.set("k", "text", Duration::from_secs(60)).await.unwrap();
        assert!(cache.increment("k", Duration::from_secs(60)).await.is_err());
    }

    #[tokio::test]
    async fn test_unread_expired_entries_are_swept_by_writes() {
        let cache = MemoryCache::new();
        cache.set("stale", "v", Duration::ZERO).await.unwrap();
        cache.increment("ip:10.0.0.1", Duration::ZERO).await.unwrap();
        for _ in 0..SWEEP_EVERY {
            cache
                .increment("ip:10.0.0.2", Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert_eq!(cache.entries.len(), 1);
        assert!(cache.entries.contains_key("ip:10.0.0.2"));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache.set("a", "1", Duration::ZERO).await.unwrap();
        cache.set("b", "2", Duration::ZERO).await.unwrap();
        cache.set("c", "3", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.entries.len(), 1);
    }
}
