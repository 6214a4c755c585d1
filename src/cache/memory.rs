//! In-process cache backend.
//!
//! An LRU map bounded by entry count. Expiry uses tokio's clock so that tests
//! running on a paused runtime can move time forward deterministically.
//! Counters live in their own map outside the LRU and are never evicted.

use std::{collections::HashMap, num::NonZeroUsize, sync::RwLock, time::Duration};

use async_trait::async_trait;
use lru::LruCache;
use tokio::time::Instant;

use super::{
    backend::{CacheBackend, CacheError},
    lock::{rw_read, rw_write},
};

const SOURCE: &str = "cache::memory";

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

pub struct MemoryBackend {
    entries: RwLock<LruCache<String, Entry>>,
    // Lock order: `entries` before `counters`.
    counters: RwLock<HashMap<String, u64>>,
}

impl MemoryBackend {
    pub fn new(max_entries: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(max_entries)),
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "purge_expired");
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Number of live entries, counters excluded.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "len")
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let Some(entry) = entries.get(key) else {
            let counters = rw_read(&self.counters, SOURCE, "get");
            return Ok(counters
                .get(key)
                .map(|value| value.to_string().into_bytes()));
        };
        if !entry.is_expired(now) {
            return Ok(Some(entry.value.clone()));
        }
        entries.pop(key);
        Ok(None)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let entry = Entry {
            value: value.to_vec(),
            expires_at: Some(Instant::now() + ttl),
        };
        let mut entries = rw_write(&self.entries, SOURCE, "set");
        rw_write(&self.counters, SOURCE, "set").remove(key);
        entries.put(key.to_string(), entry);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "delete_many");
        let mut counters = rw_write(&self.counters, SOURCE, "delete_many");
        let deleted = keys
            .iter()
            .filter(|key| {
                let live_entry = entries
                    .pop(key.as_str())
                    .is_some_and(|entry| !entry.is_expired(now));
                let counter = counters.remove(key.as_str()).is_some();
                live_entry || counter
            })
            .count();
        Ok(deleted as u64)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "keys_with_prefix");
        let counters = rw_read(&self.counters, SOURCE, "keys_with_prefix");
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .chain(
                counters
                    .keys()
                    .filter(|key| key.starts_with(prefix))
                    .cloned(),
            )
            .collect())
    }

    async fn increment(&self, key: &str) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "increment");
        let mut counters = rw_write(&self.counters, SOURCE, "increment");

        // A numeric value written with `set_with_ttl` becomes a counter.
        let seeded = match entries.pop(key) {
            Some(entry) if !entry.is_expired(now) => {
                let parsed = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|text| text.parse::<u64>().ok());
                match parsed {
                    Some(value) => Some(value),
                    None => {
                        entries.put(key.to_string(), entry);
                        return Err(CacheError::NotACounter {
                            key: key.to_string(),
                        });
                    }
                }
            }
            _ => None,
        };

        let counter = counters.entry(key.to_string()).or_insert(0);
        if let Some(value) = seeded {
            *counter = value;
        }
        *counter = counter
            .checked_add(1)
            .ok_or_else(|| CacheError::backend(format!("counter `{key}` overflowed")))?;
        Ok(*counter)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(capacity: usize) -> MemoryBackend {
        MemoryBackend::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = backend(4);
        cache
            .set_with_ttl("k", b"v", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired_entries() {
        let cache = backend(4);
        cache
            .set_with_ttl("short", b"1", Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .set_with_ttl("long", b"2", Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted() {
        let cache = backend(2);
        let ttl = Duration::from_secs(60);
        cache.set_with_ttl("a", b"1", ttl).await.unwrap();
        cache.set_with_ttl("b", b"2", ttl).await.unwrap();
        cache.get("a").await.unwrap();
        cache.set_with_ttl("c", b"3", ttl).await.unwrap();

        assert_eq!(cache.get("b").await.unwrap(), None);
        assert!(cache.get("a").await.unwrap().is_some());
        assert!(cache.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn prefix_scan_and_delete() {
        let cache = backend(8);
        let ttl = Duration::from_secs(60);
        cache.set_with_ttl("cache:items:g0:/items", b"[]", ttl).await.unwrap();
        cache
            .set_with_ttl("cache:items:g1:/items?limit=5", b"[]", ttl)
            .await
            .unwrap();
        cache.set_with_ttl("cache:other:g0:/x", b"[]", ttl).await.unwrap();

        let mut keys = cache.keys_with_prefix("cache:items:").await.unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "cache:items:g0:/items".to_string(),
                "cache:items:g1:/items?limit=5".to_string()
            ]
        );

        assert_eq!(cache.delete_many(&keys).await.unwrap(), 2);
        assert_eq!(cache.delete_many(&keys).await.unwrap(), 0);
        assert!(cache.keys_with_prefix("cache:items:").await.unwrap().is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn increment_creates_counter_without_ttl() {
        let cache = backend(4);
        assert_eq!(cache.increment("gen").await.unwrap(), 1);
        assert_eq!(cache.increment("gen").await.unwrap(), 2);
        assert_eq!(cache.get("gen").await.unwrap(), Some(b"2".to_vec()));

        cache
            .set_with_ttl("text", b"hello", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(matches!(
            cache.increment("text").await,
            Err(CacheError::NotACounter { .. })
        ));
        assert_eq!(cache.get("text").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn counters_survive_listing_churn() {
        let cache = backend(2);
        let ttl = Duration::from_secs(60);
        assert_eq!(cache.increment("gen").await.unwrap(), 1);

        for index in 0..8 {
            cache
                .set_with_ttl(&format!("listing-{index}"), b"[]", ttl)
                .await
                .unwrap();
        }

        assert_eq!(cache.get("gen").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(cache.increment("gen").await.unwrap(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn deleting_a_counter_resets_it() {
        let cache = backend(2);
        cache.increment("gen").await.unwrap();
        assert_eq!(cache.delete_many(&["gen".to_string()]).await.unwrap(), 1);
        assert_eq!(cache.get("gen").await.unwrap(), None);
        assert_eq!(cache.increment("gen").await.unwrap(), 1);
    }
}
