//! Read-through caching for collection listings.
//!
//! A listing is looked up under the key of the collection's current
//! generation. On a miss the loader runs against the store, its result is
//! serialized once and the same bytes are both cached and returned, so a hit
//! and the miss that populated it produce identical bodies.

use std::{future::Future, time::Duration};

use bytes::Bytes;
use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::{
    backend::{CacheError, CacheHandle},
    keys::{Collection, KeySpace, RequestKey},
    metrics::{METRIC_CACHE_BYPASS, METRIC_CACHE_HIT, METRIC_CACHE_MISS},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    /// The cache could not be consulted; the value came straight from the store.
    Bypass,
}

impl CacheOutcome {
    /// Value of the `x-cache` response header.
    pub fn as_header(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
        }
    }
}

/// A value together with its JSON encoding.
#[derive(Debug, Clone)]
pub struct CachedJson<T> {
    pub value: T,
    pub body: Bytes,
    pub outcome: CacheOutcome,
}

impl<T: Serialize> CachedJson<T> {
    /// Wraps a value that never went through the cache.
    pub fn uncached(value: T) -> Result<Self, serde_json::Error> {
        let body = Bytes::from(serde_json::to_vec(&value)?);
        Ok(Self {
            value,
            body,
            outcome: CacheOutcome::Bypass,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReadThroughCache {
    handle: CacheHandle,
    keys: KeySpace,
    ttl: Duration,
}

impl ReadThroughCache {
    pub fn new(handle: CacheHandle, keys: KeySpace, ttl: Duration) -> Self {
        Self { handle, keys, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Serves `request` from the cache, or from `load` on a miss.
    ///
    /// Cache failures are logged and absorbed; errors from `load` and from
    /// encoding its result are returned unchanged.
    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        collection: Collection,
        request: &RequestKey,
        load: F,
    ) -> Result<CachedJson<T>, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<serde_json::Error>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation_key = self.keys.generation_key(collection);
        let generation = match self.handle.counter(&generation_key).await {
            Ok(generation) => generation,
            Err(err) => return self.bypass(collection, "generation", &err, load).await,
        };
        let key = self.keys.listing_key(collection, generation, request);

        match self.handle.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_slice::<T>(&raw) {
                Ok(value) => {
                    counter!(METRIC_CACHE_HIT, "collection" => collection.as_str()).increment(1);
                    debug!(target = "shelf::cache", key = %key, "Cache hit");
                    return Ok(CachedJson {
                        value,
                        body: Bytes::from(raw),
                        outcome: CacheOutcome::Hit,
                    });
                }
                Err(err) => {
                    warn!(
                        target = "shelf::cache",
                        key = %key,
                        error = %err,
                        "Discarding cache entry that no longer decodes"
                    );
                }
            },
            Ok(None) => {}
            Err(err) => return self.bypass(collection, "get", &err, load).await,
        }

        counter!(METRIC_CACHE_MISS, "collection" => collection.as_str()).increment(1);
        debug!(target = "shelf::cache", key = %key, "Cache miss");

        let value = load().await?;
        let body = Bytes::from(serde_json::to_vec(&value)?);

        match self.handle.set_with_ttl(&key, &body, self.ttl).await {
            Ok(()) => debug!(
                target = "shelf::cache",
                key = %key,
                ttl_secs = self.ttl.as_secs(),
                "Cache set"
            ),
            Err(err) => warn!(
                target = "shelf::cache",
                key = %key,
                error = %err,
                "Failed to store listing in cache"
            ),
        }

        Ok(CachedJson {
            value,
            body,
            outcome: CacheOutcome::Miss,
        })
    }

    async fn bypass<T, E, F, Fut>(
        &self,
        collection: Collection,
        op: &'static str,
        err: &CacheError,
        load: F,
    ) -> Result<CachedJson<T>, E>
    where
        T: Serialize,
        E: From<serde_json::Error>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        counter!(METRIC_CACHE_BYPASS, "collection" => collection.as_str()).increment(1);
        warn!(
            target = "shelf::cache",
            collection = collection.as_str(),
            op,
            backend = self.handle.kind(),
            error = %err,
            "Cache unavailable, reading from store"
        );
        let value = load().await?;
        Ok(CachedJson::uncached(value)?)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        num::NonZeroUsize,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;
    use crate::cache::{CacheBackend, MemoryBackend};

    #[derive(Debug, thiserror::Error)]
    enum LoadError {
        #[error("store down")]
        Store,
        #[error(transparent)]
        Encode(#[from] serde_json::Error),
    }

    fn cache_over(backend: Arc<MemoryBackend>) -> ReadThroughCache {
        ReadThroughCache::new(
            CacheHandle::new(backend, Duration::from_millis(100)),
            KeySpace::default(),
            Duration::from_secs(60),
        )
    }

    async fn load_counted(
        calls: &AtomicUsize,
        value: Vec<u32>,
    ) -> Result<Vec<u32>, LoadError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    #[tokio::test]
    async fn second_read_is_a_hit_with_identical_body() {
        let cache = cache_over(Arc::new(MemoryBackend::new(NonZeroUsize::new(16).unwrap())));
        let calls = AtomicUsize::new(0);
        let request = RequestKey::new("/items");

        let first = cache
            .get_or_load(Collection::Items, &request, || load_counted(&calls, vec![1, 2]))
            .await
            .unwrap();
        let second = cache
            .get_or_load(Collection::Items, &request, || load_counted(&calls, vec![9]))
            .await
            .unwrap();

        assert_eq!(first.outcome, CacheOutcome::Miss);
        assert_eq!(second.outcome, CacheOutcome::Hit);
        assert_eq!(first.body, second.body);
        assert_eq!(second.value, vec![1, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn undecodable_entry_is_replaced() {
        let backend = Arc::new(MemoryBackend::new(NonZeroUsize::new(16).unwrap()));
        let cache = cache_over(backend.clone());
        let request = RequestKey::new("/items");
        let key = KeySpace::default().listing_key(Collection::Items, 0, &request);
        backend
            .set_with_ttl(&key, b"{not json", Duration::from_secs(60))
            .await
            .unwrap();

        let calls = AtomicUsize::new(0);
        let result = cache
            .get_or_load(Collection::Items, &request, || load_counted(&calls, vec![3]))
            .await
            .unwrap();

        assert_eq!(result.outcome, CacheOutcome::Miss);
        assert_eq!(backend.get(&key).await.unwrap(), Some(b"[3]".to_vec()));
    }

    #[tokio::test]
    async fn loader_errors_propagate_and_are_not_cached() {
        let backend = Arc::new(MemoryBackend::new(NonZeroUsize::new(16).unwrap()));
        let cache = cache_over(backend.clone());
        let request = RequestKey::new("/items");

        let result: Result<CachedJson<Vec<u32>>, LoadError> = cache
            .get_or_load(Collection::Items, &request, || async { Err(LoadError::Store) })
            .await;

        assert!(matches!(result, Err(LoadError::Store)));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn uncached_values_report_bypass() {
        let wrapped = CachedJson::uncached(vec!["a"]).unwrap();
        assert_eq!(wrapped.outcome, CacheOutcome::Bypass);
        assert_eq!(wrapped.body.as_ref(), br#"["a"]"#);
    }
}
