//! Cache backend seam.
//!
//! [`CacheBackend`] is the raw key-value contract, [`CacheHandle`] is what the
//! rest of the crate talks to: it bounds every call with the configured
//! operation timeout and counts failures.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;

use super::metrics::METRIC_CACHE_ERROR;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("cache operation `{op}` timed out after {timeout_ms} ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
    #[error("deleted {deleted} keys, {failed} could not be deleted: {message}")]
    PartialDelete {
        deleted: u64,
        failed: u64,
        message: String,
    },
    #[error("value under `{key}` is not a counter")]
    NotACounter { key: String },
    #[error("cache backend error: {message}")]
    Backend { message: String },
}

impl CacheError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name for logs and health output.
    fn kind(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration)
    -> Result<(), CacheError>;

    /// Deletes as many of `keys` as possible and returns how many existed.
    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// Every live key starting with `prefix`, in no particular order.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    /// Atomically adds one, creating the counter at 1 without a TTL.
    async fn increment(&self, key: &str) -> Result<u64, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

#[derive(Clone)]
pub struct CacheHandle {
    backend: Arc<dyn CacheBackend>,
    timeout: Duration,
}

impl CacheHandle {
    pub fn new(backend: Arc<dyn CacheBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.bounded("get", self.backend.get(key)).await
    }

    pub async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.bounded("set", self.backend.set_with_ttl(key, value, ttl))
            .await
    }

    pub async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.bounded("delete", self.backend.delete_many(keys)).await
    }

    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        self.bounded("scan", self.backend.keys_with_prefix(prefix))
            .await
    }

    pub async fn increment(&self, key: &str) -> Result<u64, CacheError> {
        self.bounded("incr", self.backend.increment(key)).await
    }

    /// Current value of a counter written by [`CacheHandle::increment`];
    /// a missing counter reads as zero.
    pub async fn counter(&self, key: &str) -> Result<u64, CacheError> {
        let raw = self.bounded("get", self.backend.get(key)).await?;
        let Some(raw) = raw else {
            return Ok(0);
        };
        let parsed = std::str::from_utf8(&raw)
            .ok()
            .and_then(|text| text.trim().parse::<u64>().ok());
        match parsed {
            Some(value) => Ok(value),
            None => {
                counter!(METRIC_CACHE_ERROR, "op" => "get").increment(1);
                Err(CacheError::NotACounter {
                    key: key.to_string(),
                })
            }
        }
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        self.bounded("ping", self.backend.ping()).await
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        operation: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        let result = match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                op,
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        if result.is_err() {
            counter!(METRIC_CACHE_ERROR, "op" => op).increment(1);
        }
        result
    }
}

impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle")
            .field("backend", &self.backend.kind())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use std::num::NonZeroUsize;

    struct StalledBackend;

    #[async_trait]
    impl CacheBackend for StalledBackend {
        fn kind(&self) -> &'static str {
            "stalled"
        }

        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            std::future::pending().await
        }

        async fn set_with_ttl(
            &self,
            _key: &str,
            _value: &[u8],
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            std::future::pending().await
        }

        async fn delete_many(&self, _keys: &[String]) -> Result<u64, CacheError> {
            std::future::pending().await
        }

        async fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>, CacheError> {
            std::future::pending().await
        }

        async fn increment(&self, _key: &str) -> Result<u64, CacheError> {
            std::future::pending().await
        }

        async fn ping(&self) -> Result<(), CacheError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_backend_times_out() {
        let handle = CacheHandle::new(Arc::new(StalledBackend), Duration::from_millis(250));

        let err = handle.get("k").await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::Timeout {
                op: "get",
                timeout_ms: 250
            }
        ));
        assert!(matches!(
            handle.ping().await,
            Err(CacheError::Timeout { op: "ping", .. })
        ));
    }

    #[tokio::test]
    async fn counter_reads_zero_then_increments() {
        let backend = MemoryBackend::new(NonZeroUsize::new(8).unwrap());
        let handle = CacheHandle::new(Arc::new(backend), Duration::from_secs(1));

        assert_eq!(handle.counter("g").await.unwrap(), 0);
        assert_eq!(handle.increment("g").await.unwrap(), 1);
        assert_eq!(handle.increment("g").await.unwrap(), 2);
        assert_eq!(handle.counter("g").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn counter_rejects_non_numeric_values() {
        let backend = MemoryBackend::new(NonZeroUsize::new(8).unwrap());
        let handle = CacheHandle::new(Arc::new(backend), Duration::from_secs(1));
        handle
            .set_with_ttl("g", b"[]", Duration::from_secs(5))
            .await
            .unwrap();

        assert!(matches!(
            handle.counter("g").await,
            Err(CacheError::NotACounter { .. })
        ));
    }

    #[tokio::test]
    async fn empty_delete_skips_backend() {
        let handle = CacheHandle::new(Arc::new(StalledBackend), Duration::from_millis(10));
        assert_eq!(handle.delete_many(&[]).await.unwrap(), 0);
    }
}
