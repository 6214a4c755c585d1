//! Cache configuration.
//!
//! Controlled by the `[cache]` table of the settings files:
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "redis"          # or "memory"
//! url = "redis://127.0.0.1:6379"
//! namespace = "cache"
//! ttl_seconds = 60
//! operation_timeout_ms = 250
//! ```

use std::{fmt, num::NonZeroUsize, str::FromStr, time::Duration};

const DEFAULT_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_NAMESPACE: &str = "cache";
const DEFAULT_TTL_SECONDS: u64 = 60;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 250;
const DEFAULT_MEMORY_MAX_ENTRIES: usize = 1024;
const DEFAULT_MEMORY_PURGE_INTERVAL_SECONDS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackendKind {
    #[default]
    Redis,
    Memory,
}

impl CacheBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for CacheBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown cache backend `{other}` (expected redis or memory)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false no backend is built and every listing read goes to the store.
    pub enabled: bool,
    pub backend: CacheBackendKind,
    /// Redis connection URL, ignored by the memory backend.
    pub url: String,
    /// Prefix shared by every key this service writes.
    pub namespace: String,
    /// Lifetime of a listing entry.
    pub ttl: Duration,
    /// Upper bound for any single backend call.
    pub operation_timeout: Duration,
    pub memory_max_entries: usize,
    pub memory_purge_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::default(),
            url: DEFAULT_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
            memory_max_entries: DEFAULT_MEMORY_MAX_ENTRIES,
            memory_purge_interval: Duration::from_secs(DEFAULT_MEMORY_PURGE_INTERVAL_SECONDS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            url: settings.url.clone(),
            namespace: settings.namespace.clone(),
            ttl: Duration::from_secs(u64::from(settings.ttl_seconds.get())),
            operation_timeout: Duration::from_millis(u64::from(
                settings.operation_timeout_ms.get(),
            )),
            memory_max_entries: settings.memory_max_entries.get() as usize,
            memory_purge_interval: Duration::from_secs(u64::from(
                settings.memory_purge_interval_seconds.get(),
            )),
        }
    }
}

impl CacheConfig {
    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}
