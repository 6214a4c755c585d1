//! Listing cache.
//!
//! - [`ReadThroughCache`] serves collection listings from the cache backend
//!   and falls back to the store on a miss.
//! - [`InvalidationCoordinator`] drops every listing of a collection after a
//!   write.
//! - [`CacheHandle`] bounds every backend call with a timeout; the backend is
//!   either Redis ([`RedisBackend`]) or an in-process LRU ([`MemoryBackend`]).
//!
//! Cache failures never fail a request. They are logged, counted and the
//! store answers instead.

mod backend;
mod config;
mod invalidation;
mod keys;
mod lock;
mod memory;
pub mod metrics;
mod read_through;
mod redis_backend;

pub use backend::{CacheBackend, CacheError, CacheHandle};
pub use config::{CacheBackendKind, CacheConfig};
pub use invalidation::{InvalidationCoordinator, InvalidationReport};
pub use keys::{Collection, KeySpace, RequestKey};
pub use memory::MemoryBackend;
pub use read_through::{CacheOutcome, CachedJson, ReadThroughCache};
pub use redis_backend::{RedisBackend, escape_glob};
