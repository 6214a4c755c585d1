//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use shelf::application::items::{ItemService, ItemSettings, ItemsCache};
use shelf::application::repos::{
    CreateItemParams, ItemsRepo, ItemsWriteRepo, RepoError, UpdateItemParams,
};
use shelf::cache::{CacheBackend, CacheError, CacheHandle, KeySpace, MemoryBackend};
use shelf::domain::entities::ItemRecord;
use shelf::infra::http::{ApiRateLimiter, ApiState, build_router};

pub const CACHE_TTL: Duration = Duration::from_secs(60);
pub const CACHE_OP_TIMEOUT: Duration = Duration::from_millis(250);

/// Store fake. Timestamps advance one second per insert so ordering is stable.
#[derive(Default)]
pub struct InMemoryItems {
    items: Mutex<Vec<ItemRecord>>,
    inserted: AtomicUsize,
    list_calls: AtomicUsize,
    unavailable: AtomicBool,
    list_delay: Mutex<Option<Duration>>,
}

impl InMemoryItems {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn set_list_delay(&self, delay: Option<Duration>) {
        *self.list_delay.lock().await = delay;
    }

    fn check_available(&self) -> Result<(), RepoError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ItemsRepo for InMemoryItems {
    async fn list_recent(&self, limit: u32) -> Result<Vec<ItemRecord>, RepoError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        // Snapshot first so a delayed listing reflects the store as it was
        // when the query started.
        let mut items = self.items.lock().await.clone();
        let delay = *self.list_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ItemRecord>, RepoError> {
        self.check_available()?;
        Ok(self
            .items
            .lock()
            .await
            .iter()
            .find(|item| item.id == id)
            .cloned())
    }

    async fn ping(&self) -> Result<(), RepoError> {
        self.check_available()
    }
}

#[async_trait]
impl ItemsWriteRepo for InMemoryItems {
    async fn create_item(&self, params: CreateItemParams) -> Result<ItemRecord, RepoError> {
        self.check_available()?;
        let seq = self.inserted.fetch_add(1, Ordering::SeqCst) as i64;
        let item = ItemRecord {
            id: Uuid::new_v4(),
            name: params.name,
            timestamp: OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(1_700_000_000 + seq),
            user_id: params.user_id,
        };
        self.items.lock().await.push(item.clone());
        Ok(item)
    }

    async fn update_item(
        &self,
        params: UpdateItemParams,
    ) -> Result<Option<ItemRecord>, RepoError> {
        self.check_available()?;
        let mut items = self.items.lock().await;
        Ok(items
            .iter_mut()
            .find(|item| item.id == params.id)
            .map(|item| {
                item.name = params.name;
                item.clone()
            }))
    }

    async fn delete_item(&self, id: Uuid) -> Result<Option<ItemRecord>, RepoError> {
        self.check_available()?;
        let mut items = self.items.lock().await;
        let position = items.iter().position(|item| item.id == id);
        Ok(position.map(|index| items.remove(index)))
    }
}

/// Backend whose every call fails, like a Redis that refuses connections.
pub struct DownBackend;

#[async_trait]
impl CacheBackend for DownBackend {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn set_with_ttl(
        &self,
        _key: &str,
        _value: &[u8],
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn delete_many(&self, _keys: &[String]) -> Result<u64, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn increment(&self, _key: &str) -> Result<u64, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::backend("connection refused"))
    }
}

/// Backend that never answers; only the handle's timeout gets a caller out.
pub struct HangingBackend;

#[async_trait]
impl CacheBackend for HangingBackend {
    fn kind(&self) -> &'static str {
        "redis"
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

pub fn memory_backend() -> Arc<MemoryBackend> {
    memory_backend_with_capacity(1024)
}

pub fn memory_backend_with_capacity(max_entries: usize) -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::new(
        NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN),
    ))
}

pub fn handle_over(backend: Arc<dyn CacheBackend>) -> CacheHandle {
    CacheHandle::new(backend, CACHE_OP_TIMEOUT)
}

pub fn service(store: Arc<InMemoryItems>, cache: Option<CacheHandle>) -> Arc<ItemService> {
    service_with(store, cache, ItemSettings::default())
}

pub fn service_with(
    store: Arc<InMemoryItems>,
    cache: Option<CacheHandle>,
    settings: ItemSettings,
) -> Arc<ItemService> {
    let reader: Arc<dyn ItemsRepo> = store.clone();
    let writer: Arc<dyn ItemsWriteRepo> = store;
    let items_cache = cache.map(|handle| ItemsCache::new(handle, KeySpace::default(), CACHE_TTL));
    Arc::new(ItemService::new(reader, writer, settings).with_cache_opt(items_cache))
}

pub fn router(items: Arc<ItemService>, cache: Option<CacheHandle>) -> Router {
    router_with_limit(items, cache, 1_000)
}

pub fn router_with_limit(
    items: Arc<ItemService>,
    cache: Option<CacheHandle>,
    max_requests: u32,
) -> Router {
    let limiter = Arc::new(ApiRateLimiter::new(
        Duration::from_secs(900),
        max_requests,
    ));
    build_router(ApiState::new(items, cache, limiter))
}

pub fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub fn cache_status(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get("x-cache")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}
