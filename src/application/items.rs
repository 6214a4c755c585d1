use std::{future::Future, sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::repos::{
    CreateItemParams, ItemsRepo, ItemsWriteRepo, RepoError, UpdateItemParams,
};
use crate::cache::{
    CacheHandle, CachedJson, Collection, InvalidationCoordinator, KeySpace, ReadThroughCache,
    RequestKey,
};
use crate::domain::entities::ItemRecord;
use crate::domain::error::DomainError;
use crate::domain::items::{DEFAULT_NAME_MAX_LEN, ItemName, normalize_user_id};

const LISTING_ROUTE: &str = "/items";
const DEFAULT_LIST_LIMIT: u32 = 100;
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("item not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("failed to encode items: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct ItemSettings {
    /// Largest listing ever returned; also the default page size.
    pub list_limit: u32,
    pub name_max_len: usize,
    /// Bound applied to every store call.
    pub store_timeout: Duration,
}

impl Default for ItemSettings {
    fn default() -> Self {
        Self {
            list_limit: DEFAULT_LIST_LIMIT,
            name_max_len: DEFAULT_NAME_MAX_LEN,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Read path and invalidation path sharing one backend and key space.
#[derive(Debug, Clone)]
pub struct ItemsCache {
    reads: ReadThroughCache,
    invalidation: InvalidationCoordinator,
}

impl ItemsCache {
    pub fn new(handle: CacheHandle, keys: KeySpace, ttl: Duration) -> Self {
        Self {
            reads: ReadThroughCache::new(handle.clone(), keys.clone(), ttl),
            invalidation: InvalidationCoordinator::new(handle, keys),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateItemCommand {
    pub name: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateItemCommand {
    pub id: Uuid,
    pub name: String,
}

#[derive(Clone)]
pub struct ItemService {
    reader: Arc<dyn ItemsRepo>,
    writer: Arc<dyn ItemsWriteRepo>,
    settings: ItemSettings,
    cache: Option<ItemsCache>,
}

impl ItemService {
    pub fn new(
        reader: Arc<dyn ItemsRepo>,
        writer: Arc<dyn ItemsWriteRepo>,
        settings: ItemSettings,
    ) -> Self {
        Self {
            reader,
            writer,
            settings,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: ItemsCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cache_opt(mut self, cache: Option<ItemsCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn settings(&self) -> &ItemSettings {
        &self.settings
    }

    /// Clamps a requested page size into `1..=list_limit`.
    pub fn effective_limit(&self, requested: Option<u32>) -> u32 {
        let max = self.settings.list_limit.max(1);
        requested.map_or(max, |limit| limit.clamp(1, max))
    }

    /// Most recent items first, served through the listing cache when enabled.
    pub async fn list(
        &self,
        requested_limit: Option<u32>,
    ) -> Result<CachedJson<Vec<ItemRecord>>, ItemError> {
        let limit = self.effective_limit(requested_limit);
        let load = move || async move {
            self.store(self.reader.list_recent(limit))
                .await
                .map_err(ItemError::from)
        };

        match &self.cache {
            Some(cache) => {
                let request = self.listing_request(limit);
                cache
                    .reads
                    .get_or_load(Collection::Items, &request, load)
                    .await
            }
            None => {
                let items = load().await?;
                Ok(CachedJson::uncached(items)?)
            }
        }
    }

    pub async fn find(&self, id: Uuid) -> Result<ItemRecord, ItemError> {
        self.store(self.reader.find_by_id(id))
            .await?
            .ok_or(ItemError::NotFound)
    }

    pub async fn create(&self, command: CreateItemCommand) -> Result<ItemRecord, ItemError> {
        let name = ItemName::parse(&command.name, self.settings.name_max_len)?;
        let params = CreateItemParams {
            name: name.into_inner(),
            user_id: normalize_user_id(command.user_id.as_deref()),
        };

        let item = self.store(self.writer.create_item(params)).await?;
        info!(
            target = "shelf::items",
            item_id = %item.id,
            user_id = %item.user_id,
            "Item created"
        );
        self.invalidate_listings().await;
        Ok(item)
    }

    pub async fn update(&self, command: UpdateItemCommand) -> Result<ItemRecord, ItemError> {
        let name = ItemName::parse(&command.name, self.settings.name_max_len)?;
        let params = UpdateItemParams {
            id: command.id,
            name: name.into_inner(),
        };

        let item = self
            .store(self.writer.update_item(params))
            .await?
            .ok_or(ItemError::NotFound)?;
        info!(target = "shelf::items", item_id = %item.id, "Item updated");
        self.invalidate_listings().await;
        Ok(item)
    }

    pub async fn delete(&self, id: Uuid) -> Result<ItemRecord, ItemError> {
        let item = self
            .store(self.writer.delete_item(id))
            .await?
            .ok_or(ItemError::NotFound)?;
        info!(target = "shelf::items", item_id = %item.id, "Item deleted");
        self.invalidate_listings().await;
        Ok(item)
    }

    pub async fn store_health(&self) -> Result<(), RepoError> {
        self.store(self.reader.ping()).await
    }

    /// The default page size shares a key with a bare `/items` request.
    fn listing_request(&self, limit: u32) -> RequestKey {
        let request = RequestKey::new(LISTING_ROUTE);
        if limit == self.settings.list_limit {
            request
        } else {
            request.with_param("limit", limit)
        }
    }

    async fn invalidate_listings(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        let report = cache.invalidation.invalidate(Collection::Items).await;
        debug!(
            target = "shelf::items",
            generation = ?report.generation,
            deleted = report.deleted,
            complete = report.complete,
            "Item listings invalidated"
        );
    }

    async fn store<T>(
        &self,
        operation: impl Future<Output = Result<T, RepoError>>,
    ) -> Result<T, RepoError> {
        tokio::time::timeout(self.settings.store_timeout, operation)
            .await
            .unwrap_or(Err(RepoError::Timeout))
    }
}
