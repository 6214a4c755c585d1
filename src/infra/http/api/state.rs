use std::sync::Arc;
use std::time::Instant;

use crate::application::items::ItemService;
use crate::cache::CacheHandle;

use super::rate_limit::ApiRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub items: Arc<ItemService>,
    /// Only used for health reporting; reads and invalidation go through `items`.
    pub cache: Option<CacheHandle>,
    pub rate_limiter: Arc<ApiRateLimiter>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(
        items: Arc<ItemService>,
        cache: Option<CacheHandle>,
        rate_limiter: Arc<ApiRateLimiter>,
    ) -> Self {
        Self {
            items,
            cache,
            rate_limiter,
            started_at: Instant::now(),
        }
    }
}
