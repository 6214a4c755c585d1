pub const METRIC_CACHE_HIT: &str = "shelf_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "shelf_cache_miss_total";
pub const METRIC_CACHE_BYPASS: &str = "shelf_cache_bypass_total";
pub const METRIC_CACHE_ERROR: &str = "shelf_cache_error_total";
pub const METRIC_CACHE_INVALIDATED_KEYS: &str = "shelf_cache_invalidated_keys_total";
pub const METRIC_CACHE_INVALIDATE_MS: &str = "shelf_cache_invalidate_ms";
