use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::entities::ItemRecord;

/// `name` is optional here so a missing field reports the same validation
/// error as a blank one.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCreateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ItemUpdateRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemListQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemDeletedResponse {
    pub message: String,
    pub item: ItemRecord,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub database: String,
    pub cache: String,
    pub cache_backend: Option<String>,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub endpoints: ServiceEndpoints,
}

#[derive(Debug, Serialize)]
pub struct ServiceEndpoints {
    pub health: &'static str,
    pub items: &'static str,
    pub item: &'static str,
}
