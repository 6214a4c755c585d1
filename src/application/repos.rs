//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::ItemRecord;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateItemParams {
    pub name: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct UpdateItemParams {
    pub id: Uuid,
    pub name: String,
}

#[async_trait]
pub trait ItemsRepo: Send + Sync {
    /// Most recent items first, at most `limit` of them.
    async fn list_recent(&self, limit: u32) -> Result<Vec<ItemRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ItemRecord>, RepoError>;

    async fn ping(&self) -> Result<(), RepoError>;
}

/// Mutations return `None` when the targeted item does not exist.
#[async_trait]
pub trait ItemsWriteRepo: Send + Sync {
    async fn create_item(&self, params: CreateItemParams) -> Result<ItemRecord, RepoError>;

    async fn update_item(&self, params: UpdateItemParams)
    -> Result<Option<ItemRecord>, RepoError>;

    async fn delete_item(&self, id: Uuid) -> Result<Option<ItemRecord>, RepoError>;
}
