//! API handlers organized by resource type.
//!
//! Error conversion helpers shared by the resource modules live here.

mod items;
mod system;

pub use items::*;
pub use system::*;

use axum::http::StatusCode;
use uuid::Uuid;

use crate::application::items::ItemError;
use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

use super::error::{ApiError, codes};

const ITEM_NOT_FOUND: &str = "Item not found";

/// Ids that are not UUIDs cannot name a stored item.
pub(crate) fn parse_item_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found(ITEM_NOT_FOUND))
}

pub(crate) fn item_to_api(err: ItemError) -> ApiError {
    match err {
        ItemError::Validation(DomainError::Validation { message }) => {
            ApiError::new(StatusCode::BAD_REQUEST, codes::INVALID_INPUT, message, None)
        }
        ItemError::NotFound => ApiError::not_found(ITEM_NOT_FOUND),
        ItemError::Repo(repo) => repo_to_api(repo),
        ItemError::Encode(err) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            "Internal server error",
            None,
        )
        .with_detail(err.to_string()),
    }
}

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::Duplicate { constraint } => ApiError::new(
            StatusCode::CONFLICT,
            codes::DUPLICATE,
            "Duplicate record",
            Some(constraint),
        ),
        RepoError::InvalidInput { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(message),
        ),
        RepoError::Integrity { message } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INTEGRITY,
            "Integrity constraint violated",
            Some(message),
        ),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        RepoError::Persistence(msg) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            None,
        )
        .with_detail(msg),
    }
}
