//! Item handlers

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::application::items::{CreateItemCommand, UpdateItemCommand};

use super::{item_to_api, parse_item_id};
use crate::infra::http::api::error::{ApiError, codes};
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-cache");

const ITEM_DELETED_MESSAGE: &str = "Item deleted successfully";

pub async fn list_items(
    State(state): State<ApiState>,
    query: Result<Query<ItemListQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) =
        query.map_err(|err| ApiError::bad_request("Invalid query", Some(err.body_text())))?;

    let listing = state.items.list(query.limit).await.map_err(item_to_api)?;

    let mut response = (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )],
        listing.body,
    )
        .into_response();
    response.headers_mut().insert(
        CACHE_STATUS_HEADER,
        HeaderValue::from_static(listing.outcome.as_header()),
    );
    Ok(response)
}

pub async fn get_item(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_item_id(&id)?;
    let item = state.items.find(id).await.map_err(item_to_api)?;
    Ok(Json(item))
}

pub async fn create_item(
    State(state): State<ApiState>,
    payload: Result<Json<ItemCreateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(json_rejection)?;

    let item = state
        .items
        .create(CreateItemCommand {
            name: payload.name.unwrap_or_default(),
            user_id: payload.user_id,
        })
        .await
        .map_err(item_to_api)?;

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    payload: Result<Json<ItemUpdateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_item_id(&id)?;
    let Json(payload) = payload.map_err(json_rejection)?;

    let item = state
        .items
        .update(UpdateItemCommand {
            id,
            name: payload.name.unwrap_or_default(),
        })
        .await
        .map_err(item_to_api)?;

    Ok(Json(item))
}

pub async fn delete_item(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_item_id(&id)?;
    let item = state.items.delete(id).await.map_err(item_to_api)?;

    Ok(Json(ItemDeletedResponse {
        message: ITEM_DELETED_MESSAGE.to_string(),
        item,
    }))
}

fn json_rejection(err: JsonRejection) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            codes::PAYLOAD_TOO_LARGE,
            "Request body too large",
            None,
        );
    }
    ApiError::bad_request("Invalid JSON body", Some(err.body_text()))
}
