//! Service-level handlers: health, info and the 404 fallback.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;

use crate::application::error::ErrorReport;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::{HealthResponse, ServiceEndpoints, ServiceInfo};
use crate::infra::http::api::state::ApiState;

pub async fn health(State(state): State<ApiState>) -> Response {
    let database = state.items.store_health().await;

    let (cache, cache_backend) = match &state.cache {
        None => ("disabled", None),
        Some(handle) => {
            let status = match handle.ping().await {
                Ok(()) => "connected",
                Err(_) => "disconnected",
            };
            (status, Some(handle.kind().to_string()))
        }
    };

    let status = if database.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthResponse {
        status: if database.is_ok() { "ok" } else { "unavailable" }.to_string(),
        timestamp: OffsetDateTime::now_utc(),
        database: if database.is_ok() {
            "connected"
        } else {
            "disconnected"
        }
        .to_string(),
        cache: cache.to_string(),
        cache_backend,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };

    let mut response = (status, Json(body)).into_response();
    if let Err(err) = database {
        ErrorReport::from_error("infra::http::health", status, &err).attach(&mut response);
    }
    response
}

pub async fn service_info() -> impl IntoResponse {
    Json(ServiceInfo {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        description: env!("CARGO_PKG_DESCRIPTION"),
        endpoints: ServiceEndpoints {
            health: "GET /health",
            items: "GET, POST /items",
            item: "GET, PUT, DELETE /items/{id}",
        },
    })
}

pub async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
