use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use super::error::ApiError;
use super::state::ApiState;

pub const RATE_LIMIT_LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING_HEADER: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining");

const UNKNOWN_CLIENT: &str = "unknown";

pub async fn api_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_key(&request);
    let decision = state.rate_limiter.allow(&client);
    let limit = state.rate_limiter.limit();

    if !decision.allowed {
        warn!(
            target = "shelf::api::ratelimit",
            client = %client,
            path = %request.uri().path(),
            retry_after = decision.retry_after_secs,
            "rate limit exceeded"
        );
        let mut response = ApiError::rate_limited(decision.retry_after_secs);
        insert_limit_headers(response.headers_mut(), limit, 0);
        return response;
    }

    let mut response = next.run(request).await;
    insert_limit_headers(response.headers_mut(), limit, decision.remaining);
    response
}

/// Clients are told apart by peer IP; requests without connection info share
/// one bucket.
fn client_key(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn insert_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32) {
    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(remaining));
}
