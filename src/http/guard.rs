//! Admission control for HTTP handlers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::client_key::client_key;
use crate::ratelimit::{Consumed, LimiterRegistry, RateLimited, RateLimiter};

/// Header carrying the points left after an admitted request.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// A request turned away because its caller exhausted a limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRejection {
    /// Name of the limiter that rejected the request
    pub limiter: String,
    /// Key the request was counted under
    pub key: String,
    /// Whole seconds until the caller may retry
    pub retry_after: u64,
}

impl RateLimitRejection {
    fn new(limiter: &str, key: String, rejected: RateLimited) -> Self {
        Self {
            limiter: limiter.to_string(),
            key,
            retry_after: rejected.retry_after_secs(),
        }
    }
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, self.retry_after.to_string())],
            "Too Many Requests",
        )
            .into_response()
    }
}

/// Whole seconds a client should wait, given milliseconds until reset.
pub fn retry_after_secs(ms_before_next: u64) -> u64 {
    RateLimited { ms_before_next }.retry_after_secs()
}

/// Consume one point from the limiter `limiter_name` for the caller behind `headers`.
///
/// # Panics
///
/// Panics if `limiter_name` was never registered.
pub async fn check_rate_limit(
    registry: &LimiterRegistry,
    limiter_name: &str,
    headers: &HeaderMap,
) -> Result<Consumed, RateLimitRejection> {
    let limiter = registry.limiter(limiter_name);
    consume_for(&limiter, headers).await
}

async fn consume_for(
    limiter: &RateLimiter,
    headers: &HeaderMap,
) -> Result<Consumed, RateLimitRejection> {
    let key = client_key(headers);

    limiter.consume(&key).await.map_err(|rejected| {
        debug!(
            limiter = %limiter.name(),
            key = %key,
            ms_before_next = rejected.ms_before_next,
            "Rejecting request"
        );
        RateLimitRejection::new(limiter.name(), key, rejected)
    })
}

/// Middleware guarding a route with one limiter.
///
/// ```ignore
/// Router::new()
///     .route("/api/search", post(search))
///     .layer(from_fn_with_state(registry.limiter("search"), enforce))
/// ```
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitRejection> {
    let consumed = consume_for(&limiter, request.headers()).await?;

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        REMAINING_HEADER,
        HeaderValue::from(consumed.remaining_points),
    );
    Ok(response)
}
