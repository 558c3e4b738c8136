//! HTTP routes for the limiter service.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

use super::client_key::client_key;
use super::guard::RateLimitRejection;
use crate::ratelimit::{LimiterMetrics, LimiterRegistry};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The limiters served by this process
    pub registry: Arc<LimiterRegistry>,
    /// Bearer token required by the admin routes
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    /// Create state over a registry, with admin routes enabled when a token is given.
    pub fn new(registry: Arc<LimiterRegistry>, admin_token: Option<String>) -> Self {
        Self {
            registry,
            admin_token: admin_token.map(Arc::from),
        }
    }
}

/// Body of a successful consume.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConsumeResponse {
    /// Limiter the point was taken from
    pub limiter: String,
    /// Caller key the point was charged to
    pub key: String,
    /// Points left in the current window
    pub remaining_points: u32,
    /// Milliseconds until the window resets
    pub ms_before_next: u64,
}

/// Body of the admin metrics listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    /// RFC 3339 time the snapshot was taken
    pub generated_at: String,
    /// Cache occupancy per limiter, ordered by name
    pub limiters: BTreeMap<String, LimiterMetrics>,
}

/// Query parameters of the admin metrics listing.
#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    /// `table` for a plain-text table, JSON otherwise
    #[serde(default)]
    pub format: Option<String>,
}

/// Build the service router.
///
/// The admin routes are only mounted when an admin token is configured.
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/v1/limiters/{name}/consume", post(consume));

    if state.admin_token.is_some() {
        router = router.route("/admin/limiters", get(limiter_metrics));
    } else {
        info!("No admin token configured, admin routes disabled");
    }

    router.with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[instrument(skip(state, headers))]
async fn consume(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(limiter) = state.registry.get(&name) else {
        return (StatusCode::NOT_FOUND, format!("Unknown limiter {name:?}")).into_response();
    };

    let key = client_key(&headers);
    match limiter.consume(&key).await {
        Ok(consumed) => Json(ConsumeResponse {
            limiter: name,
            key,
            remaining_points: consumed.remaining_points,
            ms_before_next: consumed.ms_before_next,
        })
        .into_response(),
        Err(rejected) => RateLimitRejection {
            limiter: name,
            key,
            retry_after: rejected.retry_after_secs(),
        }
        .into_response(),
    }
}

async fn limiter_metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
    headers: HeaderMap,
) -> Response {
    if !is_authorized(&state, &headers) {
        warn!("Rejected unauthorized metrics request");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            "Unauthorized",
        )
            .into_response();
    }

    let limiters = state.registry.all_metrics();

    match query.format.as_deref() {
        Some("table") => render_table(&limiters).into_response(),
        _ => Json(MetricsResponse {
            generated_at: chrono::Utc::now().to_rfc3339(),
            limiters,
        })
        .into_response(),
    }
}

fn is_authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.admin_token.as_deref() else {
        return false;
    };

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| tokens_match(token.trim(), expected))
}

/// Compare tokens in constant time.
///
/// Both sides are hashed first so the comparison does not leak their lengths.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided.ct_eq(&expected).into()
}

/// Render limiter metrics as a plain-text table.
pub fn render_table(limiters: &BTreeMap<String, LimiterMetrics>) -> String {
    let name_width = limiters
        .keys()
        .map(String::len)
        .chain(std::iter::once("LIMITER".len()))
        .max()
        .unwrap_or_default();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<name_width$}  {:>10}  {:>10}  {:>12}",
        "LIMITER", "SIZE", "MAX SIZE", "MEMORY"
    );
    for (name, metrics) in limiters {
        let _ = writeln!(
            out,
            "{:<name_width$}  {:>10}  {:>10}  {:>12}",
            name, metrics.size, metrics.max_size, metrics.memory_usage
        );
    }
    out
}
