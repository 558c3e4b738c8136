//! Caller identity extraction.

use axum::http::HeaderMap;

/// Key used when no forwarding header identifies the caller.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derive the rate limit key for a request from its forwarding headers.
///
/// Uses the first address in `X-Forwarded-For`, then `X-Real-IP`, and falls
/// back to [`UNKNOWN_CLIENT`]. All callers without either header share one
/// quota.
pub fn client_key(headers: &HeaderMap) -> String {
    forwarded_for(headers)
        .or_else(|| header_value(headers, "x-real-ip"))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| value.to_string())
}
