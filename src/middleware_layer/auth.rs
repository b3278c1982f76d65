use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::models::profile::Caller;

/// Header set by the upstream gateway once it has authenticated the caller.
pub const CALLER_HEADER: &str = "x-user-id";

/// Extracts the caller's id from the request headers.
fn extract_caller(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
}

/// A middleware that requires a pre-authenticated caller.
///
/// Inserts a `Caller` extension for the handlers; rejects the request with
/// 403 when the header is missing or malformed.
pub async fn require_caller(mut request: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let user_id = extract_caller(request.headers()).ok_or_else(|| {
        tracing::warn!("❌ Missing or malformed {} header", CALLER_HEADER);
        StatusCode::FORBIDDEN
    })?;

    tracing::debug!("✅ Caller identified: {}", user_id);

    request.extensions_mut().insert(Caller { user_id });

    Ok(next.run(request).await)
}
