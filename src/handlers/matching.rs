use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Response,
    Extension,
};
use serde::Deserialize;

use crate::{
    error::Result,
    models::profile::Caller,
    response::{json, parse_body},
    services::blind_date::JoinRequest,
    state::AppState,
    validation::blind_date::{parse_mood, parse_preferences, validate_duration_minutes},
};

/// Matching preferences as sent by clients.
#[derive(Deserialize, Debug, Default)]
pub struct PreferencesPayload {
    pub gender: Option<String>,
    #[serde(alias = "ageRange")]
    pub age_range: Option<String>,
}

/// The request payload for joining the queue.
#[derive(Deserialize, Debug)]
pub struct JoinPayload {
    pub mood: String,
    /// Requested date length, in minutes.
    pub duration: u32,
    #[serde(default)]
    pub preferences: PreferencesPayload,
}

/// Joins the blind-date queue.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `caller` - The authenticated caller.
/// * `body` - The JSON `JoinPayload`.
///
/// # Returns
///
/// A `Result<Response>` with the session when a compatible partner was
/// already waiting, otherwise with the waiting ticket to poll on.
pub async fn join(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<Response> {
    let payload: JoinPayload = parse_body(&body)?;
    let policy = state.blind_date.policy();

    let request = JoinRequest {
        mood: parse_mood(&payload.mood)?,
        duration_seconds: validate_duration_minutes(payload.duration, policy)?,
        preferences: parse_preferences(
            payload.preferences.gender.as_deref(),
            payload.preferences.age_range.as_deref(),
        )?,
    };

    tracing::debug!("🎯 Join from {}: {:?}", caller.user_id, request);
    let status = state.blind_date.join(caller.user_id, request).await?;

    json(StatusCode::OK, &status)
}

/// Reports the caller's ticket or session.
pub async fn status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Response> {
    let status = state.blind_date.poll_status(caller.user_id).await?;
    json(StatusCode::OK, &status)
}

/// Leaves the queue. Succeeds even when the caller was not waiting.
pub async fn cancel(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Response> {
    let cancelled = state.blind_date.cancel(caller.user_id).await?;
    json(StatusCode::OK, &sonic_rs::json!({ "cancelled": cancelled }))
}
