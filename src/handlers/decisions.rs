use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Extension,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::Result,
    models::profile::Caller,
    response::{json, parse_body},
    state::AppState,
    validation::blind_date::parse_choice,
};

/// The request payload for submitting an end-of-date choice.
#[derive(Deserialize, Debug)]
pub struct RevealPayload {
    pub session_id: Uuid,
    pub choice: String,
    /// The round the client believes is open; stale rounds are rejected.
    pub round: Option<u32>,
}

/// The request payload for actions that only address a session.
#[derive(Deserialize, Debug)]
pub struct SessionPayload {
    pub session_id: Uuid,
}

/// Records the caller's reveal, extend or end choice.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `caller` - The authenticated caller.
/// * `body` - The JSON `RevealPayload`.
///
/// # Returns
///
/// A `Result<Response>` with the round status and, once resolved, its outcome.
pub async fn reveal(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<Response> {
    let request: RevealPayload = parse_body(&body)?;
    let choice = parse_choice(&request.choice)?;

    let status = state
        .blind_date
        .submit_decision(request.session_id, caller.user_id, choice, request.round)
        .await?;

    json(StatusCode::OK, &status)
}

/// Ends the date now; the partner gets one decision round to respond.
pub async fn end(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<Response> {
    let request: SessionPayload = parse_body(&body)?;
    let status = state.blind_date.end_early(request.session_id, caller.user_id).await?;
    json(StatusCode::OK, &status)
}

/// Opens the decision round before the countdown runs out.
pub async fn decide(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<Response> {
    let request: SessionPayload = parse_body(&body)?;
    let view = state
        .blind_date
        .request_decision(request.session_id, caller.user_id)
        .await?;
    json(StatusCode::OK, &view)
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let view = state.blind_date.session_view(session_id, caller.user_id).await?;
    json(StatusCode::OK, &view)
}
