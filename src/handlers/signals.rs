use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::Response,
    Extension,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Result,
    models::profile::Caller,
    models::signal::SignalEnvelope,
    response::{json, parse_body},
    services::relay::SendReceipt,
    state::AppState,
    validation::blind_date::{parse_signal_kind, validate_payload},
};

/// The request payload for relaying a negotiation message.
#[derive(Deserialize, Debug)]
pub struct SendSignalPayload {
    pub session_id: Uuid,
    pub kind: String,
    pub payload: sonic_rs::Value,
}

#[derive(Deserialize, Debug)]
pub struct DrainQuery {
    pub session_id: Uuid,
}

#[derive(Serialize)]
pub struct DrainResponse {
    pub envelopes: Vec<SignalEnvelope>,
}

/// Queues a negotiation message for the caller's partner.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `caller` - The authenticated caller.
/// * `body` - The JSON `SendSignalPayload`.
///
/// # Returns
///
/// A `Result<Response>` with `queued` and the envelope's sequence number,
/// or `queued: false` once the date is over.
pub async fn send(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<Response> {
    let request: SendSignalPayload = parse_body(&body)?;
    let kind = parse_signal_kind(&request.kind)?;
    validate_payload(&request.payload, state.blind_date.policy())?;

    let receipt = state
        .blind_date
        .send_signal(request.session_id, caller.user_id, kind, request.payload)
        .await?;

    let response = match receipt {
        SendReceipt::Queued { seq, .. } => sonic_rs::json!({ "queued": true, "seq": seq }),
        SendReceipt::Inert => sonic_rs::json!({ "queued": false }),
    };

    json(StatusCode::OK, &response)
}

/// Returns every message waiting for the caller, oldest first.
pub async fn drain(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<DrainQuery>,
) -> Result<Response> {
    let envelopes = state
        .blind_date
        .drain_signals(query.session_id, caller.user_id)
        .await?;

    json(StatusCode::OK, &DrainResponse { envelopes })
}
