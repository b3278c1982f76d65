use axum::{extract::State, http::StatusCode, response::Response};
use serde::Serialize;

use crate::{
    error::Result,
    response::json,
    services::blind_date::ServiceStats,
    state::AppState,
};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub stats: ServiceStats,
}

/// Liveness check with queue and session counters.
pub async fn health(State(state): State<AppState>) -> Result<Response> {
    let stats = state.blind_date.stats().await;
    json(StatusCode::OK, &HealthResponse { status: "ok", stats })
}
