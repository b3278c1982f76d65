use axum::{
    body::Bytes,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{AppError, Result};

/// Serializes `body` with sonic-rs into a JSON response.
pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Response> {
    let body = sonic_rs::to_string(body)
        .map_err(|e| AppError::Internal(format!("Failed to encode response: {}", e)))?;

    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Parses a JSON request body with sonic-rs.
pub fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    sonic_rs::from_slice(body).map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))
}
