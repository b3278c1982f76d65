use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use uuid::Uuid;

use crate::models::session::SessionState;

/// The application's error type.
///
/// Every variant is caller-recoverable and maps to a stable machine-readable
/// `kind` and `code` so clients can branch without parsing messages.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A pool construction error.
    #[error("Pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An unknown or expired ticket, session or envelope.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The addressed session does not exist (or was archived).
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// The caller already holds a waiting ticket or a live session.
    #[error("User is already queued or in a date")]
    AlreadyQueued,

    /// The caller is not a participant of the addressed session.
    #[error("Caller is not a participant of this session")]
    ParticipantMismatch,

    /// The decision round addressed has already been resolved.
    #[error("Decision round {0} is already resolved")]
    StaleRound(u32),

    /// The requested action is not allowed in the session's current state.
    #[error("Cannot {action} while session is {from:?}")]
    InvalidStateTransition {
        from: SessionState,
        action: &'static str,
    },

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// A column was missing or had an unexpected type.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The error family surfaced to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) | AppError::SessionNotFound(_) => "not_found",
            AppError::AlreadyQueued | AppError::ParticipantMismatch | AppError::StaleRound(_) => {
                "conflict"
            }
            AppError::InvalidStateTransition { .. } => "state_error",
            AppError::RateLimitExceeded(_) => "rate_limited",
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::CreatePool(_)
            | AppError::Redis(_)
            | AppError::MissingData(_)
            | AppError::Internal(_) => "internal",
        }
    }

    /// The precise error code within its family.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::SessionNotFound(_) => "session_not_found",
            AppError::AlreadyQueued => "already_queued",
            AppError::ParticipantMismatch => "participant_mismatch",
            AppError::StaleRound(_) => "stale_round",
            AppError::InvalidStateTransition { .. } => "invalid_state_transition",
            AppError::RateLimitExceeded(_) => "rate_limit_exceeded",
            _ => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self.kind() {
            "validation_error" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" | "state_error" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                "Database error".to_string()
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                "Database error".to_string()
            }

            AppError::CreatePool(ref e) => {
                tracing::error!("Pool creation error: {}", e);
                "Database error".to_string()
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                "Cache error".to_string()
            }

            AppError::MissingData(ref column) => {
                tracing::error!("Missing data in column: {}", column);
                "Internal server error".to_string()
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                self.to_string()
            }

            ref other => {
                tracing::debug!("Request rejected: {}", other);
                other.to_string()
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message,
            "kind": self.kind(),
            "code": self.code(),
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error","kind":"internal","code":"internal_error"}"#.to_string());

        (
            self.status(),
            [(http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_family_shares_a_kind() {
        assert_eq!(AppError::AlreadyQueued.kind(), "conflict");
        assert_eq!(AppError::ParticipantMismatch.kind(), "conflict");
        assert_eq!(AppError::StaleRound(2).kind(), "conflict");
        assert_eq!(AppError::StaleRound(2).code(), "stale_round");
    }

    #[test]
    fn state_errors_map_to_conflict_status() {
        let err = AppError::InvalidStateTransition {
            from: SessionState::Active,
            action: "submit a decision",
        };
        assert_eq!(err.kind(), "state_error");
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = AppError::SessionNotFound(Uuid::nil()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn full_mailboxes_answer_429() {
        let err = AppError::RateLimitExceeded("256 undelivered envelopes are already waiting".to_string());
        assert_eq!(err.code(), "rate_limit_exceeded");
        assert_eq!(err.into_response().status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
