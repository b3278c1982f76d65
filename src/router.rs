use axum::{
    Router,
    routing::{get, post},
    middleware::{from_fn, from_fn_with_state},
    extract::DefaultBodyLimit,
};

use http::{HeaderName, HeaderValue, Method, header};
use std::time::Duration;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    trace::{TraceLayer, DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, DefaultOnFailure},
    cors::{AllowOrigin, CorsLayer},
};
use tracing::Level;

use crate::{
    handlers,
    middleware_layer::{self, auth::CALLER_HEADER},
    state::AppState,
};

/// Request bodies never need more than a signaling payload plus its envelope.
const BODY_LIMIT_SLACK: usize = 4 * 1024;

fn cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("⚠️ Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(CALLER_HEADER),
        ])
        .max_age(Duration::from_secs(86400))
}

/// Builds the HTTP application.
pub fn build(state: AppState) -> Router {
    let join_routes = Router::new()
        .route("/api/blinddate/match", post(handlers::matching::join))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_join,
        ))
        .route_layer(from_fn(middleware_layer::auth::require_caller))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/blinddate/status", get(handlers::matching::status))
        .route("/api/blinddate/cancel", post(handlers::matching::cancel))
        .route(
            "/api/blinddate/signal",
            post(handlers::signals::send).get(handlers::signals::drain),
        )
        .route("/api/blinddate/reveal", post(handlers::decisions::reveal))
        .route("/api/blinddate/end", post(handlers::decisions::end))
        .route("/api/blinddate/decide", post(handlers::decisions::decide))
        .route(
            "/api/blinddate/sessions/{session_id}",
            get(handlers::decisions::get_session),
        )
        .route_layer(from_fn(middleware_layer::auth::require_caller))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .with_state(state.clone());

    let body_limit = state.config.policy.max_signal_payload_bytes + BODY_LIMIT_SLACK;

    Router::new()
        .merge(join_routes)
        .merge(protected_routes)
        .merge(public_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(ConcurrencyLimitLayer::new(state.config.max_concurrent_requests))
        .layer(cors(&state.config.cors_allowed_origins))
}
