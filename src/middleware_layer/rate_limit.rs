use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};

use crate::{
    error::AppError,
    models::profile::Caller,
    state::AppState,
};

/// Window of the join limiter, in seconds.
const JOIN_WINDOW_SECS: i64 = 60;

/// Opens the window (if none is running) and counts one attempt, atomically.
///
/// The window is armed by `SET NX EX` rather than a follow-up `EXPIRE`, so a
/// counter can never be left without a TTL.
fn count_attempt(key: &str) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("EX")
        .arg(JOIN_WINDOW_SECS)
        .arg("NX")
        .ignore()
        .cmd("INCR")
        .arg(key);
    pipe
}

/// A middleware that rate limits queue joins per caller.
///
/// Counts attempts in Redis; without Redis every request passes through.
pub async fn rate_limit_join(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(redis) = state.redis.as_ref() else {
        return next.run(req).await;
    };

    let key = format!("rate_limit:join:{}", caller.user_id);
    let limit = i64::from(state.config.join_rate_limit_per_minute);

    let attempts: Option<i64> = match count_attempt(&key)
        .query_async::<(i64,)>(&mut redis.clone())
        .await
    {
        Ok((attempts,)) => Some(attempts),
        Err(e) => {
            tracing::warn!("⚠️ Join rate limiter unavailable: {}", e);
            None
        }
    };

    if let Some(attempts) = attempts {
        if attempts > limit {
            let ttl: Option<i64> = redis::cmd("TTL")
                .arg(&key)
                .query_async(&mut redis.clone())
                .await
                .unwrap_or(None);

            return AppError::RateLimitExceeded(format!(
                "Too many join attempts. Try again in {} seconds",
                ttl.unwrap_or(JOIN_WINDOW_SECS).max(1)
            ))
            .into_response();
        }
    }

    next.run(req).await
}
