use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use blinddate::{
    clock::ManualClock,
    config::Config,
    repositories::session::MemorySessionStore,
    router,
    services::directory::AnonymousDirectory,
    services::notify::RecordingDispatch,
    state::AppState,
};
use chrono::{DateTime, Duration};
use http_body_util::BodyExt;
use sonic_rs::{JsonContainerTrait, JsonValueTrait, Value};
use tower::ServiceExt;
use uuid::Uuid;

// Shared test context
struct TestContext {
    app: Router,
    clock: Arc<ManualClock>,
}

impl TestContext {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap()));
        let state = AppState::in_memory(
            Config::default(),
            clock.clone(),
            Arc::new(MemorySessionStore::new()),
            Arc::new(AnonymousDirectory::new()),
            Arc::new(RecordingDispatch::new()),
        );
        Self {
            app: router::build(state),
            clock,
        }
    }

    async fn call(&self, method: Method, uri: &str, user: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            request = request.header("x-user-id", user.to_string());
        }
        let body = match body {
            Some(body) => Body::from(sonic_rs::to_string(&body).unwrap()),
            None => Body::empty(),
        };

        let response = self.app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = sonic_rs::from_slice(&bytes).unwrap_or_default();
        (status, json)
    }

    async fn join(&self, user: Uuid, duration: u32) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/blinddate/match",
                Some(user),
                Some(sonic_rs::json!({
                    "mood": "chill",
                    "duration": duration,
                    "preferences": {"gender": "any", "ageRange": "any"}
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "join failed: {:?}", body);
        body
    }
}

fn session_id(body: &Value) -> String {
    body["session"]["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_is_public() {
    let context = TestContext::new();
    let (status, body) = context.call(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"].as_str(), Some("ok"));
    assert_eq!(body["stats"]["sessions"].as_u64(), Some(0));
}

#[tokio::test]
async fn test_requests_without_caller_are_forbidden() {
    let context = TestContext::new();
    let (status, _) = context.call(Method::GET, "/api/blinddate/status", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_match_signal_and_reveal_over_http() {
    let context = TestContext::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());

    // Step 1: Matching
    let first = context.join(u1, 10).await;
    assert_eq!(first["matched"].as_bool(), Some(false));
    assert!(first["ticket_id"].as_str().is_some());

    let second = context.join(u2, 15).await;
    assert_eq!(second["matched"].as_bool(), Some(true));
    assert_eq!(second["session"]["duration_seconds"].as_u64(), Some(600));
    assert_eq!(second["session"]["state"].as_str(), Some("active"));
    assert!(second["session"]["partner_user_id"].is_null());
    let session = session_id(&second);

    let (status, polled) = context.call(Method::GET, "/api/blinddate/status", Some(u1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session_id(&polled), session);

    // Step 2: Signaling
    let (status, sent) = context
        .call(
            Method::POST,
            "/api/blinddate/signal",
            Some(u1),
            Some(sonic_rs::json!({
                "session_id": session.as_str(),
                "kind": "offer",
                "payload": {"type": "offer", "sdp": "v=0"}
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["queued"].as_bool(), Some(true));

    let uri = format!("/api/blinddate/signal?session_id={}", session);
    let (status, inbox) = context.call(Method::GET, &uri, Some(u2), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox["envelopes"].as_array().map(|envelopes| envelopes.len()), Some(1));
    assert_eq!(inbox["envelopes"][0]["kind"].as_str(), Some("offer"));
    assert_eq!(inbox["envelopes"][0]["payload"]["sdp"].as_str(), Some("v=0"));

    // Step 3: Decision
    context.clock.advance(Duration::seconds(600));
    for user in [u1, u2] {
        let (status, _) = context
            .call(
                Method::POST,
                "/api/blinddate/reveal",
                Some(user),
                Some(sonic_rs::json!({"session_id": session.as_str(), "choice": "reveal"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let uri = format!("/api/blinddate/sessions/{}", session);
    let (status, view) = context.call(Method::GET, &uri, Some(u1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["state"].as_str(), Some("concluded"));
    assert_eq!(view["outcome"].as_str(), Some("MUTUAL_REVEAL"));
    assert_eq!(view["partner_user_id"].as_str(), Some(u2.to_string().as_str()));
}

#[tokio::test]
async fn test_invalid_mood_is_a_validation_error() {
    let context = TestContext::new();
    let (status, body) = context
        .call(
            Method::POST,
            "/api/blinddate/match",
            Some(Uuid::new_v4()),
            Some(sonic_rs::json!({"mood": "grumpy", "duration": 10})),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"].as_str(), Some("validation_error"));
}

#[tokio::test]
async fn test_conflicts_and_state_errors_carry_their_kind() {
    let context = TestContext::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    context.join(u1, 10).await;

    let (status, body) = context
        .call(
            Method::POST,
            "/api/blinddate/match",
            Some(u1),
            Some(sonic_rs::json!({"mood": "chill", "duration": 10})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"].as_str(), Some("already_queued"));

    let session = session_id(&context.join(u2, 10).await);
    let (status, body) = context
        .call(
            Method::POST,
            "/api/blinddate/reveal",
            Some(u1),
            Some(sonic_rs::json!({"session_id": session.as_str(), "choice": "reveal"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"].as_str(), Some("state_error"));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let context = TestContext::new();
    let uri = format!("/api/blinddate/sessions/{}", Uuid::new_v4());
    let (status, body) = context.call(Method::GET, &uri, Some(Uuid::new_v4()), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"].as_str(), Some("session_not_found"));
}

#[tokio::test]
async fn test_cancel_and_end_early_over_http() {
    let context = TestContext::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());

    let (status, body) = context.call(Method::POST, "/api/blinddate/cancel", Some(u1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"].as_bool(), Some(false));

    context.join(u1, 10).await;
    let session = session_id(&context.join(u2, 10).await);

    let (status, body) = context
        .call(
            Method::POST,
            "/api/blinddate/end",
            Some(u2),
            Some(sonic_rs::json!({"session_id": session.as_str()})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolved"].as_bool(), Some(false));
    assert_eq!(body["session"]["state"].as_str(), Some("deciding"));
    assert_eq!(body["session"]["my_choice"].as_str(), Some("end"));
}
