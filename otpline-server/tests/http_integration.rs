//! HTTP integration tests for the otpline API
//!
//! Full end-to-end handler dispatch through the Axum router with `oneshot`,
//! backed by the in-memory store so no database is required.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use otpline_core::{MemoryStore, NewOtpSession, OtpStore, OtplineConfig, SessionStatus};
use otpline_server::http::{build_router, HttpState, WEBHOOK_PATH};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const NUMBER: &str = "+14243800358";

fn make_state(config: OtplineConfig) -> (Arc<MemoryStore>, Arc<HttpState>) {
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(HttpState {
        store: store.clone(),
        config,
    });
    (store, state)
}

async fn pending_session(store: &MemoryStore, number: &str) -> Uuid {
    let now = Utc::now();
    store
        .create_session(NewOtpSession {
            user_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            country: "US".to_string(),
            allocated_number: number.to_string(),
            status: SessionStatus::Pending,
            created_at: now - Duration::minutes(1),
            expires_at: now + Duration::minutes(20),
        })
        .await
        .unwrap()
        .id
}

async fn send(state: Arc<HttpState>, req: Request<Body>) -> (StatusCode, Value) {
    let resp = build_router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_webhook(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// ===========================================================================
// TEST 1: GET /health and /version
// ===========================================================================
#[tokio::test]
async fn test_health_and_version() {
    let (_store, state) = make_state(OtplineConfig::for_memory());

    let (status, body) = send(state.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");

    let (status, body) = send(state, get("/version")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());
}

// ===========================================================================
// TEST 2: GET on the webhook path is a liveness probe
// ===========================================================================
#[tokio::test]
async fn test_webhook_get_liveness() {
    let (_store, state) = make_state(OtplineConfig::for_memory());
    let (status, body) = send(state, get(WEBHOOK_PATH)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "method": "GET"}));
}

// ===========================================================================
// TEST 3: Payload without destination is acknowledged and persists nothing
// ===========================================================================
#[tokio::test]
async fn test_webhook_structural_skip() {
    let (store, state) = make_state(OtplineConfig::for_memory());
    let (status, body) = send(
        state,
        post_webhook(json!({"data": {"payload": {"text": "code 1234"}}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "skip": "no to/text"}));
    assert_eq!(store.message_count().await, 0);
}

// ===========================================================================
// TEST 4: Provider envelope → linked message, completed session, readable code
// ===========================================================================
#[tokio::test]
async fn test_webhook_then_latest_end_to_end() {
    let (store, state) = make_state(OtplineConfig::for_memory());
    let sid = pending_session(&store, NUMBER).await;

    let (status, body) = send(
        state.clone(),
        post_webhook(json!({
            "data": {
                "event_type": "message.received",
                "payload": {
                    "id": "msg-001",
                    "to": [{"phone_number": "+1 (424) 380-0358"}],
                    "from": {"phone_number": "+15551234567"},
                    "text": "Your verification code is 842916"
                }
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));

    let session = store.find_session(sid).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);

    let (status, body) = send(state.clone(), get(&format!("/otp/latest?sessionId={}", sid))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionId"], sid.to_string());
    assert_eq!(body["code"], "842916");
    assert_eq!(body["message"], "Your verification code is 842916");
    assert!(body["at"].is_string());

    // Same answer via the number, in any formatting.
    let (status, body) = send(state, get("/otp/latest?number=14243800358")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionId"], sid.to_string());
    assert_eq!(body["code"], "842916");
}

// ===========================================================================
// TEST 5: Unknown number and malformed session id yield all-null bodies
// ===========================================================================
#[tokio::test]
async fn test_latest_not_found_is_all_null() {
    let (_store, state) = make_state(OtplineConfig::for_memory());
    let expected = json!({"sessionId": null, "code": null, "message": null, "at": null});

    for uri in [
        "/otp/latest?number=%2B19999999999",
        "/otp/latest?sessionId=not-a-uuid",
        "/otp/latest",
    ] {
        let (status, body) = send(state.clone(), get(uri)).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert_eq!(body, expected, "{}", uri);
    }
}

// ===========================================================================
// TEST 6: Storage failure surfaces as 500 so the provider retries
// ===========================================================================
#[tokio::test]
async fn test_storage_failure_returns_500() {
    let (store, state) = make_state(OtplineConfig::for_memory());
    store.set_unavailable(true);

    let (status, body) = send(
        state.clone(),
        post_webhook(json!({"to": NUMBER, "text": "code 1234"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());

    let (status, body) = send(state, get("/otp/latest?number=%2B14243800358")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
}

// ===========================================================================
// TEST 7: Redelivery of the same provider event stores one row
// ===========================================================================
#[tokio::test]
async fn test_webhook_redelivery_is_idempotent() {
    let (store, state) = make_state(OtplineConfig::for_memory());
    pending_session(&store, NUMBER).await;

    let event = json!({"data": {"id": "evt-1", "payload": {"to": NUMBER, "text": "code 5512"}}});
    for _ in 0..3 {
        let (status, _) = send(state.clone(), post_webhook(event.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(store.message_count().await, 1);
    assert_eq!(store.status_writes(), 1);
}

// ===========================================================================
// TEST 8: Dev test-insert route is absent by default
// ===========================================================================
#[tokio::test]
async fn test_test_insert_disabled_by_default() {
    let (_store, state) = make_state(OtplineConfig::for_memory());
    let resp = build_router(state)
        .oneshot(get("/otp/test-insert"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ===========================================================================
// TEST 9: Dev test-insert books a session and its code becomes readable
// ===========================================================================
#[tokio::test]
async fn test_test_insert_smoke_path() {
    let mut config = OtplineConfig::for_memory();
    config.dev.enable_test_routes = true;
    let (store, state) = make_state(config);

    let (status, body) = send(state.clone(), get("/otp/test-insert")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    let sid: Uuid = body["sessionId"].as_str().unwrap().parse().unwrap();

    let session = store.find_session(sid).await.unwrap().unwrap();
    assert_eq!(session.allocated_number, NUMBER);
    assert_eq!(session.status, SessionStatus::Completed);

    let (_, latest) = send(state, get(&format!("/otp/latest?sessionId={}", sid))).await;
    assert_eq!(latest["code"], "777888");
    assert_eq!(latest["message"], "Direct test 777888 (with session)");
}
