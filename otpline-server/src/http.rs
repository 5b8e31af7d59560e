//! otpline HTTP API
//!
//! Axum server for the provider webhook and the polling read path. Runs
//! alongside the Unix socket IPC server.
//!
//! Each endpoint has a thin axum handler delegating to an inner function that
//! returns `(StatusCode, Value)` and can be called directly from tests.
//!
//! Endpoints:
//! - POST /webhooks/telnyx/sms — inbound SMS event
//! - GET  /webhooks/telnyx/sms — liveness
//! - GET  /otp/latest          — newest code for `sessionId` or `number`
//! - GET  /otp/test-insert     — dev smoke path (only with `dev.enable_test_routes`)
//! - GET  /health, GET /version

use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use otpline_core::ipc::{OtpRequest, OtpResponse};
use otpline_core::webhook::SkipReason;
use otpline_core::{OtpStore, OtplineConfig};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::subsystems::ingest::{self, IngestOutcome};
use crate::subsystems::latest::LatestQuery;
use crate::subsystems::provision;

pub const WEBHOOK_PATH: &str = "/webhooks/telnyx/sms";

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn OtpStore>,
    pub config: OtplineConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route(WEBHOOK_PATH, get(webhook_ping_handler).post(webhook_handler))
        .route("/otp/latest", get(latest_handler));

    if state.config.dev.enable_test_routes {
        tracing::warn!("Dev test routes enabled: GET /otp/test-insert");
        router = router.route("/otp/test-insert", get(test_insert_handler));
    }

    router.with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    store: Arc<dyn OtpStore>,
    config: OtplineConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState { store, config });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("otpline HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

fn error_body(msg: impl Into<String>) -> Value {
    json!({ "error": msg.into() })
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub async fn health_inner(store: &dyn OtpStore) -> (StatusCode, Value) {
    match store.health().await {
        Ok(backend) => (
            StatusCode::OK,
            json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": backend,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "otpline",
    })
}

/// Webhook ingestion. Always 200 unless storage failed, so the provider
/// retries only events that can actually succeed later.
pub async fn webhook_inner(state: &HttpState, body: &[u8]) -> (StatusCode, Value) {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::info!(error = %e, "Webhook body is not JSON, skipping");
            return (
                StatusCode::OK,
                IngestOutcome::Skipped(SkipReason::Unrecognized).ack(),
            );
        }
    };

    match ingest::ingest_webhook(payload, state.store.as_ref(), &state.config.ingest).await {
        Ok(outcome) => (StatusCode::OK, outcome.ack()),
        Err(e) => {
            tracing::error!(error = %e, "telnyx webhook error");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string()))
        }
    }
}

pub fn webhook_ping_inner() -> Value {
    json!({ "ok": true, "method": "GET" })
}

pub async fn latest_inner(state: &HttpState, query: LatestQuery) -> (StatusCode, Value) {
    let request = OtpRequest::Latest {
        number: query.number,
        session_id: query.session_id,
    };
    let response =
        crate::router::handle_request(request, state.store.as_ref(), &state.config).await;

    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
    }
}

pub async fn test_insert_inner(state: &HttpState) -> (StatusCode, Value) {
    match provision::run_test_insert(state.store.as_ref(), &state.config).await {
        Ok(report) => (
            StatusCode::OK,
            json!({ "ok": true, "sessionId": report.session_id }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "ok": false, "error": e.to_string() }),
        ),
    }
}

// ============================================================================
// Axum handler wrappers
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(state.store.as_ref()).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn webhook_handler(State(state): State<Arc<HttpState>>, body: Bytes) -> impl IntoResponse {
    let (status, body) = webhook_inner(&state, &body).await;
    (status, Json(body))
}

pub async fn webhook_ping_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(webhook_ping_inner()))
}

pub async fn latest_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<LatestQuery>,
) -> impl IntoResponse {
    let (status, body) = latest_inner(&state, query).await;
    (status, Json(body))
}

pub async fn test_insert_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = test_insert_inner(&state).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert an IPC `OtpResponse` into an HTTP body value, or an error string.
pub fn response_to_http(response: OtpResponse) -> std::result::Result<Value, String> {
    if response.is_ok() {
        Ok(response.data.unwrap_or_else(|| json!({})))
    } else {
        Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
    }
}
