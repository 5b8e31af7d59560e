use crate::subsystems::{ingest, latest, sweep};
use otpline_core::ipc::{OtpRequest, OtpResponse};
use otpline_core::{OtpStore, OtplineConfig};

/// Dispatch one IPC request. HTTP handlers route through here as well.
pub async fn handle_request(
    request: OtpRequest,
    store: &dyn OtpStore,
    config: &OtplineConfig,
) -> OtpResponse {
    match request {
        OtpRequest::Ping => OtpResponse::pong(),
        OtpRequest::Health => match store.health().await {
            Ok(backend) => OtpResponse::ok(serde_json::json!({
                "store": backend,
                "status": "healthy"
            })),
            Err(e) => OtpResponse::err(format!("Store health check failed: {}", e)),
        },
        OtpRequest::Ingest { payload } => {
            match ingest::ingest_webhook(payload, store, &config.ingest).await {
                Ok(outcome) => OtpResponse::ok(outcome.details()),
                Err(e) => {
                    tracing::error!(error = %e, "Ingest failed");
                    OtpResponse::err(e.to_string())
                }
            }
        }
        OtpRequest::Latest { number, session_id } => {
            let query = latest::LatestQuery { number, session_id };
            match latest::latest_message(store, &query).await {
                Ok(msg) => match serde_json::to_value(msg) {
                    Ok(v) => OtpResponse::ok(v),
                    Err(e) => OtpResponse::err(e.to_string()),
                },
                Err(e) => {
                    tracing::error!(error = %e, "Latest-message lookup failed");
                    OtpResponse::err(e.to_string())
                }
            }
        }
        OtpRequest::Sweep => match sweep::run_expiry_sweep(store).await {
            Ok(report) => OtpResponse::ok(serde_json::json!({
                "sessions_expired": report.sessions_expired,
                "elapsed_ms": report.elapsed_ms,
            })),
            Err(e) => OtpResponse::err(e.to_string()),
        },
    }
}
