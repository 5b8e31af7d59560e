//! Development smoke path: book a session on the test number and push a
//! synthetic inbound SMS for it through the real ingestor.

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use otpline_core::{normalize_number, NewOtpSession, OtpStore, OtplineConfig, SessionStatus};
use serde_json::json;
use uuid::Uuid;

use super::ingest::{ingest_webhook, IngestOutcome};

pub const GENERIC_SERVICE_CODE: &str = "generic";
pub const GENERIC_SERVICE_NAME: &str = "Generic OTP";
pub const TEST_SENDER: &str = "+15551234567";
pub const TEST_TEXT: &str = "Direct test 777888 (with session)";
const TEST_SESSION_MINUTES: i64 = 20;

#[derive(Debug, Clone)]
pub struct TestInsertReport {
    pub session_id: Uuid,
    pub outcome: IngestOutcome,
}

pub async fn run_test_insert(store: &dyn OtpStore, config: &OtplineConfig) -> Result<TestInsertReport> {
    let service = store
        .ensure_service(GENERIC_SERVICE_CODE, GENERIC_SERVICE_NAME)
        .await?;

    let number = normalize_number(&config.dev.test_number)
        .ok_or_else(|| anyhow!("dev.test_number '{}' has no digits", config.dev.test_number))?;

    let now = Utc::now();
    let session = store
        .create_session(NewOtpSession {
            user_id: config.dev.test_user_id,
            service_id: service.id,
            country: config.dev.test_country.clone(),
            allocated_number: number.clone(),
            status: SessionStatus::Pending,
            created_at: now,
            expires_at: now + Duration::minutes(TEST_SESSION_MINUTES),
        })
        .await?;

    tracing::info!(session_id = %session.id, number = %number, "Test session created");

    let payload = json!({
        "id": format!("test-insert-{}", session.id),
        "source": "test-insert",
        "to": number,
        "from": TEST_SENDER,
        "text": TEST_TEXT,
    });
    let outcome = ingest_webhook(payload, store, &config.ingest).await?;

    Ok(TestInsertReport {
        session_id: session.id,
        outcome,
    })
}
