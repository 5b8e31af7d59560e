//! Message recorder — one `otp_messages` row per provider event.
//!
//! Correlation misses are recorded with a null session id. Redeliveries map
//! onto the existing row through the dedupe key and are reported, not failed.

use chrono::{DateTime, Utc};
use otpline_core::dedupe::dedupe_key;
use otpline_core::{InboundSms, NewOtpMessage, OtpError, OtpStore, RecordOutcome};
use serde_json::Value;
use uuid::Uuid;

/// Everything known about an inbound event at persistence time.
pub struct Recording<'a> {
    pub sms: &'a InboundSms,
    pub normalized_to: &'a str,
    pub session_id: Option<Uuid>,
    pub code: Option<String>,
    pub provider_payload: &'a Value,
    pub received_at: DateTime<Utc>,
}

pub async fn record_message(
    store: &dyn OtpStore,
    recording: Recording<'_>,
    dedupe_window_seconds: u64,
) -> Result<RecordOutcome, OtpError> {
    let key = dedupe_key(
        recording.sms,
        recording.normalized_to,
        recording.received_at,
        dedupe_window_seconds,
    );

    let outcome = store
        .insert_message(NewOtpMessage {
            session_id: recording.session_id,
            from_number: recording.sms.from.clone(),
            to_number: recording.normalized_to.to_string(),
            message_body: recording.sms.text.clone(),
            code: recording.code,
            provider_payload: recording.provider_payload.clone(),
            dedupe_key: key,
            received_at: recording.received_at,
        })
        .await?;

    let message = outcome.message();
    if outcome.is_duplicate() {
        tracing::info!(
            message_id = %message.id,
            dedupe_key = %message.dedupe_key,
            "Duplicate delivery, keeping stored message"
        );
    } else {
        tracing::info!(
            message_id = %message.id,
            to = %message.to_number,
            linked = message.session_id.is_some(),
            has_code = message.code.is_some(),
            "Recorded inbound message"
        );
    }

    Ok(outcome)
}
