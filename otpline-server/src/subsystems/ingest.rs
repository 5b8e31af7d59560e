//! Webhook ingestor: parse → normalize → resolve → extract → record → complete.
//!
//! Structural problems with the payload are acknowledged as skips so the
//! provider never retries them. Storage failures propagate as errors so the
//! provider's at-least-once retry redelivers the event.

use chrono::{DateTime, Utc};
use otpline_core::config::IngestConfig;
use otpline_core::webhook::{parse_inbound, ParseOutcome, SkipReason};
use otpline_core::{extract_code, normalize_number, OtpError, OtpStore, RecordOutcome};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::recorder::{record_message, Recording};
use super::resolver::resolve_for_ingest;
use super::transition::{complete_session, Transition};

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub message_id: Uuid,
    pub session_id: Option<Uuid>,
    pub code: Option<String>,
    pub duplicate: bool,
    pub transition: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Skipped(SkipReason),
    Recorded(IngestReport),
}

impl IngestOutcome {
    /// Body returned to the provider.
    pub fn ack(&self) -> Value {
        match self {
            IngestOutcome::Skipped(reason) => serde_json::json!({"ok": true, "skip": reason.as_str()}),
            IngestOutcome::Recorded(_) => serde_json::json!({"ok": true}),
        }
    }

    /// Full outcome for local callers (IPC, tests).
    pub fn details(&self) -> Value {
        match self {
            IngestOutcome::Skipped(reason) => serde_json::json!({"ok": true, "skip": reason.as_str()}),
            IngestOutcome::Recorded(report) => {
                let mut v = serde_json::to_value(report).unwrap_or_else(|_| serde_json::json!({}));
                if let Some(obj) = v.as_object_mut() {
                    obj.insert("ok".to_string(), Value::Bool(true));
                }
                v
            }
        }
    }
}

pub async fn ingest_webhook(
    payload: Value,
    store: &dyn OtpStore,
    config: &IngestConfig,
) -> Result<IngestOutcome, OtpError> {
    ingest_webhook_at(payload, store, config, Utc::now()).await
}

/// Ingest with an explicit receive time (the resolver's reference timestamp).
pub async fn ingest_webhook_at(
    payload: Value,
    store: &dyn OtpStore,
    config: &IngestConfig,
    received_at: DateTime<Utc>,
) -> Result<IngestOutcome, OtpError> {
    let sms = match parse_inbound(&payload) {
        ParseOutcome::Parsed(sms) => sms,
        ParseOutcome::Skip(reason) => {
            tracing::info!(reason = reason.as_str(), "Webhook skipped");
            return Ok(IngestOutcome::Skipped(reason));
        }
    };

    // A destination without digits can never match a session; the message is
    // still recorded, unlinked, under the raw value.
    let normalized = normalize_number(&sms.to);
    let session = match &normalized {
        Some(n) => resolve_for_ingest(store, n, received_at).await?,
        None => {
            tracing::info!(raw_to = %sms.to, "Destination has no digits, recording unlinked");
            None
        }
    };
    let to = normalized.unwrap_or_else(|| sms.to.clone());

    let code = extract_code(&sms.text);
    if code.is_none() {
        tracing::debug!(to = %to, "No verification code found in message text");
    }

    let outcome = record_message(
        store,
        Recording {
            sms: &sms,
            normalized_to: &to,
            session_id: session.as_ref().map(|s| s.id),
            code,
            provider_payload: &payload,
            received_at,
        },
        config.dedupe_window_seconds,
    )
    .await?;

    // On a redelivery the stored row is authoritative; re-attempting the
    // transition lets an earlier attempt that failed after the insert converge.
    let duplicate = outcome.is_duplicate();
    let message = match outcome {
        RecordOutcome::Inserted(m) | RecordOutcome::Duplicate(m) => m,
    };

    let transition = match (message.session_id, &message.code) {
        (Some(session_id), Some(_)) => Some(complete_session(store, session_id, config).await?),
        _ => None,
    };

    Ok(IngestOutcome::Recorded(IngestReport {
        message_id: message.id,
        session_id: message.session_id,
        code: message.code,
        duplicate,
        transition: transition.as_ref().map(Transition::as_str),
    }))
}
