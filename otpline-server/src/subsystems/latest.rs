//! Latest-message read path for polling clients.

use chrono::{DateTime, Utc};
use otpline_core::{normalize_number, OtpError, OtpStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::resolver::resolve_for_display;

/// Query parameters accepted by `GET /otp/latest`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatestQuery {
    pub number: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// `{sessionId, code, message, at}`; every field is null until known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatestMessage {
    #[serde(rename = "sessionId")]
    pub session_id: Option<Uuid>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub at: Option<DateTime<Utc>>,
}

/// Which session the caller asked about, if any can be determined.
async fn pick_session(store: &dyn OtpStore, query: &LatestQuery) -> Result<Option<Uuid>, OtpError> {
    let explicit = query
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    // A malformed id is not echoed back: `sessionId` is typed, so the caller
    // gets the all-null body and no fallback to `number`.
    if let Some(raw) = explicit {
        return Ok(match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::debug!(session_id = %raw, "Ignoring malformed sessionId");
                None
            }
        });
    }

    let number = match query.number.as_deref().and_then(normalize_number) {
        Some(n) => n,
        None => return Ok(None),
    };

    Ok(resolve_for_display(store, &number).await?.map(|s| s.id))
}

pub async fn latest_message(
    store: &dyn OtpStore,
    query: &LatestQuery,
) -> Result<LatestMessage, OtpError> {
    let session_id = match pick_session(store, query).await? {
        Some(id) => id,
        None => return Ok(LatestMessage::default()),
    };

    let message = store.latest_message(session_id).await?;

    Ok(LatestMessage {
        session_id: Some(session_id),
        code: message.as_ref().and_then(|m| m.code.clone()),
        message: message.as_ref().map(|m| m.message_body.clone()),
        at: message.map(|m| m.received_at),
    })
}
