use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OtpMessage {
    pub id: Uuid,
    pub session_id: Option<Uuid>,
    pub from_number: Option<String>,
    pub to_number: String,
    pub message_body: String,
    pub code: Option<String>,
    pub provider_payload: serde_json::Value,
    pub dedupe_key: String,
    pub received_at: DateTime<Utc>,
}

/// Insert shape for `otp_messages`. Rows are never updated once written.
#[derive(Debug, Clone)]
pub struct NewOtpMessage {
    pub session_id: Option<Uuid>,
    pub from_number: Option<String>,
    pub to_number: String,
    pub message_body: String,
    pub code: Option<String>,
    pub provider_payload: serde_json::Value,
    pub dedupe_key: String,
    pub received_at: DateTime<Utc>,
}
