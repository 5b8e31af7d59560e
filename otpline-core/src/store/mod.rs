//! Persistence for sessions, messages and services.
//!
//! Available backends:
//! - `PgStore` - PostgreSQL via sqlx (production)
//! - `MemoryStore` - in-process maps (tests and local development)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{NewOtpMessage, NewOtpSession, OtpMessage, OtpService, OtpSession, SessionStatus};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result of a message insert guarded by the dedupe key.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Inserted(OtpMessage),
    /// A row with the same dedupe key already existed; it is returned unchanged.
    Duplicate(OtpMessage),
}

impl RecordOutcome {
    pub fn message(&self) -> &OtpMessage {
        match self {
            RecordOutcome::Inserted(m) | RecordOutcome::Duplicate(m) => m,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, RecordOutcome::Duplicate(_))
    }
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Backend description for health output.
    async fn health(&self) -> Result<String>;

    async fn find_session(&self, id: Uuid) -> Result<Option<OtpSession>>;

    /// Newest session on `number` that is active and expires strictly after `at`.
    /// Ties on `created_at` go to the greatest id.
    async fn find_active_session(
        &self,
        number: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<OtpSession>>;

    /// Newest pending/allocated/completed session on `number`, regardless of expiry.
    async fn find_display_session(&self, number: &str) -> Result<Option<OtpSession>>;

    /// Compare-and-set on session status. Returns `false` when the stored
    /// status no longer equals `expected` (or the session is gone).
    async fn transition_status(
        &self,
        id: Uuid,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> Result<bool>;

    async fn insert_message(&self, message: NewOtpMessage) -> Result<RecordOutcome>;

    /// Newest message linked to `session_id` by `received_at`.
    async fn latest_message(&self, session_id: Uuid) -> Result<Option<OtpMessage>>;

    async fn create_session(&self, session: NewOtpSession) -> Result<OtpSession>;

    /// Look up a service by code, inserting it on first use.
    async fn ensure_service(&self, code: &str, name: &str) -> Result<OtpService>;

    /// Store `expired` on active sessions whose `expires_at` is not after `now`.
    async fn expire_stale_sessions(&self, now: DateTime<Utc>) -> Result<u64>;
}

pub(crate) fn status_strings(statuses: &[SessionStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}
