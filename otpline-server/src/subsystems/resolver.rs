//! Session resolution for inbound messages and polling reads.
//!
//! Numbers are recycled across sessions, so the two paths use different
//! policies:
//! - ingestion: active status AND `expires_at` strictly after the event time,
//!   newest `created_at` first. A stale session must never absorb a new code.
//! - display: pending/allocated/completed with no time filter, newest first,
//!   so a client can still read a code after the nominal expiry.
//!
//! Ties on `created_at` break on the greater session id in both paths.

use chrono::{DateTime, Utc};
use otpline_core::{OtpError, OtpSession, OtpStore};

/// Session an inbound message received at `at` on `number` belongs to, if any.
pub async fn resolve_for_ingest(
    store: &dyn OtpStore,
    number: &str,
    at: DateTime<Utc>,
) -> Result<Option<OtpSession>, OtpError> {
    let session = store.find_active_session(number, at).await?;
    match &session {
        Some(s) => tracing::debug!(to = %number, session_id = %s.id, "Resolved inbound message"),
        None => tracing::info!(to = %number, "No active session for inbound message"),
    }
    Ok(session)
}

/// Session a polling client asking about `number` should see.
pub async fn resolve_for_display(
    store: &dyn OtpStore,
    number: &str,
) -> Result<Option<OtpSession>, OtpError> {
    store.find_display_session(number).await
}
