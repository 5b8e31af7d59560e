//! Session state machine — the only writer of `completed`.
//!
//! `pending → allocated → completed`. Completion is an optimistic
//! compare-and-set against the status read just before it; when another
//! writer moves the session in between, the read is repeated and the write
//! retried with backoff. A session that is no longer active makes the
//! transition a no-op, so duplicate or racing deliveries complete it once.

use std::time::Duration;

use otpline_core::config::IngestConfig;
use otpline_core::{OtpError, OtpStore, SessionStatus};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// This call moved the session to `completed`.
    Completed,
    /// The session was already outside {pending, allocated}; nothing written.
    AlreadyTerminal(SessionStatus),
    /// No session with that id exists.
    Missing,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Completed => "completed",
            Transition::AlreadyTerminal(_) => "already_terminal",
            Transition::Missing => "missing",
        }
    }
}

async fn try_complete(store: &dyn OtpStore, session_id: Uuid) -> Result<Transition, OtpError> {
    let session = match store.find_session(session_id).await? {
        Some(s) => s,
        None => return Ok(Transition::Missing),
    };

    if !session.status.is_active() {
        return Ok(Transition::AlreadyTerminal(session.status));
    }

    if store
        .transition_status(session_id, session.status, SessionStatus::Completed)
        .await?
    {
        Ok(Transition::Completed)
    } else {
        Err(OtpError::Conflict(session_id))
    }
}

/// Move `session_id` to `completed` if it is still active.
pub async fn complete_session(
    store: &dyn OtpStore,
    session_id: Uuid,
    config: &IngestConfig,
) -> Result<Transition, OtpError> {
    let strategy = ExponentialBackoff::from_millis(config.transition_retry_delay_ms.max(1))
        .max_delay(Duration::from_millis(500))
        .map(jitter)
        .take(config.transition_max_retries);

    let result = RetryIf::spawn(
        strategy,
        || try_complete(store, session_id),
        |e: &OtpError| matches!(e, OtpError::Conflict(_)),
    )
    .await;

    match &result {
        Ok(Transition::Completed) => {
            tracing::info!(session_id = %session_id, "Session completed");
        }
        Ok(Transition::AlreadyTerminal(status)) => {
            tracing::debug!(session_id = %session_id, status = %status, "Session already terminal, transition skipped");
        }
        Ok(Transition::Missing) => {
            tracing::warn!(session_id = %session_id, "Session vanished before completion");
        }
        Err(OtpError::Conflict(_)) => {
            tracing::error!(
                session_id = %session_id,
                attempts = config.transition_max_retries + 1,
                "Session status kept changing, giving up on completion"
            );
        }
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "Session completion failed");
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use otpline_core::{
        MemoryStore, NewOtpMessage, NewOtpSession, OtpMessage, OtpService, OtpSession,
        RecordOutcome,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config() -> IngestConfig {
        IngestConfig {
            dedupe_window_seconds: 300,
            transition_max_retries: 3,
            transition_retry_delay_ms: 1,
        }
    }

    async fn seed(store: &MemoryStore, status: SessionStatus) -> Uuid {
        let now = Utc::now();
        store
            .create_session(NewOtpSession {
                user_id: Uuid::new_v4(),
                service_id: Uuid::new_v4(),
                country: "US".to_string(),
                allocated_number: "+14243800358".to_string(),
                status,
                created_at: now,
                expires_at: now + ChronoDuration::minutes(20),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_pending_and_allocated_complete() {
        let store = MemoryStore::new();
        for status in SessionStatus::ACTIVE {
            let id = seed(&store, status).await;
            assert_eq!(
                complete_session(&store, id, &config()).await.unwrap(),
                Transition::Completed
            );
            let s = store.find_session(id).await.unwrap().unwrap();
            assert_eq!(s.status, SessionStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_terminal_sessions_are_untouched() {
        let store = MemoryStore::new();
        for status in [
            SessionStatus::Completed,
            SessionStatus::Cancelled,
            SessionStatus::Expired,
        ] {
            let id = seed(&store, status).await;
            assert_eq!(
                complete_session(&store, id, &config()).await.unwrap(),
                Transition::AlreadyTerminal(status)
            );
        }
        assert_eq!(store.status_writes(), 0);
    }

    #[tokio::test]
    async fn test_missing_session() {
        let store = MemoryStore::new();
        assert_eq!(
            complete_session(&store, Uuid::new_v4(), &config()).await.unwrap(),
            Transition::Missing
        );
    }

    #[tokio::test]
    async fn test_concurrent_completions_write_once() {
        let store = Arc::new(MemoryStore::new());
        let id = seed(&store, SessionStatus::Pending).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                complete_session(store.as_ref(), id, &config()).await.unwrap()
            }));
        }

        let mut completed = 0;
        for h in handles {
            if h.await.unwrap() == Transition::Completed {
                completed += 1;
            }
        }
        assert_eq!(completed, 1);
        assert_eq!(store.status_writes(), 1);
    }

    /// Store whose session moves `pending → allocated` behind the reader's back
    /// on the first compare-and-set, forcing one lost race.
    struct RacingStore {
        inner: MemoryStore,
        races_left: AtomicUsize,
    }

    #[async_trait]
    impl OtpStore for RacingStore {
        async fn health(&self) -> otpline_core::error::Result<String> {
            self.inner.health().await
        }
        async fn find_session(&self, id: Uuid) -> otpline_core::error::Result<Option<OtpSession>> {
            self.inner.find_session(id).await
        }
        async fn find_active_session(
            &self,
            number: &str,
            at: DateTime<Utc>,
        ) -> otpline_core::error::Result<Option<OtpSession>> {
            self.inner.find_active_session(number, at).await
        }
        async fn find_display_session(
            &self,
            number: &str,
        ) -> otpline_core::error::Result<Option<OtpSession>> {
            self.inner.find_display_session(number).await
        }
        async fn transition_status(
            &self,
            id: Uuid,
            expected: SessionStatus,
            next: SessionStatus,
        ) -> otpline_core::error::Result<bool> {
            if self.races_left.load(Ordering::SeqCst) > 0 {
                self.races_left.fetch_sub(1, Ordering::SeqCst);
                self.inner
                    .transition_status(id, SessionStatus::Pending, SessionStatus::Allocated)
                    .await?;
            }
            self.inner.transition_status(id, expected, next).await
        }
        async fn insert_message(
            &self,
            message: NewOtpMessage,
        ) -> otpline_core::error::Result<RecordOutcome> {
            self.inner.insert_message(message).await
        }
        async fn latest_message(
            &self,
            session_id: Uuid,
        ) -> otpline_core::error::Result<Option<OtpMessage>> {
            self.inner.latest_message(session_id).await
        }
        async fn create_session(
            &self,
            session: NewOtpSession,
        ) -> otpline_core::error::Result<OtpSession> {
            self.inner.create_session(session).await
        }
        async fn ensure_service(
            &self,
            code: &str,
            name: &str,
        ) -> otpline_core::error::Result<OtpService> {
            self.inner.ensure_service(code, name).await
        }
        async fn expire_stale_sessions(&self, now: DateTime<Utc>) -> otpline_core::error::Result<u64> {
            self.inner.expire_stale_sessions(now).await
        }
    }

    #[tokio::test]
    async fn test_lost_race_is_retried() {
        let store = RacingStore {
            inner: MemoryStore::new(),
            races_left: AtomicUsize::new(1),
        };
        let id = seed(&store.inner, SessionStatus::Pending).await;

        assert_eq!(
            complete_session(&store, id, &config()).await.unwrap(),
            Transition::Completed
        );
        let s = store.find_session(id).await.unwrap().unwrap();
        assert_eq!(s.status, SessionStatus::Completed);
        // pending → allocated by the racer, allocated → completed by us.
        assert_eq!(store.inner.status_writes(), 2);
    }

    #[tokio::test]
    async fn test_storage_errors_are_not_retried() {
        let store = MemoryStore::new();
        let id = seed(&store, SessionStatus::Pending).await;
        store.set_unavailable(true);
        let err = complete_session(&store, id, &config()).await.unwrap_err();
        assert!(matches!(err, OtpError::Other(_)));
    }
}
