//! In-memory store for testing and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OtpStore, RecordOutcome};
use crate::error::{OtpError, Result};
use crate::models::{NewOtpMessage, NewOtpSession, OtpMessage, OtpService, OtpSession, SessionStatus};

/// Sessions, messages and services held in process memory.
///
/// Status writes go through a single write lock, so `transition_status`
/// has the same compare-and-set semantics as the SQL `UPDATE … WHERE status = $expected`.
pub struct MemoryStore {
    sessions: RwLock<HashMap<Uuid, OtpSession>>,
    messages: RwLock<Vec<OtpMessage>>,
    services: RwLock<HashMap<String, OtpService>>,
    status_writes: AtomicUsize,
    unavailable: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            messages: RwLock::new(Vec::new()),
            services: RwLock::new(HashMap::new()),
            status_writes: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail as if the backing database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful status writes since creation.
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored message in insertion order.
    pub async fn messages(&self) -> Vec<OtpMessage> {
        self.messages.read().await.clone()
    }

    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(OtpError::Other("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    async fn newest_matching<F>(&self, number: &str, keep: F) -> Option<OtpSession>
    where
        F: Fn(&OtpSession) -> bool,
    {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.allocated_number == number && keep(s))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned()
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn health(&self) -> Result<String> {
        self.check_available()?;
        Ok("memory".to_string())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<OtpSession>> {
        self.check_available()?;
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn find_active_session(
        &self,
        number: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<OtpSession>> {
        self.check_available()?;
        Ok(self
            .newest_matching(number, |s| s.accepts_message_at(at))
            .await)
    }

    async fn find_display_session(&self, number: &str) -> Result<Option<OtpSession>> {
        self.check_available()?;
        Ok(self
            .newest_matching(number, |s| SessionStatus::DISPLAYABLE.contains(&s.status))
            .await)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> Result<bool> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id) {
            Some(session) if session.status == expected => {
                session.status = next;
                self.status_writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_message(&self, message: NewOtpMessage) -> Result<RecordOutcome> {
        self.check_available()?;
        let mut messages = self.messages.write().await;
        if let Some(existing) = messages.iter().find(|m| m.dedupe_key == message.dedupe_key) {
            return Ok(RecordOutcome::Duplicate(existing.clone()));
        }
        let row = OtpMessage {
            id: Uuid::new_v4(),
            session_id: message.session_id,
            from_number: message.from_number,
            to_number: message.to_number,
            message_body: message.message_body,
            code: message.code,
            provider_payload: message.provider_payload,
            dedupe_key: message.dedupe_key,
            received_at: message.received_at,
        };
        messages.push(row.clone());
        Ok(RecordOutcome::Inserted(row))
    }

    async fn latest_message(&self, session_id: Uuid) -> Result<Option<OtpMessage>> {
        self.check_available()?;
        let messages = self.messages.read().await;
        // Later inserts win ties on received_at.
        Ok(messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.session_id == Some(session_id))
            .max_by(|(ia, a), (ib, b)| a.received_at.cmp(&b.received_at).then(ia.cmp(ib)))
            .map(|(_, m)| m.clone()))
    }

    async fn create_session(&self, session: NewOtpSession) -> Result<OtpSession> {
        self.check_available()?;
        let row = OtpSession {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            service_id: session.service_id,
            country: session.country,
            allocated_number: session.allocated_number,
            status: session.status,
            created_at: session.created_at,
            expires_at: session.expires_at,
        };
        self.sessions.write().await.insert(row.id, row.clone());
        Ok(row)
    }

    async fn ensure_service(&self, code: &str, name: &str) -> Result<OtpService> {
        self.check_available()?;
        let mut services = self.services.write().await;
        let service = services
            .entry(code.to_string())
            .or_insert_with(|| OtpService {
                id: Uuid::new_v4(),
                code: code.to_string(),
                name: name.to_string(),
            });
        Ok(service.clone())
    }

    async fn expire_stale_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        let mut expired = 0;
        for session in sessions.values_mut() {
            if session.status.is_active() && session.expires_at <= now {
                session.status = SessionStatus::Expired;
                self.status_writes.fetch_add(1, Ordering::SeqCst);
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_session(number: &str, status: SessionStatus, created_at: DateTime<Utc>) -> NewOtpSession {
        NewOtpSession {
            user_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            country: "US".to_string(),
            allocated_number: number.to_string(),
            status,
            created_at,
            expires_at: created_at + Duration::minutes(20),
        }
    }

    fn new_message(key: &str, session_id: Option<Uuid>, at: DateTime<Utc>) -> NewOtpMessage {
        NewOtpMessage {
            session_id,
            from_number: None,
            to_number: "+1".to_string(),
            message_body: key.to_string(),
            code: None,
            provider_payload: serde_json::json!({}),
            dedupe_key: key.to_string(),
            received_at: at,
        }
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let store = MemoryStore::new();
        let s = store
            .create_session(new_session("+1", SessionStatus::Pending, Utc::now()))
            .await
            .unwrap();

        assert!(!store
            .transition_status(s.id, SessionStatus::Allocated, SessionStatus::Completed)
            .await
            .unwrap());
        assert!(store
            .transition_status(s.id, SessionStatus::Pending, SessionStatus::Completed)
            .await
            .unwrap());
        assert!(!store
            .transition_status(s.id, SessionStatus::Pending, SessionStatus::Completed)
            .await
            .unwrap());
        assert_eq!(store.status_writes(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_dedupe_key_returns_existing_row() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = store.insert_message(new_message("k1", None, now)).await.unwrap();
        let second = store.insert_message(new_message("k1", None, now)).await.unwrap();

        assert!(!first.is_duplicate());
        assert!(second.is_duplicate());
        assert_eq!(first.message().id, second.message().id);
        assert_eq!(store.message_count().await, 1);
    }

    #[tokio::test]
    async fn test_latest_message_orders_by_received_at() {
        let store = MemoryStore::new();
        let sid = Uuid::new_v4();
        let now = Utc::now();
        store.insert_message(new_message("late", Some(sid), now)).await.unwrap();
        store
            .insert_message(new_message("early", Some(sid), now - Duration::seconds(30)))
            .await
            .unwrap();
        store.insert_message(new_message("other", None, now + Duration::seconds(5))).await.unwrap();

        let latest = store.latest_message(sid).await.unwrap().unwrap();
        assert_eq!(latest.message_body, "late");
    }

    #[tokio::test]
    async fn test_sweep_leaves_completed_sessions_alone() {
        let store = MemoryStore::new();
        let long_ago = Utc::now() - Duration::hours(2);
        let stale = store
            .create_session(new_session("+1", SessionStatus::Pending, long_ago))
            .await
            .unwrap();
        let done = store
            .create_session(new_session("+1", SessionStatus::Completed, long_ago))
            .await
            .unwrap();

        assert_eq!(store.expire_stale_sessions(Utc::now()).await.unwrap(), 1);
        let stale = store.find_session(stale.id).await.unwrap().unwrap();
        let done = store.find_session(done.id).await.unwrap().unwrap();
        assert_eq!(stale.status, SessionStatus::Expired);
        assert_eq!(done.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_ensure_service_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.ensure_service("generic", "Generic OTP").await.unwrap();
        let b = store.ensure_service("generic", "Renamed").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.name, "Generic OTP");
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(store.health().await.is_err());
        assert!(store.find_display_session("+1").await.is_err());
    }
}
