use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{status_strings, OtpStore, RecordOutcome};
use crate::error::{OtpError, Result};
use crate::models::{NewOtpMessage, NewOtpSession, OtpMessage, OtpService, OtpSession, SessionStatus};

const SESSION_COLUMNS: &str =
    "id, user_id, service_id, country, allocated_number, status, created_at, expires_at";

const MESSAGE_COLUMNS: &str = "id, session_id, from_number, to_number, message_body, code, \
     provider_payload, dedupe_key, received_at";

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    service_id: Uuid,
    country: String,
    allocated_number: String,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for OtpSession {
    type Error = OtpError;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(OtpSession {
            id: row.id,
            user_id: row.user_id,
            service_id: row.service_id,
            country: row.country,
            allocated_number: row.allocated_number,
            status: row.status.parse().map_err(OtpError::Other)?,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

fn to_session(row: Option<SessionRow>) -> Result<Option<OtpSession>> {
    row.map(OtpSession::try_from).transpose()
}

/// PostgreSQL-backed store over the `otp_sessions`, `otp_messages` and `otp_services` tables.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OtpStore for PgStore {
    async fn health(&self) -> Result<String> {
        Ok(crate::db::health_check(&self.pool).await?)
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<OtpSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM otp_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        to_session(row)
    }

    async fn find_active_session(
        &self,
        number: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<OtpSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM otp_sessions
            WHERE allocated_number = $1
              AND status = ANY($2)
              AND expires_at > $3
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            SESSION_COLUMNS
        ))
        .bind(number)
        .bind(status_strings(&SessionStatus::ACTIVE))
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        to_session(row)
    }

    async fn find_display_session(&self, number: &str) -> Result<Option<OtpSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM otp_sessions
            WHERE allocated_number = $1
              AND status = ANY($2)
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            SESSION_COLUMNS
        ))
        .bind(number)
        .bind(status_strings(&SessionStatus::DISPLAYABLE))
        .fetch_optional(&self.pool)
        .await?;
        to_session(row)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE otp_sessions SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(expected.as_str())
            .bind(next.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_message(&self, message: NewOtpMessage) -> Result<RecordOutcome> {
        let inserted: Option<OtpMessage> = sqlx::query_as(&format!(
            r#"
            INSERT INTO otp_messages
                (session_id, from_number, to_number, message_body, code,
                 provider_payload, dedupe_key, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (dedupe_key) DO NOTHING
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(message.session_id)
        .bind(&message.from_number)
        .bind(&message.to_number)
        .bind(&message.message_body)
        .bind(&message.code)
        .bind(&message.provider_payload)
        .bind(&message.dedupe_key)
        .bind(message.received_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(RecordOutcome::Inserted(row));
        }

        let existing: OtpMessage = sqlx::query_as(&format!(
            "SELECT {} FROM otp_messages WHERE dedupe_key = $1",
            MESSAGE_COLUMNS
        ))
        .bind(&message.dedupe_key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            OtpError::Other(format!(
                "dedupe conflict on '{}' but no stored row",
                message.dedupe_key
            ))
        })?;
        Ok(RecordOutcome::Duplicate(existing))
    }

    async fn latest_message(&self, session_id: Uuid) -> Result<Option<OtpMessage>> {
        let row: Option<OtpMessage> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM otp_messages
            WHERE session_id = $1
            ORDER BY received_at DESC, id DESC
            LIMIT 1
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_session(&self, session: NewOtpSession) -> Result<OtpSession> {
        let row: SessionRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO otp_sessions
                (user_id, service_id, country, allocated_number, status, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(session.user_id)
        .bind(session.service_id)
        .bind(&session.country)
        .bind(&session.allocated_number)
        .bind(session.status.as_str())
        .bind(session.created_at)
        .bind(session.expires_at)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn ensure_service(&self, code: &str, name: &str) -> Result<OtpService> {
        sqlx::query(
            "INSERT INTO otp_services (id, code, name) VALUES ($1, $2, $3) ON CONFLICT (code) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(name)
        .execute(&self.pool)
        .await?;

        let service: OtpService =
            sqlx::query_as("SELECT id, code, name FROM otp_services WHERE code = $1")
                .bind(code)
                .fetch_one(&self.pool)
                .await?;
        Ok(service)
    }

    async fn expire_stale_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE otp_sessions
            SET status = 'expired'
            WHERE status = ANY($1)
              AND expires_at <= $2
            "#,
        )
        .bind(status_strings(&SessionStatus::ACTIVE))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
