use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stored session status. `Expired` is normally derived from `expires_at`
/// (see [`OtpSession::effective_status`]) and only written by the opt-in sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Allocated,
    Completed,
    Expired,
    Cancelled,
}

impl SessionStatus {
    /// Statuses that can still receive a code on the ingestion path.
    pub const ACTIVE: [SessionStatus; 2] = [SessionStatus::Pending, SessionStatus::Allocated];

    /// Statuses a polling client may still read from.
    pub const DISPLAYABLE: [SessionStatus; 3] = [
        SessionStatus::Pending,
        SessionStatus::Allocated,
        SessionStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Allocated => "allocated",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "allocated" => Ok(SessionStatus::Allocated),
            "completed" => Ok(SessionStatus::Completed),
            "expired" => Ok(SessionStatus::Expired),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_id: Uuid,
    pub country: String,
    pub allocated_number: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OtpSession {
    /// Status as observed at `now`: active sessions past `expires_at` read as expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        if self.status.is_active() && self.expires_at <= now {
            SessionStatus::Expired
        } else {
            self.status
        }
    }

    /// Whether an inbound message received at `at` may be attributed to this session.
    pub fn accepts_message_at(&self, at: DateTime<Utc>) -> bool {
        self.status.is_active() && self.expires_at > at
    }
}

/// Insert shape for sessions created by external provisioning (and dev tooling).
#[derive(Debug, Clone)]
pub struct NewOtpSession {
    pub user_id: Uuid,
    pub service_id: Uuid,
    pub country: String,
    pub allocated_number: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
