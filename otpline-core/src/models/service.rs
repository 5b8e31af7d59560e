use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row of the `otp_services` lookup table (short code → display name).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OtpService {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}
