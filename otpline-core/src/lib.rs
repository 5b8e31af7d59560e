pub mod code;
pub mod config;
pub mod db;
pub mod dedupe;
pub mod error;
pub mod ipc;
pub mod models;
pub mod phone;
pub mod store;
pub mod webhook;

pub use code::extract_code;
pub use config::OtplineConfig;
pub use error::OtpError;
pub use models::{NewOtpMessage, NewOtpSession, OtpMessage, OtpService, OtpSession, SessionStatus};
pub use phone::normalize_number;
pub use store::{MemoryStore, OtpStore, PgStore, RecordOutcome};
pub use webhook::{InboundSms, ParseOutcome};
