pub mod message;
pub mod service;
pub mod session;

pub use message::{NewOtpMessage, OtpMessage};
pub use service::OtpService;
pub use session::{NewOtpSession, OtpSession, SessionStatus};
