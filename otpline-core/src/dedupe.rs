//! Delivery dedupe keys for inbound messages.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::webhook::InboundSms;

/// Key identifying one logical provider event across redeliveries.
///
/// Uses the provider's message id when present. Otherwise hashes the
/// normalized destination, sender and text together with the index of the
/// `window_seconds`-wide time bucket containing the provider's event time,
/// falling back to `received_at` when the payload carries none.
pub fn dedupe_key(
    sms: &InboundSms,
    normalized_to: &str,
    received_at: DateTime<Utc>,
    window_seconds: u64,
) -> String {
    if let Some(id) = &sms.provider_message_id {
        return format!("provider:{}", id);
    }

    let window = window_seconds.max(1) as i64;
    let bucket = sms
        .event_time
        .unwrap_or(received_at)
        .timestamp()
        .div_euclid(window);

    let mut hasher = Sha256::new();
    hasher.update(normalized_to.as_bytes());
    hasher.update([0u8]);
    hasher.update(sms.from.as_deref().unwrap_or("").as_bytes());
    hasher.update([0u8]);
    hasher.update(sms.text.as_bytes());
    hasher.update([0u8]);
    hasher.update(bucket.to_be_bytes());
    format!("sha256:{:x}", hasher.finalize())
}
