//! Inbound SMS webhook payload parsing.
//!
//! The provider delivers the same event in several shapes:
//! - flattened at the top level, or nested under `data` or `data.payload`
//! - `to` / `from` as a string, an object with `phone_number`, or an array of those
//! - the message text under `text` or `body`
//!
//! Anything outside that closed set is treated as a structural skip, never an error.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Fields extracted from a recognized payload. Numbers are exactly as delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSms {
    pub provider_message_id: Option<String>,
    pub to: String,
    pub from: Option<String>,
    pub text: String,
    /// Provider-side event time (`occurred_at`, else `received_at`), stable across redeliveries.
    pub event_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Body is not a JSON object at any envelope level.
    Unrecognized,
    /// No destination number or no message text.
    MissingFields,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Unrecognized => "unrecognized payload",
            SkipReason::MissingFields => "no to/text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Parsed(InboundSms),
    Skip(SkipReason),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PhoneEntry {
    Number(String),
    Object { phone_number: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PhoneField {
    Single(PhoneEntry),
    List(Vec<PhoneEntry>),
}

impl PhoneField {
    fn into_number(self) -> Option<String> {
        let entry = match self {
            PhoneField::Single(e) => e,
            PhoneField::List(list) => list.into_iter().next()?,
        };
        let raw = match entry {
            PhoneEntry::Number(n) => n,
            PhoneEntry::Object { phone_number } => phone_number,
        };
        non_empty(raw)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn phone_at(payload: &Value, key: &str) -> Option<String> {
    let field = payload.get(key)?;
    serde_json::from_value::<PhoneField>(field.clone())
        .ok()?
        .into_number()
}

fn time_at(payload: &Value, key: &str) -> Option<DateTime<Utc>> {
    let raw = payload.get(key)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn string_at(payload: &Value, key: &str) -> Option<String> {
    payload.get(key)?.as_str().map(str::to_string).and_then(non_empty)
}

/// Pick the innermost envelope that is present: `data.payload`, then `data`, then the body.
fn envelope(body: &Value) -> Option<&Value> {
    let data = body.get("data").filter(|d| d.is_object());
    let nested = data.and_then(|d| d.get("payload")).filter(|p| p.is_object());
    nested.or(data).or(Some(body)).filter(|v| v.is_object())
}

/// Parse a raw webhook body into an [`InboundSms`] or a skip reason.
pub fn parse_inbound(body: &Value) -> ParseOutcome {
    let payload = match envelope(body) {
        Some(p) => p,
        None => return ParseOutcome::Skip(SkipReason::Unrecognized),
    };

    let to = phone_at(payload, "to");
    let text = string_at(payload, "text").or_else(|| string_at(payload, "body"));

    let (to, text) = match (to, text) {
        (Some(to), Some(text)) => (to, text),
        _ => return ParseOutcome::Skip(SkipReason::MissingFields),
    };

    let provider_message_id = string_at(payload, "id")
        .or_else(|| body.get("data").and_then(|d| string_at(d, "id")));

    let data = body.get("data");
    let event_time = ["occurred_at", "received_at"].iter().find_map(|key| {
        time_at(payload, key).or_else(|| data.and_then(|d| time_at(d, key)))
    });

    ParseOutcome::Parsed(InboundSms {
        provider_message_id,
        to,
        from: phone_at(payload, "from"),
        text,
        event_time,
    })
}
