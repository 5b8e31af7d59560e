//! Verification code extraction from free-form SMS text.

use regex::Regex;
use std::sync::OnceLock;

/// A run of 4–8 ASCII digits standing alone as a word.
const CODE_PATTERN: &str = r"\b[0-9]{4,8}\b";

fn code_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CODE_PATTERN).ok()).as_ref()
}

/// First 4–8 digit token in `text`, if any.
///
/// Digits separated by spaces or punctuation ("8 4 2 9 1 6") do not form a
/// token and are not matched.
pub fn extract_code(text: &str) -> Option<String> {
    code_regex()?.find(text).map(|m| m.as_str().to_string())
}
