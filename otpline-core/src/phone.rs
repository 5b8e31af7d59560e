//! Phone number canonicalization.
//!
//! Purely syntactic: every non-digit is dropped and a single `+` is prefixed.
//! A literal `+` that arrived URL-decoded as a space is therefore harmless.

/// Canonicalize `input` to `+<digits>`, or `None` when it holds no digits.
pub fn normalize_number(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("+{}", digits))
    }
}
