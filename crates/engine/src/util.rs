//! Input validation helpers.
//!
//! These helpers centralize parsing of free-text input so every flow rejects
//! the same malformed values with the same `InvalidInput` error.

use crate::{EngineError, ResultEngine};

/// Parse a non-negative integer typed by a user.
///
/// Only ASCII digits are accepted; signs, spaces inside the number and
/// decimal points are rejected.
pub fn parse_number(raw: &str, label: &str) -> ResultEngine<i32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EngineError::InvalidInput(format!(
            "{label} must be a number"
        )));
    }
    trimmed
        .parse::<i32>()
        .map_err(|_| EngineError::InvalidInput(format!("{label} is too large")))
}

/// Parse a yes/no answer.
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "yes" | "y" | "true" | "1" | "да"
    )
}

/// Trim text and reject it when empty.
pub fn normalize_required_text(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(format!(
            "{label} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// Split a `login:password` pair.
///
/// Only the first `:` separates the halves so passwords may contain colons.
pub fn parse_credentials_pair(raw: &str) -> ResultEngine<(String, String)> {
    let Some((login, password)) = raw.split_once(':') else {
        return Err(EngineError::InvalidInput(
            "expected login:password".to_string(),
        ));
    };
    Ok((
        normalize_required_text(login, "login")?,
        normalize_required_text(password, "password")?,
    ))
}
