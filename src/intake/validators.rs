//! Field validators — pure accept/normalize or reject functions.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

/// Russian mobile number: `+7` or `8`, then exactly ten digits.
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\+7|8)[0-9]{10}$").expect("phone pattern is valid"));

/// Accept any text with visible content, stored exactly as sent.
pub fn validate_free_text(field: &'static str, input: &str) -> Result<String, ValidationError> {
    if input.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(input.to_string())
}

/// Letters and spaces only, at least one letter. Returns the title-cased name.
/// Blank input is a format error like any other.
pub fn validate_name(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    let mut letters = trimmed.chars().filter(|c| *c != ' ').peekable();
    if letters.peek().is_none() {
        return Err(ValidationError::InvalidName);
    }
    if !letters.all(char::is_alphabetic) {
        return Err(ValidationError::InvalidName);
    }
    Ok(title_case(trimmed))
}

/// Exact match against the mobile pattern. Stored verbatim.
pub fn validate_phone(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if !PHONE_PATTERN.is_match(trimmed) {
        return Err(ValidationError::InvalidPhone);
    }
    Ok(trimmed.to_string())
}

/// Upper-case each letter that starts a word, lower-case the rest.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut word_start = true;
    for c in input.chars() {
        if c.is_alphabetic() {
            if word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(c);
            word_start = true;
        }
    }
    out
}
