use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Minimum time a human needs to fill out a form. Bots submit near-instantly.
const MIN_FILL_TIME_MS: i64 = 3000;

static EMAIL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamReason {
    Honeypot,
    TooFast,
    InvalidEmail,
}

impl SpamReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpamReason::Honeypot => "honeypot",
            SpamReason::TooFast => "too_fast",
            SpamReason::InvalidEmail => "invalid_email",
        }
    }
}

/// Classify an inbound form payload. Checks run in order, first match wins:
/// honeypot field filled, submission faster than a human could type, or an
/// email-shaped field that does not parse as local@domain.tld.
pub fn check_spam(data: &HashMap<String, String>) -> Option<SpamReason> {
    check_spam_at(data, Utc::now().timestamp_millis())
}

pub fn check_spam_at(data: &HashMap<String, String>, now_ms: i64) -> Option<SpamReason> {
    // Honeypot field is hidden from real users and must stay empty.
    if data.get("_honey").map(|v| !v.is_empty()).unwrap_or(false) {
        return Some(SpamReason::Honeypot);
    }

    if let Some(ts) = data.get("_timestamp") {
        if let Ok(submitted) = ts.parse::<i64>() {
            if now_ms - submitted < MIN_FILL_TIME_MS {
                return Some(SpamReason::TooFast);
            }
        }
    }

    let email = data
        .get("email")
        .or_else(|| data.get("Email"))
        .map(String::as_str)
        .unwrap_or("");
    if !email.is_empty() && !EMAIL_SHAPE.is_match(email) {
        return Some(SpamReason::InvalidEmail);
    }

    None
}
