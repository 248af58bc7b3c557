//! Identity records and credential verification.

pub mod models;
pub mod password;

pub use models::{BackupCode, Identity, IdentityStatus, MfaState, NewIdentity};

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    static EMAIL_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    EMAIL_RE
        .get_or_init(|| {
            regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("literal pattern compiles")
        })
        .is_match(email_normalized)
}
