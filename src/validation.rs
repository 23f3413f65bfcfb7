// Validation utilities module
// Provides custom validation functions for login input

use regex::Regex;
use std::sync::OnceLock;
use validator::ValidationError;

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9_.-]{3,32}$").expect("username pattern compiles")
    })
}

/// Validates that a username is 3-32 chars of lowercase letters, digits, `_`, `.` or `-`
/// The caller is expected to have lowercased the value already.
pub fn validate_username_format(username: &str) -> Result<(), ValidationError> {
    if username_pattern().is_match(username) {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_username");
        err.message = Some("username format is invalid".into());
        Err(err)
    }
}
