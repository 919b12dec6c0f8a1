/// Input validators
///
/// Shape checks applied to request bodies before they reach the session or user
/// services. Queries are always parameterized, so these checks only guard length,
/// format and control characters.

use lazy_static::lazy_static;
use regex::Regex;

use crate::auth::{MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH};
use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
/// Matches the `users.name` column width
pub const MAX_NAME_LENGTH: usize = 100;
const MIN_NAME_LENGTH: usize = 2;
const MAX_LOCAL_PART_LENGTH: usize = 64;
/// Matches the `users.username` column width
pub const MAX_USERNAME_LENGTH: usize = 80;
/// Leaves room for the numeric suffix added on collisions
const USERNAME_BASE_LENGTH: usize = 60;

lazy_static! {
    // RFC 5322 simplified
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$"
    ).expect("email regex compiles");

    static ref USERNAME_DISALLOWED: Regex =
        Regex::new(r"[^a-z0-9_]").expect("username regex compiles");
}

/// Validates an email address and returns it trimmed
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email_id".to_string()));
    }
    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email_id".to_string(), MIN_EMAIL_LENGTH));
    }
    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email_id".to_string(), MAX_EMAIL_LENGTH));
    }

    let local_part_too_long = trimmed
        .split_once('@')
        .map(|(local, _)| local.len() > MAX_LOCAL_PART_LENGTH)
        .unwrap_or(false);
    if !EMAIL_REGEX.is_match(trimmed) || local_part_too_long {
        return Err(ValidationError::InvalidFormat("email_id".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates a display name and returns it trimmed
pub fn is_valid_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    let length = trimmed.chars().count();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("name".to_string()));
    }
    if length < MIN_NAME_LENGTH {
        return Err(ValidationError::TooShort("name".to_string(), MIN_NAME_LENGTH));
    }
    if length > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong("name".to_string(), MAX_NAME_LENGTH));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::SuspiciousContent("name".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Length-only password check used at login and self-registration.
///
/// The minimum counts characters, the maximum counts bytes.
pub fn validate_password_shape(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password".to_string(), MIN_PASSWORD_LENGTH));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password".to_string(), MAX_PASSWORD_LENGTH));
    }
    Ok(())
}

/// Lowercase, spaces to underscores, drop anything outside `[a-z0-9_]`, cut to
/// 60 characters. Falls back to `user` when nothing is left.
pub fn normalize_username_seed(seed: &str) -> String {
    let lowered = seed.to_lowercase().replace(' ', "_");
    let mut cleaned = USERNAME_DISALLOWED.replace_all(&lowered, "").into_owned();
    if cleaned.is_empty() {
        return "user".to_string();
    }
    // Only ASCII survives the filter, so byte and char positions agree.
    cleaned.truncate(USERNAME_BASE_LENGTH);
    cleaned
}
