/// Password Hashing and Verification
///
/// bcrypt hashing with a random per-hash salt, plus the strength policy used for
/// admin-created accounts and password changes.

use bcrypt::{hash, verify, DEFAULT_COST};
use lazy_static::lazy_static;

use crate::error::{AppError, ValidationError};

/// Characters
pub const MIN_PASSWORD_LENGTH: usize = 8;
/// Bytes; bcrypt ignores everything after the 72nd byte
pub const MAX_PASSWORD_LENGTH: usize = 72;

lazy_static! {
    // Verified against when the account does not exist, so both paths pay the bcrypt cost.
    static ref DUMMY_HASH: String =
        hash("not-a-real-password", DEFAULT_COST).unwrap_or_default();
}

/// Hash a password using bcrypt
///
/// Two calls with the same input produce different hashes; both verify.
///
/// # Errors
/// Returns error if bcrypt hashing fails
pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// A malformed hash never errors; it simply does not verify.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match verify(password, password_hash) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::warn!(error = %e, "Password hash could not be verified");
            false
        }
    }
}

/// Burns the same bcrypt work as a real verification.
pub fn verify_against_dummy(password: &str) {
    let _ = verify_password(password, &DUMMY_HASH);
}

/// Strength policy:
/// - at least 8 characters and at most 72 bytes
/// - at least one lowercase letter, one uppercase letter, one digit
/// - at least one symbol (anything outside `[A-Za-z0-9]`)
pub fn is_strong_password(password: &str) -> bool {
    if password.chars().count() < MIN_PASSWORD_LENGTH || password.len() > MAX_PASSWORD_LENGTH {
        return false;
    }

    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_ascii_alphanumeric());

    has_lowercase && has_uppercase && has_digit && has_symbol
}

pub fn ensure_strong_password(password: &str) -> Result<(), AppError> {
    if is_strong_password(password) {
        Ok(())
    } else {
        Err(AppError::Validation(ValidationError::WeakPassword))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let password = "ValidPassword123";
        let hash = hash_password(password).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_same_password_hashes_differently_but_both_verify() {
        let first = hash_password("Str0ng!pass").unwrap();
        let second = hash_password("Str0ng!pass").unwrap();

        assert_ne!(first, second);
        assert!(verify_password("Str0ng!pass", &first));
        assert!(verify_password("Str0ng!pass", &second));
    }

    #[test]
    fn test_verify_wrong_password() {
        let hash = hash_password("ValidPassword123").unwrap();
        assert!(!verify_password("WrongPassword123", &hash));
    }

    #[test]
    fn test_malformed_hash_returns_false() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn test_strong_password_policy() {
        assert!(is_strong_password("Str0ng!pass"));
        assert!(!is_strong_password("Sh0rt!"));
        assert!(!is_strong_password("nouppercase1!"));
        assert!(!is_strong_password("NOLOWERCASE1!"));
        assert!(!is_strong_password("NoDigitsHere!"));
        assert!(!is_strong_password("NoSymbols123"));
    }

    #[test]
    fn test_length_bounds() {
        let at_max = format!("Aa1!{}", "x".repeat(MAX_PASSWORD_LENGTH - 4));
        assert!(is_strong_password(&at_max));

        let too_long = format!("Aa1!{}", "x".repeat(MAX_PASSWORD_LENGTH - 3));
        assert!(!is_strong_password(&too_long));
    }

    #[test]
    fn test_max_length_counts_bytes() {
        // 40 characters, 76 bytes
        let multibyte = format!("Aa1!{}", "é".repeat(36));
        assert_eq!(multibyte.chars().count(), 40);
        assert!(!is_strong_password(&multibyte));

        let fits = format!("Aa1!{}", "é".repeat(34));
        assert_eq!(fits.len(), MAX_PASSWORD_LENGTH);
        assert!(is_strong_password(&fits));
    }

    #[test]
    fn test_ensure_strong_password_error() {
        let err = ensure_strong_password("weak").unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::WeakPassword)));
    }
}
