//! Input validation for identifiers supplied by clients.

use std::fmt;

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid email format.
    InvalidEmail(String),
    /// Invalid device fingerprint.
    InvalidFingerprint(String),
    /// Invalid calendar date.
    InvalidDate(String),
    /// Value too long.
    TooLong { field: String, max: usize, actual: usize },
    /// Empty value where one is required.
    Empty(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidEmail(msg) => write!(f, "Invalid email: {}", msg),
            ValidationError::InvalidFingerprint(msg) => {
                write!(f, "Invalid device fingerprint: {}", msg)
            }
            ValidationError::InvalidDate(msg) => write!(f, "Invalid date: {}", msg),
            ValidationError::TooLong { field, max, actual } => {
                write!(f, "{} is too long ({} chars, max {})", field, actual, max)
            }
            ValidationError::Empty(field) => write!(f, "{} cannot be empty", field),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Maximum allowed length for email addresses.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Maximum allowed length for device fingerprints.
pub const MAX_FINGERPRINT_LENGTH: usize = 128;

/// Validate an email address (basic format check).
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();

    if email.is_empty() {
        return Err(ValidationError::Empty("email".to_string()));
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong {
            field: "email".to_string(),
            max: MAX_EMAIL_LENGTH,
            actual: email.len(),
        });
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ValidationError::InvalidEmail(
            "must contain exactly one @ symbol".to_string(),
        ));
    }

    let (local, domain) = (parts[0], parts[1]);

    if local.is_empty() {
        return Err(ValidationError::InvalidEmail(
            "missing local part (before @)".to_string(),
        ));
    }

    if domain.is_empty() || !domain.contains('.') {
        return Err(ValidationError::InvalidEmail(
            "domain must contain at least one dot".to_string(),
        ));
    }

    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return Err(ValidationError::InvalidEmail(
            "malformed domain".to_string(),
        ));
    }

    Ok(())
}

/// Validate a client-generated device fingerprint.
///
/// Fingerprints end up inside record keys (`<fingerprint>_<date>`), so only
/// ASCII alphanumerics, `-` and `_` are accepted.
pub fn validate_fingerprint(fingerprint: &str) -> Result<(), ValidationError> {
    if fingerprint.is_empty() {
        return Err(ValidationError::Empty("device fingerprint".to_string()));
    }

    if fingerprint.len() > MAX_FINGERPRINT_LENGTH {
        return Err(ValidationError::TooLong {
            field: "device fingerprint".to_string(),
            max: MAX_FINGERPRINT_LENGTH,
            actual: fingerprint.len(),
        });
    }

    if let Some(c) = fingerprint
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(ValidationError::InvalidFingerprint(format!(
            "invalid character '{}'",
            c
        )));
    }

    Ok(())
}

/// Validate a `YYYY-MM-DD` date string.
pub fn validate_usage_date(date: &str) -> Result<(), ValidationError> {
    let bytes = date.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());

    if !well_formed {
        return Err(ValidationError::InvalidDate(format!(
            "expected YYYY-MM-DD, got '{}'",
            date
        )));
    }

    let month: u32 = date[5..7].parse().unwrap_or(0);
    let day: u32 = date[8..10].parse().unwrap_or(0);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(ValidationError::InvalidDate(format!(
            "month or day out of range in '{}'",
            date
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email_valid() {
        assert!(validate_email("test@example.com").is_ok());
        assert!(validate_email("user.name@domain.co.uk").is_ok());
        assert!(validate_email(" test@example.com ").is_ok()); // trimmed
    }

    #[test]
    fn test_validate_email_invalid() {
        assert!(matches!(validate_email(""), Err(ValidationError::Empty(_))));
        assert!(matches!(
            validate_email("test.example.com"),
            Err(ValidationError::InvalidEmail(_))
        ));
        assert!(matches!(
            validate_email("@example.com"),
            Err(ValidationError::InvalidEmail(_))
        ));
        assert!(matches!(
            validate_email("test@localhost"),
            Err(ValidationError::InvalidEmail(_))
        ));
        assert!(matches!(
            validate_email("test@example..com"),
            Err(ValidationError::InvalidEmail(_))
        ));
    }

    #[test]
    fn test_validate_fingerprint() {
        assert!(validate_fingerprint("fp_3a9c-77e1").is_ok());
        assert!(validate_fingerprint("ABCdef0123456789").is_ok());

        assert!(matches!(
            validate_fingerprint(""),
            Err(ValidationError::Empty(_))
        ));
        assert!(matches!(
            validate_fingerprint("fp/../../etc"),
            Err(ValidationError::InvalidFingerprint(_))
        ));
        assert!(matches!(
            validate_fingerprint("has space"),
            Err(ValidationError::InvalidFingerprint(_))
        ));

        let long = "a".repeat(MAX_FINGERPRINT_LENGTH + 1);
        assert!(matches!(
            validate_fingerprint(&long),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_validate_usage_date() {
        assert!(validate_usage_date("2025-03-14").is_ok());
        assert!(validate_usage_date("2025-3-14").is_err());
        assert!(validate_usage_date("2025-13-01").is_err());
        assert!(validate_usage_date("2025-00-10").is_err());
        assert!(validate_usage_date("not-a-date").is_err());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidFingerprint("invalid character '/'".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid device fingerprint: invalid character '/'"
        );

        let err = ValidationError::TooLong {
            field: "email".to_string(),
            max: 254,
            actual: 300,
        };
        assert_eq!(err.to_string(), "email is too long (300 chars, max 254)");
    }
}
