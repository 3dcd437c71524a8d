/// Login form validators
///
/// Required-ness and format checks run before any request reaches the
/// backend, so an empty or garbled form never costs a round trip.

use lazy_static::lazy_static;
use regex::Regex;

use crate::api_client::LoginRequest;
use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MAX_PASSWORD_LENGTH: usize = 128;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();
}

/// Validates an email address
/// - Must be present after trimming
/// - Must fit RFC 5321 length limits
/// - Must match the simplified RFC 5322 pattern
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email"));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email", MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email"));
    }

    Ok(trimmed.to_string())
}

/// Validates a password field. Only presence and length are checked here;
/// strength rules belong to the backend.
pub fn is_valid_password(password: &str) -> Result<String, ValidationError> {
    if password.trim().is_empty() {
        return Err(ValidationError::EmptyField("password"));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password", MAX_PASSWORD_LENGTH));
    }

    Ok(password.to_string())
}

/// Validate the login form and build the request body.
pub fn validate_login_form(email: &str, password: &str) -> Result<LoginRequest, ValidationError> {
    let email = is_valid_email(email)?;
    let password = is_valid_password(password)?;
    Ok(LoginRequest { email, password })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com").is_ok());
        assert!(is_valid_email("test.email@domain.co.uk").is_ok());
        assert!(is_valid_email("user+tag@example.com").is_ok());
    }

    #[test]
    fn test_email_is_trimmed() {
        assert_eq!(is_valid_email("  admin@club.org ").unwrap(), "admin@club.org");
    }

    #[test]
    fn test_invalid_email_format() {
        assert!(is_valid_email("invalid").is_err());
        assert!(is_valid_email("user@").is_err());
        assert!(is_valid_email("@example.com").is_err());
        assert!(is_valid_email("user@@example.com").is_err());
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(
            validate_login_form("", "secret").unwrap_err(),
            ValidationError::EmptyField("email")
        );
        assert_eq!(
            validate_login_form("admin@club.org", "   ").unwrap_err(),
            ValidationError::EmptyField("password")
        );
    }

    #[test]
    fn test_password_length_limit() {
        let too_long = "a".repeat(MAX_PASSWORD_LENGTH + 1);
        assert!(is_valid_password(&too_long).is_err());
    }

    #[test]
    fn test_valid_form_builds_request() {
        let request = validate_login_form("admin@club.org", "Secret123").unwrap();
        assert_eq!(request.email, "admin@club.org");
        assert_eq!(request.password, "Secret123");
    }
}
