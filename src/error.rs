/// Error Handling Module
///
/// Unified error model for the admin console session core.
/// It covers:
/// 1. Domain-specific error types (storage, auth, validation, API, config)
/// 2. A unified `AppError` used for control flow
/// 3. User-facing messages for the login form
/// 4. Structured error logging with context
///
/// Session validation never returns these errors to its callers: missing,
/// malformed and expired credentials all resolve to "logged out". Only the
/// login operation and data fetches propagate failures.

use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for login form input
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyField(&'static str),
    TooLong(&'static str, usize),
    InvalidFormat(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is required", field),
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
        }
    }
}

impl StdError for ValidationError {}

/// Token store errors
#[derive(Debug)]
pub enum StorageError {
    Io(String),
    Corrupted(String),
    Serialization(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(msg) => write!(f, "Storage I/O error: {}", msg),
            StorageError::Corrupted(msg) => write!(f, "Storage file is corrupted: {}", msg),
            StorageError::Serialization(msg) => write!(f, "Failed to serialize session: {}", msg),
        }
    }
}

impl StdError for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<notify::Error> for StorageError {
    fn from(err: notify::Error) -> Self {
        StorageError::Io(format!("file watch: {}", err))
    }
}

/// Authentication errors
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    /// Backend refused the credentials; carries the backend's message
    LoginRejected(String),
    /// Backend rejected a bearer token on a data request
    TokenExpired,
    /// An operation needing a session ran while logged out
    NotAuthenticated,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::LoginRejected(msg) => write!(f, "Login failed: {}", msg),
            AuthError::TokenExpired => write!(f, "Session has expired"),
            AuthError::NotAuthenticated => write!(f, "Not logged in"),
        }
    }
}

impl StdError for AuthError {}

/// REST backend errors
#[derive(Debug)]
pub enum ApiError {
    Network(String),
    Status(u16, String),
    InvalidResponse(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "Backend unreachable: {}", msg),
            ApiError::Status(code, msg) => write!(f, "Backend returned {}: {}", code, msg),
            ApiError::InvalidResponse(msg) => write!(f, "Unexpected backend response: {}", msg),
        }
    }
}

impl StdError for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::Status(status.as_u16(), err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Storage(StorageError),
    Auth(AuthError),
    Api(ApiError),
    Config(ConfigError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Storage(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Api(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS (Control Flow Error Conversion)
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        AppError::Api(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Api(err.into())
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}

// ============================================================================
// 3. USER-FACING MESSAGES
// ============================================================================

impl AppError {
    /// Message shown next to the login form.
    ///
    /// Backend rejection messages are passed through verbatim; transport and
    /// internal details are not.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(e) => e.to_string(),
            AppError::Auth(AuthError::LoginRejected(msg)) => msg.clone(),
            AppError::Auth(e) => e.to_string(),
            AppError::Api(ApiError::Network(_)) => {
                "Could not reach the server, please try again".to_string()
            }
            AppError::Api(_) => "The server returned an unexpected response".to_string(),
            AppError::Storage(_) => "Could not save the session on this device".to_string(),
            AppError::Config(_) | AppError::Internal(_) => "Something went wrong".to_string(),
        }
    }

    /// Whether this error means the current session is no longer usable.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, AppError::Auth(AuthError::TokenExpired))
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for enhanced logging and debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub operation_id: String,
    pub admin_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation_id: uuid::Uuid::new_v4().to_string(),
            admin_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_admin_id(mut self, admin_id: String) -> Self {
        self.admin_id = Some(admin_id);
        self
    }

    pub fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "operation_id": self.operation_id,
            "operation": self.operation,
            "admin_id": self.admin_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Validation(_) | AppError::Auth(_) => {
                tracing::warn!(
                    error = %error,
                    context = ?context,
                    "Request rejected"
                );
            }
            AppError::Api(_) => {
                tracing::error!(
                    error = %error,
                    context = ?context,
                    "Backend error"
                );
            }
            AppError::Storage(_) => {
                tracing::error!(
                    error = %error,
                    context = ?context,
                    "Token store error"
                );
            }
            AppError::Config(_) | AppError::Internal(_) => {
                tracing::error!(
                    error = %error,
                    context = ?context,
                    "Internal error"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("email");
        assert_eq!(err.to_string(), "email is required");
    }

    #[test]
    fn test_app_error_conversion() {
        let auth_err = AuthError::TokenExpired;
        let app_err: AppError = auth_err.into();
        assert!(app_err.is_session_expired());
    }

    #[test]
    fn test_login_rejection_message_passes_through() {
        let err = AppError::Auth(AuthError::LoginRejected("Wrong password".to_string()));
        assert_eq!(err.user_message(), "Wrong password");
    }

    #[test]
    fn test_network_error_message_hides_details() {
        let err = AppError::Api(ApiError::Network("connection refused 10.0.0.1".to_string()));
        assert!(!err.user_message().contains("10.0.0.1"));
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("admin_login");
        assert_eq!(ctx.operation, "admin_login");
        assert!(ctx.admin_id.is_none());

        let ctx_with_admin = ctx.with_admin_id("admin-1".to_string());
        assert_eq!(ctx_with_admin.admin_id, Some("admin-1".to_string()));
    }
}
