/// Error Handling Module
///
/// One error vocabulary for the whole service:
/// 1. Domain-specific error types (validation, database, auth, config)
/// 2. A unified `AppError` used for control flow
/// 3. HTTP response mapping with structured logging
/// 4. Error context enrichment for handler-level logs
///
/// Authentication failures are rendered with generic messages. The precise reason is
/// only ever written to the log.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    SuspiciousContent(String),
    WeakPassword,
    /// A business rule rejected otherwise well-formed input
    Rejected(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
            ValidationError::WeakPassword => write!(
                f,
                "Password must be 8 characters to 72 bytes and include upper, lower, number, and special character"
            ),
            ValidationError::Rejected(msg) => write!(f, "{}", msg),
        }
    }
}

impl StdError for ValidationError {}

/// Database operation errors
#[derive(Debug)]
pub enum DatabaseError {
    UniqueConstraintViolation(String),
    NotFound(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => write!(f, "{}", msg),
            DatabaseError::NotFound(what) => write!(f, "{} not found", what),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// Authentication and authorization errors
///
/// `InvalidCredentials`, `TokenInvalid` and `MissingToken` are 401s.
/// `AccountDisabled` and `InsufficientPermissions` are 403s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    TokenInvalid,
    MissingToken,
    AccountDisabled,
    InsufficientPermissions,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::TokenInvalid => write!(f, "Invalid or expired token"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
            AuthError::AccountDisabled => write!(f, "User account is disabled"),
            AuthError::InsufficientPermissions => write!(f, "Insufficient permissions"),
        }
    }
}

impl StdError for AuthError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Database(DatabaseError),
    Auth(AuthError),
    Config(ConfigError),
    RateLimited { scope: String, retry_after: u64 },
    Internal(String),
}

impl AppError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Database(DatabaseError::UniqueConstraintViolation(msg.into()))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::Database(DatabaseError::NotFound(what.into()))
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        AppError::Validation(ValidationError::Rejected(msg.into()))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            AppError::Database(DatabaseError::UniqueConstraintViolation(_))
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::RateLimited { scope, .. } => write!(f, "Rate limit exceeded for {}", scope),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                AppError::conflict(unique_violation_message(db_err.constraint()))
            }
            sqlx::Error::RowNotFound => AppError::not_found("Record"),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            _ => AppError::Database(DatabaseError::UnexpectedError(err.to_string())),
        }
    }
}

fn unique_violation_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_email_id_key") => "Email already registered",
        Some("users_username_key") => "Username already taken",
        Some("refresh_tokens_jti_key") | Some("refresh_tokens_token_hash_key") => {
            "Refresh token conflict"
        }
        _ => "Duplicate entry",
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            AppError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                e.to_string(),
            ),

            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => {
                    (StatusCode::CONFLICT, "DUPLICATE_ENTRY", e.to_string())
                }
                DatabaseError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string()),
                DatabaseError::ConnectionPool(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service temporarily unavailable".to_string(),
                ),
                DatabaseError::UnexpectedError(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                ),
            },

            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", e.to_string())
                }
                AuthError::TokenInvalid => (StatusCode::UNAUTHORIZED, "TOKEN_INVALID", e.to_string()),
                AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "MISSING_TOKEN", e.to_string()),
                AuthError::AccountDisabled => (StatusCode::FORBIDDEN, "ACCOUNT_DISABLED", e.to_string()),
                AuthError::InsufficientPermissions => {
                    (StatusCode::FORBIDDEN, "INSUFFICIENT_PERMISSIONS", e.to_string())
                }
            },

            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Server configuration error".to_string(),
            ),

            AppError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                self.to_string(),
            ),

            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        let error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                tracing::warn!(request_id = request_id, error = %self, "Duplicate entry attempt");
            }
            AppError::Database(DatabaseError::NotFound(_)) => {
                tracing::info!(request_id = request_id, error = %self, "Record not found");
            }
            AppError::Database(e) => {
                tracing::error!(request_id = request_id, error = %e, "Database error");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
            AppError::RateLimited { scope, retry_after } => {
                tracing::warn!(
                    request_id = request_id,
                    scope = %scope,
                    retry_after = retry_after,
                    "Rate limit exceeded"
                );
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        let mut builder = HttpResponse::build(status);
        if let AppError::RateLimited { retry_after, .. } = self {
            builder.insert_header(("Retry-After", retry_after.to_string()));
        }
        builder.json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => StatusCode::CONFLICT,
                DatabaseError::NotFound(_) => StatusCode::NOT_FOUND,
                DatabaseError::ConnectionPool(_) => StatusCode::SERVICE_UNAVAILABLE,
                DatabaseError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Auth(e) => match e {
                AuthError::AccountDisabled | AuthError::InsufficientPermissions => {
                    StatusCode::FORBIDDEN
                }
                _ => StatusCode::UNAUTHORIZED,
            },
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for handler-level logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<i64>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Validation(_) | AppError::Auth(_) | AppError::RateLimited { .. } => {
                tracing::warn!(error = %error, context = ?context, "Request rejected");
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation(_))
            | AppError::Database(DatabaseError::NotFound(_)) => {
                tracing::warn!(error = %error, context = ?context, "Request rejected");
            }
            _ => {
                tracing::error!(error = %error, context = ?context, "Request failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("email".to_string());
        assert_eq!(err.to_string(), "email is empty");
    }

    #[test]
    fn test_auth_errors_map_to_401_and_403() {
        assert_eq!(
            AppError::Auth(AuthError::InvalidCredentials).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Auth(AuthError::TokenInvalid).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Auth(AuthError::AccountDisabled).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Auth(AuthError::InsufficientPermissions).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_conflict_and_not_found_mapping() {
        let conflict = AppError::conflict("Email already registered");
        assert!(conflict.is_conflict());
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::not_found("User").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::not_found("User").to_string(), "User not found");
    }

    #[test]
    fn test_invalid_credentials_message_is_generic() {
        let (status, body) =
            <AppError as ErrorHandler>::error_response(&AuthError::InvalidCredentials.into(), "r-1");
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.message, "Invalid credentials");
        assert_eq!(body.code, "INVALID_CREDENTIALS");
    }

    #[test]
    fn test_rate_limited_response_carries_retry_after() {
        let err = AppError::RateLimited {
            scope: "auth_login".to_string(),
            retry_after: 42,
        };
        let response = ResponseError::error_response(&err);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("Retry-After").and_then(|v| v.to_str().ok()),
            Some("42")
        );
    }

    #[test]
    fn test_unique_violation_messages() {
        assert_eq!(
            unique_violation_message(Some("users_email_id_key")),
            "Email already registered"
        );
        assert_eq!(
            unique_violation_message(Some("refresh_tokens_jti_key")),
            "Refresh token conflict"
        );
        assert_eq!(unique_violation_message(None), "Duplicate entry");
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("test_operation");
        assert_eq!(ctx.operation, "test_operation");
        assert!(ctx.user_id.is_none());

        let ctx_with_user = ctx.with_user_id(7);
        assert_eq!(ctx_with_user.user_id, Some(7));
    }
}
