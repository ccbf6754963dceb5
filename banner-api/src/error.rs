//! Error Types for the Banner API
//!
//! This module defines error handling for the HTTP layer:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - ErrorRenderer, which turns a domain error into an ApiError at the
//!   verbosity chosen at startup
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use banner_core::{BannerError, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur during API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request carries no role token
    Unauthorized,

    /// Role token is not allowed on this endpoint
    Forbidden,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// Field value is out of valid range
    InvalidRange,

    /// Path or query parameter could not be parsed
    InvalidFormat,

    /// Tag/feature pair already bound to another banner
    BindingConflict,

    /// Patch would not change the banner
    NothingToUpdate,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Banner does not exist, or is hidden from the caller
    BannerNotFound,

    /// Requested version is not retained for the banner
    VersionNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Concurrent modification detected (optimistic locking failure)
    ConcurrentModification,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Durable store operation failed
    DatabaseError,

    /// Cache store operation failed
    CacheError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::InvalidInput
            | ErrorCode::InvalidRange
            | ErrorCode::InvalidFormat
            | ErrorCode::BindingConflict
            | ErrorCode::NothingToUpdate => StatusCode::BAD_REQUEST,

            ErrorCode::BannerNotFound | ErrorCode::VersionNotFound => StatusCode::NOT_FOUND,

            ErrorCode::ConcurrentModification => StatusCode::CONFLICT,

            ErrorCode::InternalError | ErrorCode::DatabaseError | ErrorCode::CacheError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::InvalidRange => "Value is out of valid range",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::BindingConflict => "Tag/feature pair already bound to another banner",
            ErrorCode::NothingToUpdate => "Nothing to update",
            ErrorCode::BannerNotFound => "Banner not found",
            ErrorCode::VersionNotFound => "Banner version not found",
            ErrorCode::ConcurrentModification => "Concurrent modification detected",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::CacheError => "Cache operation failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Error kind and named context fields, present only in verbose mode
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create an InvalidRange error.
    pub fn invalid_range(field: &str, min: impl fmt::Display, max: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidRange,
            format!("Field '{}' must be between {} and {}", field, min, max),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// DOMAIN ERROR RENDERING
// ============================================================================

/// How much of a domain error reaches the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorVerbosity {
    /// Code and message only. Internal failures get a generic message.
    #[default]
    Terse,
    /// Adds `details = { kind, context }` and the underlying failure text.
    Verbose,
}

impl FromStr for ErrorVerbosity {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "terse" => Ok(Self::Terse),
            "verbose" => Ok(Self::Verbose),
            other => Err(ApiError::invalid_input(format!(
                "Unknown error verbosity '{}', expected terse or verbose",
                other
            ))),
        }
    }
}

/// Converts [`BannerError`] into [`ApiError`] at a fixed verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorRenderer {
    verbosity: ErrorVerbosity,
}

impl ErrorRenderer {
    pub fn new(verbosity: ErrorVerbosity) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> ErrorVerbosity {
        self.verbosity
    }

    pub fn render(&self, err: BannerError) -> ApiError {
        let code = error_code(&err);
        let kind = err.kind();

        if kind == ErrorKind::Internal {
            tracing::error!(code = %code, error = %err, "request failed");
        }

        let message = match (kind, self.verbosity) {
            (ErrorKind::Internal, ErrorVerbosity::Terse) => code.default_message().to_string(),
            _ => err.to_string(),
        };
        let api_error = ApiError::new(code, message);

        match self.verbosity {
            ErrorVerbosity::Terse => api_error,
            ErrorVerbosity::Verbose => api_error.with_details(json!({
                "kind": kind,
                "context": err.context(),
            })),
        }
    }
}

fn error_code(err: &BannerError) -> ErrorCode {
    match err {
        BannerError::BannerNotFound { .. }
        | BannerError::KeyNotFound { .. }
        | BannerError::Hidden { .. } => ErrorCode::BannerNotFound,
        BannerError::VersionNotFound { .. } => ErrorCode::VersionNotFound,
        BannerError::BindingConflict { .. } => ErrorCode::BindingConflict,
        BannerError::NothingToUpdate { .. } => ErrorCode::NothingToUpdate,
        BannerError::InvalidInput { .. } => ErrorCode::InvalidInput,
        BannerError::ConcurrentModification { .. } => ErrorCode::ConcurrentModification,
        BannerError::Storage(_) => ErrorCode::DatabaseError,
        BannerError::Cache(_) => ErrorCode::CacheError,
    }
}

/// Terse rendering, for paths that have no renderer at hand (startup).
impl From<BannerError> for ApiError {
    fn from(err: BannerError) -> Self {
        ErrorRenderer::default().render(err)
    }
}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM EXTRACTOR REJECTIONS
// ============================================================================

impl From<PathRejection> for ApiError {
    fn from(err: PathRejection) -> Self {
        ApiError::new(ErrorCode::InvalidFormat, err.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::new(ErrorCode::InvalidFormat, err.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::invalid_input(err.body_text())
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
