//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service, and how each
//! failure is rendered as an HTTP response.

use axum::{
    extract::rejection::{PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use memoria_core::errors::message_template;
use memoria_core::{AuthError, FieldErrors, PlatformError, PortError, SubmissionError};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::config::ConfigError;

/// The JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    /// Field name to message, for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub fields: Option<FieldErrors>,
}

/// The primary error type for the `portal` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A platform failure, already translated into the Spanish vocabulary.
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// One or more fields failed validation.
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// No usable session cookie.
    #[error("No active session")]
    Unauthenticated,

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl From<PortError> for ApiError {
    fn from(err: PortError) -> Self {
        ApiError::Platform(err.into())
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::Invalid(fields) => ApiError::Validation(fields),
            SubmissionError::Platform(err) => ApiError::Platform(err),
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(fields: FieldErrors) -> Self {
        ApiError::Validation(fields)
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// The HTTP status for a platform error code.
pub fn status_for_code(code: &str) -> StatusCode {
    match code {
        "validation-error" | "required-field" | "invalid-phone" => StatusCode::UNPROCESSABLE_ENTITY,
        "not-found" | "storage/object-not-found" => StatusCode::NOT_FOUND,
        "permission-denied" | "not-admin" | "firestore/permission-denied" | "storage/unauthorized" => {
            StatusCode::FORBIDDEN
        }
        "unauthenticated" | "storage/unauthenticated" => StatusCode::UNAUTHORIZED,
        "invalid-transition" => StatusCode::CONFLICT,
        "file-too-large" | "invalid-file-type" | "file-required" | "file-corrupted" | "file-empty"
        | "storage/invalid-format" => StatusCode::BAD_REQUEST,
        "auth/too-many-requests" => StatusCode::TOO_MANY_REQUESTS,
        code if code.starts_with("auth/") => StatusCode::UNAUTHORIZED,
        code if memoria_core::errors::is_retryable(code) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, ErrorBody) {
        let body = |code: &str, message: String| ErrorBody {
            code: code.to_string(),
            message,
            fields: None,
        };
        match self {
            ApiError::Platform(err) => (status_for_code(&err.code), body(&err.code, err.user_message.clone())),
            ApiError::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    code: "validation-error".to_string(),
                    message: message_template("validation-error").to_string(),
                    fields: Some(fields.clone()),
                },
            ),
            ApiError::Auth(err) => (status_for_code(err.code()), body(err.code(), err.user_message())),
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                body("unauthenticated", message_template("unauthenticated").to_string()),
            ),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, body("bad-request", message.clone())),
            ApiError::Config(_) | ApiError::Io(_) | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                body("unknown-error", message_template("unknown-error").to_string()),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.parts();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(body)).into_response()
    }
}
