/// Unified error types for the agent directory service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the directory
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// No principal attached to the request
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// Principal lacks the role required for the action
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Resource does not exist (or was deleted)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Action is not legal for the resource's type or current status
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Missing or malformed parameters
    #[error("Validation error: {0}")]
    Validation(String),

    /// The audit entry could not be written; the mutation was rolled back
    #[error("Audit write failed: {0}")]
    AuditWriteFailed(String),

    /// Transient data store failure (busy, locked, pool exhausted)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DirectoryError {
    /// Stable machine-readable code, used in API bodies and bulk item results
    pub fn code(&self) -> &'static str {
        match self {
            DirectoryError::NotAuthenticated(_) => "NotAuthenticated",
            DirectoryError::PermissionDenied(_) => "PermissionDenied",
            DirectoryError::NotFound(_) => "NotFound",
            DirectoryError::InvalidTransition(_) => "InvalidTransition",
            DirectoryError::Validation(_) => "ValidationError",
            DirectoryError::AuditWriteFailed(_) => "AuditWriteFailed",
            DirectoryError::StoreUnavailable(_) => "StoreUnavailable",
            DirectoryError::Database(_) | DirectoryError::Internal(_) | DirectoryError::Io(_) => {
                "InternalServerError"
            }
        }
    }

    /// Whether retrying the same unit of work may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, DirectoryError::StoreUnavailable(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DirectoryError::NotAuthenticated(_) => StatusCode::UNAUTHORIZED,
            DirectoryError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            DirectoryError::NotFound(_) => StatusCode::NOT_FOUND,
            DirectoryError::InvalidTransition(_) => StatusCode::CONFLICT,
            DirectoryError::Validation(_) => StatusCode::BAD_REQUEST,
            DirectoryError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DirectoryError::AuditWriteFailed(_)
            | DirectoryError::Database(_)
            | DirectoryError::Internal(_)
            | DirectoryError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller
    pub fn public_message(&self) -> String {
        match self {
            DirectoryError::Database(_) | DirectoryError::Internal(_) | DirectoryError::Io(_) => {
                "Internal server error".to_string() // Don't leak details
            }
            DirectoryError::AuditWriteFailed(_) => {
                "The action was not applied because it could not be recorded in the audit log"
                    .to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// SQLite primary result codes for SQLITE_BUSY and SQLITE_LOCKED
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Whether a driver error is a transient infrastructure failure
pub(crate) fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        _ => false,
    }
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient_sqlx(&err) {
            DirectoryError::StoreUnavailable(err.to_string())
        } else {
            DirectoryError::Database(err)
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DirectoryError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DirectoryError::Internal(format!("Migration failed: {}", err))
    }
}

impl From<validator::ValidationErrors> for DirectoryError {
    fn from(err: validator::ValidationErrors) -> Self {
        DirectoryError::Validation(err.to_string())
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert DirectoryError to HTTP response
impl IntoResponse for DirectoryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message: self.public_message(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for directory operations
pub type DirectoryResult<T> = Result<T, DirectoryError>;
