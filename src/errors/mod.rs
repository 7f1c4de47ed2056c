//! Error handling module for the classroom sync backend.
//!
//! Provides centralized error types with mapping to HTTP status codes and response envelopes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::sync::SyncError;

/// Error codes as constants to avoid stringly-typed errors.
#[allow(dead_code)]
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const INVALID_PSK: &str = "INVALID_PSK";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const CONFLICT: &str = "CONFLICT";
    pub const VERSION_MISMATCH: &str = "VERSION_MISMATCH";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const SEARCH_ERROR: &str = "SEARCH_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const REMOTE_NOT_FOUND: &str = "REMOTE_NOT_FOUND";
    pub const REMOTE_CREATE_FAILED: &str = "REMOTE_CREATE_FAILED";
    pub const REMOTE_UPDATE_FAILED: &str = "REMOTE_UPDATE_FAILED";
    pub const REMOTE_DELETE_FAILED: &str = "REMOTE_DELETE_FAILED";
    pub const REMOTE_AUTH: &str = "REMOTE_AUTH";
    pub const UNRESOLVED_IDENTITY: &str = "UNRESOLVED_IDENTITY";
    pub const TEMPLATE_NOT_FOUND: &str = "TEMPLATE_NOT_FOUND";
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Authentication required
    Unauthorized(String),
    /// Authenticated, but not the owner of the entity
    Forbidden(String),
    /// Resource not found
    NotFound(String),
    /// Validation error
    Validation(String),
    /// Unique constraint violated (title, username, external id)
    Duplicate(String),
    /// Optimistic concurrency conflict
    Conflict {
        message: String,
        current_version: i64,
    },
    /// Remote synchronization failure
    Remote {
        code: &'static str,
        status: StatusCode,
        message: String,
    },
    /// Database error
    Database(String),
    /// Search index error
    Search(String),
    /// Internal server error
    Internal(String),
    /// Bad request
    BadRequest(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Remote { status, .. } => *status,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Search(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::Forbidden(_) => codes::FORBIDDEN,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::Duplicate(_) => codes::CONFLICT,
            AppError::Conflict { .. } => codes::VERSION_MISMATCH,
            AppError::Remote { code, .. } => *code,
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Search(_) => codes::SEARCH_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::Forbidden(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Duplicate(msg) => msg.clone(),
            AppError::Conflict { message, .. } => message.clone(),
            AppError::Remote { message, .. } => message.clone(),
            AppError::Database(msg) => msg.clone(),
            AppError::Search(msg) => msg.clone(),
            AppError::Internal(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
        }
    }

    /// Append a note about the local outcome to a remote error message.
    pub fn with_note(self, note: &str) -> Self {
        match self {
            AppError::Remote {
                code,
                status,
                message,
            } => AppError::Remote {
                code,
                status,
                message: format!("{message}; {note}"),
            },
            other => other,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                tracing::debug!("Unique constraint violated: {}", db_err);
                return AppError::Duplicate(format!("Already exists: {}", db_err.message()));
            }
        }
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

impl From<tantivy::TantivyError> for AppError {
    fn from(err: tantivy::TantivyError) -> Self {
        tracing::error!("Search error: {:?}", err);
        AppError::Search(format!("Search error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        let (code, status) = match &err {
            SyncError::RemoteNotFound { .. } => (codes::REMOTE_NOT_FOUND, StatusCode::CONFLICT),
            SyncError::RemoteCreate { .. } => (codes::REMOTE_CREATE_FAILED, StatusCode::BAD_GATEWAY),
            SyncError::RemoteUpdate { .. } => (codes::REMOTE_UPDATE_FAILED, StatusCode::BAD_GATEWAY),
            SyncError::RemoteDelete { .. } => (codes::REMOTE_DELETE_FAILED, StatusCode::BAD_GATEWAY),
            SyncError::RemoteAuth { .. } => (codes::REMOTE_AUTH, StatusCode::UNAUTHORIZED),
            SyncError::UnresolvedIdentity { .. } => {
                (codes::UNRESOLVED_IDENTITY, StatusCode::UNPROCESSABLE_ENTITY)
            }
            SyncError::TemplateNotFound { .. } => (codes::TEMPLATE_NOT_FOUND, StatusCode::NOT_FOUND),
        };
        AppError::Remote {
            code,
            status,
            message: err.to_string(),
        }
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
    pub revision_id: i64,
}

impl ErrorResponse {
    pub fn new(error: &AppError, revision_id: i64) -> Self {
        let details = match error {
            AppError::Conflict {
                current_version, ..
            } => Some(serde_json::json!({ "currentVersion": current_version })),
            _ => None,
        };

        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
                details,
            },
            revision_id,
        }
    }
}

/// Wrapper type for errors that carry revision_id context.
pub struct AppErrorWithRevision {
    pub error: AppError,
    pub revision_id: i64,
}

impl IntoResponse for AppErrorWithRevision {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let body = ErrorResponse::new(&self.error, self.revision_id);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;

    #[test]
    fn test_sync_error_mapping() {
        let cases = [
            (
                SyncError::RemoteNotFound {
                    entity: "group 1".to_string(),
                    source: RemoteError::not_found("groups/1"),
                },
                codes::REMOTE_NOT_FOUND,
                StatusCode::CONFLICT,
            ),
            (
                SyncError::create("group 1", RemoteError::Timeout),
                codes::REMOTE_CREATE_FAILED,
                StatusCode::BAD_GATEWAY,
            ),
            (
                SyncError::update("group 1", RemoteError::Unauthorized),
                codes::REMOTE_AUTH,
                StatusCode::UNAUTHORIZED,
            ),
            (
                SyncError::UnresolvedIdentity {
                    username: "ghost".to_string(),
                },
                codes::UNRESOLVED_IDENTITY,
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                SyncError::TemplateNotFound { template_id: 5 },
                codes::TEMPLATE_NOT_FOUND,
                StatusCode::NOT_FOUND,
            ),
        ];

        for (sync_err, code, status) in cases {
            let app_err = AppError::from(sync_err);
            assert_eq!(app_err.error_code(), code);
            assert_eq!(app_err.status_code(), status);
        }
    }

    #[test]
    fn test_note_only_applies_to_remote_errors() {
        let err = AppError::from(SyncError::update("group 1", RemoteError::Timeout))
            .with_note("local classroom was removed");
        assert!(err.message().ends_with("; local classroom was removed"));

        let err = AppError::NotFound("Classroom x not found".to_string()).with_note("ignored");
        assert_eq!(err.message(), "Classroom x not found");
    }

    #[test]
    fn test_conflict_envelope_carries_version() {
        let err = AppError::Conflict {
            message: "Version mismatch".to_string(),
            current_version: 4,
        };
        let body = ErrorResponse::new(&err, 9);
        assert_eq!(body.error.code, codes::VERSION_MISMATCH);
        assert_eq!(body.error.details.unwrap()["currentVersion"], 4);
        assert_eq!(body.revision_id, 9);
    }
}
