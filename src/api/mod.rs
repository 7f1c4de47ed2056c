//! REST API module.
//!
//! Handlers translate HTTP into [`SyncService`](crate::services::SyncService)
//! calls and wrap results in the `{success, data, revisionId}` envelope.

mod assignments;
mod classrooms;
mod search;
mod session;
mod students;
mod submissions;

pub use assignments::*;
pub use classrooms::*;
pub use search::*;
pub use session::*;
pub use students::*;
pub use submissions::*;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::errors::AppError;
use crate::services::RemoteSession;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            warnings: Vec::new(),
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, crate::errors::AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create a successful API response that carries sync warnings.
pub fn success_with_warnings<T: Serialize>(
    data: T,
    warnings: Vec<String>,
    revision_id: i64,
) -> ApiResult<T> {
    Ok(ApiResponse {
        warnings,
        ..ApiResponse::new(data, revision_id)
    })
}

/// Create an error API response.
pub fn error<T: Serialize>(err: AppError, revision_id: i64) -> ApiResult<T> {
    Err(crate::errors::AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// Case-insensitive substring filter accepted by list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListFilter {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Authenticate the request's remote token and load the teacher behind it.
pub(crate) async fn open_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<RemoteSession, AppError> {
    let token = auth::remote_token(headers, state.config.remote.default_token.as_deref())?;
    state
        .service
        .open_session(state.connector.as_ref(), &token)
        .await
}

/// Current revision, or `fallback` when it cannot be read.
pub(crate) async fn revision_after(state: &AppState, fallback: i64) -> i64 {
    state.repo.get_revision_id().await.unwrap_or(fallback)
}
