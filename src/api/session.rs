//! Session and revision endpoints.

use axum::{extract::State, http::HeaderMap};

use super::{error, open_session, success, ApiResult};
use crate::models::{RevisionInfo, Teacher};
use crate::AppState;

/// GET /api/session - The teacher behind the request's remote token.
pub async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Teacher> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match open_session(&state, &headers).await {
        Ok(session) => success(session.teacher, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/revision - Get the current revision info.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    let revision_info =
        state
            .repo
            .get_revision_info()
            .await
            .map_err(|e| crate::errors::AppErrorWithRevision {
                error: e,
                revision_id: 0,
            })?;

    success(revision_info.clone(), revision_info.revision_id)
}
