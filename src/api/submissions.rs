//! Submission API endpoints. Submissions are local-only and need no remote token.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{error, revision_after, success, ApiResult};
use crate::models::{CreateSubmissionRequest, GradeSubmissionRequest, Submission};
use crate::AppState;

/// GET /api/assignments/:id/submissions - List submissions for an assignment.
pub async fn list_submissions(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> ApiResult<Vec<Submission>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.service.list_submissions(&assignment_id).await {
        Ok(submissions) => success(submissions, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/assignments/:id/submissions - Record a submission.
pub async fn create_submission(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
    Json(request): Json<CreateSubmissionRequest>,
) -> ApiResult<Submission> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .service
        .create_submission(&assignment_id, &request)
        .await
    {
        Ok(submission) => success(submission, revision_after(&state, revision_id).await),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/submissions/:id - Grade a submission.
pub async fn grade_submission(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<GradeSubmissionRequest>,
) -> ApiResult<Submission> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.service.grade_submission(&id, &request).await {
        Ok(submission) => success(submission, revision_after(&state, revision_id).await),
        Err(e) => error(e, revision_id),
    }
}
