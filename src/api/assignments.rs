//! Assignment API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};

use super::{
    error, open_session, revision_after, success, success_with_warnings, ApiResult, ListFilter,
};
use crate::errors::AppError;
use crate::models::{
    Assignment, CreateAssignmentRequest, ForkOutcome, ForkProjectsRequest,
    UpdateAssignmentRequest,
};
use crate::AppState;

/// GET /api/assignments - List assignments, optionally filtered by title.
pub async fn list_assignments(
    State(state): State<AppState>,
    Query(filter): Query<ListFilter>,
) -> ApiResult<Vec<Assignment>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_assignments(filter.title.as_deref()).await {
        Ok(assignments) => success(assignments, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/assignments/:id - Get a single assignment.
pub async fn get_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Assignment> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_assignment(&id).await {
        Ok(Some(assignment)) => success(assignment, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Assignment {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/classrooms/:id/assignments - Create an assignment in a classroom.
///
/// A remote failure still returns the stored assignment, with the failure as a
/// warning; `POST /api/assignments/:id/sync` retries it.
pub async fn create_assignment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(classroom_id): Path<String>,
    Json(request): Json<CreateAssignmentRequest>,
) -> ApiResult<Assignment> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    match state
        .service
        .create_assignment(&session, &classroom_id, &request)
        .await
    {
        Ok(outcome) => success_with_warnings(
            outcome.data,
            outcome.warnings,
            revision_after(&state, revision_id).await,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/assignments/:id - Update an assignment.
pub async fn update_assignment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdateAssignmentRequest>,
) -> ApiResult<Assignment> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    match state.service.update_assignment(&session, &id, &request).await {
        Ok(outcome) => success_with_warnings(
            outcome.data,
            outcome.warnings,
            revision_after(&state, revision_id).await,
        ),
        Err(e) => error(e, revision_after(&state, revision_id).await),
    }
}

/// DELETE /api/assignments/:id - Delete an assignment and its remote group.
pub async fn delete_assignment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    match state.service.delete_assignment(&session, &id).await {
        Ok(outcome) => success_with_warnings(
            outcome.data,
            outcome.warnings,
            revision_after(&state, revision_id).await,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/assignments/:id/sync - Create a pending remote group, or verify an existing one.
pub async fn sync_assignment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Assignment> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    match state.service.sync_assignment(&session, &id).await {
        Ok(outcome) => success_with_warnings(
            outcome.data,
            outcome.warnings,
            revision_after(&state, revision_id).await,
        ),
        Err(e) => error(e, revision_after(&state, revision_id).await),
    }
}

/// POST /api/assignments/:id/forks - Fork a template project for every student.
pub async fn fork_assignment_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<ForkProjectsRequest>,
) -> ApiResult<ForkOutcome> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    match state
        .service
        .fork_assignment_projects(&session, &id, request.template_project_id)
        .await
    {
        Ok(outcome) => {
            tracing::info!(
                assignment_id = %id,
                forked = outcome.report.forked,
                skipped = outcome.report.skipped,
                failed = outcome.report.failures.len(),
                "fork batch finished"
            );
            success(outcome, revision_after(&state, revision_id).await)
        }
        Err(e) => error(e, revision_id),
    }
}
