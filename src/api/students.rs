//! Student API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};

use super::{
    error, open_session, revision_after, success, success_with_warnings, ApiResult, ListFilter,
};
use crate::errors::AppError;
use crate::models::{CreateStudentRequest, Student, StudentResolution, UpdateStudentRequest};
use crate::AppState;

/// GET /api/students - List students, optionally filtered by username.
pub async fn list_students(
    State(state): State<AppState>,
    Query(filter): Query<ListFilter>,
) -> ApiResult<Vec<Student>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_students(filter.username.as_deref()).await {
        Ok(students) => success(students, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/students/:id - Get a single student.
pub async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Student> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_student(&id).await {
        Ok(Some(student)) => success(student, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Student {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/students - Create a student and look up their remote account.
pub async fn create_student(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateStudentRequest>,
) -> ApiResult<StudentResolution> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    match state.service.create_student(&session, &request).await {
        Ok(resolved) => success(resolved, revision_after(&state, revision_id).await),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/students/:id - Update a student.
pub async fn update_student(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdateStudentRequest>,
) -> ApiResult<StudentResolution> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    match state.service.update_student(&session, &id, &request).await {
        Ok(resolved) => success(resolved, revision_after(&state, revision_id).await),
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/students/:id - Delete a student and revoke their memberships.
pub async fn delete_student(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    match state.service.delete_student(&session, &id).await {
        Ok(outcome) => success_with_warnings(
            outcome.data,
            outcome.warnings,
            revision_after(&state, revision_id).await,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/students/:id/resolve - Look up the student's remote account again.
pub async fn resolve_student(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StudentResolution> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    match state.service.resolve_student(&session, &id).await {
        Ok(resolved) => success(resolved, revision_after(&state, revision_id).await),
        Err(e) => error(e, revision_id),
    }
}
