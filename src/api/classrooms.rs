//! Classroom API endpoints.

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
    Classroom, CreateClassroomRequest, EnrollStudentRequest, EnrollmentChange,
    UpdateClassroomRequest,
};
use crate::AppState;

/// GET /api/classrooms - List classrooms, optionally filtered by title.
pub async fn list_classrooms(
    State(state): State<AppState>,
    Query(filter): Query<ListFilter>,
) -> ApiResult<Vec<Classroom>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_classrooms(filter.title.as_deref()).await {
        Ok(classrooms) => success(classrooms, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/classrooms/:id - Get a single classroom.
pub async fn get_classroom(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Classroom> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_classroom(&id).await {
        Ok(Some(classroom)) => success(classroom, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Classroom {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/classrooms - Create a classroom and its remote group tree.
pub async fn create_classroom(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateClassroomRequest>,
) -> ApiResult<Classroom> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    match state.service.create_classroom(&session, &request).await {
        Ok(classroom) => success(classroom, revision_after(&state, revision_id).await),
        Err(e) => error(e, revision_after(&state, revision_id).await),
    }
}

/// PUT /api/classrooms/:id - Update a classroom.
pub async fn update_classroom(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdateClassroomRequest>,
) -> ApiResult<Classroom> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    // A failed remote update may remove the local row, so re-read the revision either way.
    match state.service.update_classroom(&session, &id, &request).await {
        Ok(classroom) => success(classroom, revision_after(&state, revision_id).await),
        Err(e) => error(e, revision_after(&state, revision_id).await),
    }
}

/// DELETE /api/classrooms/:id - Delete a classroom and its remote group tree.
pub async fn delete_classroom(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    match state.service.delete_classroom(&session, &id).await {
        Ok(outcome) => success_with_warnings(
            outcome.data,
            outcome.warnings,
            revision_after(&state, revision_id).await,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/classrooms/:id/students - Enroll a student.
pub async fn add_classroom_student(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<EnrollStudentRequest>,
) -> ApiResult<EnrollmentChange> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    match state
        .service
        .add_classroom_student(&session, &id, &request.student_id)
        .await
    {
        Ok(change) => success(change, revision_after(&state, revision_id).await),
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/classrooms/:id/students/:student_id - Unenroll a student.
pub async fn remove_classroom_student(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, student_id)): Path<(String, String)>,
) -> ApiResult<EnrollmentChange> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let session = match open_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error(e, revision_id),
    };

    match state
        .service
        .remove_classroom_student(&session, &id, &student_id)
        .await
    {
        Ok(change) => success(change, revision_after(&state, revision_id).await),
        Err(e) => error(e, revision_id),
    }
}
