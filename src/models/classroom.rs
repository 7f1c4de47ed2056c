//! Classroom model.

use serde::{Deserialize, Serialize};

use crate::sync::MembershipChange;

/// A classroom owned by a teacher and mirrored as a remote group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    pub teacher_id: String,
    pub student_ids: Vec<String>,
    /// Remote group id; `None` until the classroom is synced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_group_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

/// Request body for creating a classroom.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClassroomRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub organization: Option<String>,
}

/// Request body for updating a classroom.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClassroomRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Request body for enrolling a student.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollStudentRequest {
    pub student_id: String,
}

/// Classroom state after a membership change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentChange {
    pub classroom: Classroom,
    pub change: MembershipChange,
}
