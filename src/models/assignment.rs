//! Assignment model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::ForkReport;

/// An assignment inside a classroom, mirrored as a group under ASSIGNMENTS.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub title: String,
    pub description: String,
    /// RFC 3339 timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    pub classroom_id: String,
    pub teacher_id: String,
    pub student_ids: Vec<String>,
    /// Remote group id; `None` while the assignment is pending remotely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_group_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

impl Assignment {
    pub fn is_pending(&self) -> bool {
        self.remote_group_id.is_none()
    }
}

/// Request body for creating an assignment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssignmentRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// Request body for updating an assignment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAssignmentRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Request body for forking a template into every student's namespace.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkProjectsRequest {
    pub template_project_id: i64,
}

/// Assignment state after a fork batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkOutcome {
    pub assignment: Assignment,
    pub report: ForkReport,
}
