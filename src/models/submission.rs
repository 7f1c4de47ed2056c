//! Submission model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Longest accepted grade, e.g. "A+" or "10".
pub const MAX_GRADE_LEN: usize = 2;

/// A student's hand-in for an assignment. At most one per (assignment, student).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    /// Calendar date, `YYYY-MM-DD`
    pub submitted_on: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub updated_at: String,
    #[serde(default)]
    pub version: i64,
}

/// Request body for recording a submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubmissionRequest {
    pub student_id: String,
    #[serde(default)]
    pub submission_link: Option<String>,
    /// Defaults to today
    #[serde(default)]
    pub submitted_on: Option<NaiveDate>,
}

/// Request body for grading a submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSubmissionRequest {
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}
