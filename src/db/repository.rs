//! Database repository for CRUD operations.
//!
//! Every mutation bumps the entity's `version` and the global revision counter.
//! Updates take an optional expected version and use conditional `UPDATE`s so a
//! concurrent writer is reported instead of overwritten.

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    Assignment, Classroom, CreateAssignmentRequest, CreateClassroomRequest,
    CreateStudentRequest, CreateSubmissionRequest, GradeSubmissionRequest, RevisionInfo,
    Student, Submission, Teacher, UpdateAssignmentRequest, UpdateClassroomRequest,
    UpdateStudentRequest,
};
use crate::remote::RemoteUser;

const TEACHER_COLUMNS: &str = "id, external_id, username, display_name, updated_at";

const STUDENT_COLUMNS: &str = "id, username, external_id, resolved, first_name, last_name, \
     email, student_number, updated_at, version";

const CLASSROOM_COLUMNS: &str = "c.id, c.title, c.description, c.organization, c.teacher_id, \
     c.remote_group_id, c.web_url, c.updated_at, c.version, \
     (SELECT group_concat(cs.student_id) FROM classroom_students cs \
      WHERE cs.classroom_id = c.id) AS student_ids";

const ASSIGNMENT_COLUMNS: &str = "a.id, a.title, a.description, a.deadline, a.classroom_id, \
     a.teacher_id, a.remote_group_id, a.repo_url, a.updated_at, a.version, \
     (SELECT group_concat(s.student_id) FROM assignment_students s \
      WHERE s.assignment_id = a.id) AS student_ids";

const SUBMISSION_COLUMNS: &str = "id, assignment_id, student_id, submitted_on, grade, \
     submission_link, feedback, updated_at, version";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// Increment the revision ID and return the new value.
    pub async fn increment_revision(&self) -> Result<i64, AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        self.get_revision_id().await
    }

    /// Build the error for a conditional write that matched no row.
    async fn stale_write(&self, table: &str, entity: &str, id: &str) -> AppError {
        let sql = format!("SELECT version FROM {} WHERE id = ?", table);
        match sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await {
            Ok(Some(row)) => AppError::Conflict {
                message: format!("Concurrent modification detected for {} {}", entity, id),
                current_version: row.get("version"),
            },
            Ok(None) => AppError::NotFound(format!("{} {} not found", entity, id)),
            Err(e) => e.into(),
        }
    }

    // ==================== TEACHER OPERATIONS ====================

    /// Insert or refresh the teacher mirroring a remote account.
    pub async fn upsert_teacher(&self, user: &RemoteUser) -> Result<Teacher, AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO teachers (id, external_id, username, display_name, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(external_id) DO UPDATE SET
                   username = excluded.username,
                   display_name = excluded.display_name,
                   updated_at = excluded.updated_at"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let sql = format!("SELECT {} FROM teachers WHERE external_id = ?", TEACHER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(user.id)
            .fetch_one(&self.pool)
            .await?;
        Ok(teacher_from_row(&row))
    }

    // ==================== STUDENT OPERATIONS ====================

    /// List students, optionally filtered by a case-insensitive username substring.
    pub async fn list_students(&self, username: Option<&str>) -> Result<Vec<Student>, AppError> {
        let sql = format!(
            "SELECT {} FROM students WHERE (?1 IS NULL OR instr(lower(username), lower(?1)) > 0) ORDER BY username",
            STUDENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(username)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(student_from_row).collect())
    }

    pub async fn get_student(&self, id: &str) -> Result<Option<Student>, AppError> {
        let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(student_from_row))
    }

    /// Resolved students linked to any of the given remote accounts.
    pub async fn find_students_by_external_ids(
        &self,
        external_ids: &[i64],
    ) -> Result<Vec<Student>, AppError> {
        let sql = format!(
            "SELECT {} FROM students WHERE external_id = ? AND resolved = 1",
            STUDENT_COLUMNS
        );
        let mut students = Vec::new();
        for external_id in external_ids {
            if let Some(row) = sqlx::query(&sql)
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?
            {
                students.push(student_from_row(&row));
            }
        }
        Ok(students)
    }

    /// Whether a student other than `except_id` already owns `external_id`.
    pub async fn external_id_taken(
        &self,
        external_id: i64,
        except_id: &str,
    ) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM students WHERE external_id = ? AND id != ?")
            .bind(external_id)
            .bind(except_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") > 0)
    }

    /// Create an unresolved student.
    pub async fn create_student(&self, request: &CreateStudentRequest) -> Result<Student, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"INSERT INTO students
                (id, username, external_id, resolved, first_name, last_name, email, student_number, updated_at, version)
               VALUES (?, ?, NULL, 0, ?, ?, ?, ?, ?, 1)"#,
        )
        .bind(&id)
        .bind(request.username.trim())
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.email)
        .bind(&request.student_number)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        Ok(Student {
            id,
            username: request.username.trim().to_string(),
            external_id: None,
            resolved: false,
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            email: request.email.clone(),
            student_number: request.student_number.clone(),
            updated_at: now,
            version: 1,
        })
    }

    /// Update a student. A changed username drops the remote link.
    pub async fn update_student(
        &self,
        id: &str,
        request: &UpdateStudentRequest,
    ) -> Result<Student, AppError> {
        let existing = self
            .get_student(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))?;
        check_version(request.expected_version, existing.version)?;

        let now = Utc::now().to_rfc3339();
        let new_version = existing.version + 1;

        let username = request
            .username
            .as_deref()
            .map(str::trim)
            .unwrap_or(&existing.username)
            .to_string();
        let username_changed = !username.eq_ignore_ascii_case(&existing.username);
        let (external_id, resolved) = if username_changed {
            (None, false)
        } else {
            (existing.external_id, existing.resolved)
        };
        let first_name = request
            .first_name
            .clone()
            .unwrap_or(existing.first_name.clone());
        let last_name = request
            .last_name
            .clone()
            .unwrap_or(existing.last_name.clone());
        let email = request.email.clone().or(existing.email.clone());
        let student_number = request
            .student_number
            .clone()
            .or(existing.student_number.clone());

        let result = sqlx::query(
            r#"UPDATE students SET
                username = ?, external_id = ?, resolved = ?, first_name = ?, last_name = ?,
                email = ?, student_number = ?, updated_at = ?, version = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(&username)
        .bind(external_id)
        .bind(resolved as i32)
        .bind(&first_name)
        .bind(&last_name)
        .bind(&email)
        .bind(&student_number)
        .bind(&now)
        .bind(new_version)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.stale_write("students", "Student", id).await);
        }

        self.increment_revision().await?;

        Ok(Student {
            id: id.to_string(),
            username,
            external_id,
            resolved,
            first_name,
            last_name,
            email,
            student_number,
            updated_at: now,
            version: new_version,
        })
    }

    /// Record the outcome of an identity lookup.
    pub async fn set_student_identity(
        &self,
        id: &str,
        expected_version: i64,
        external_id: Option<i64>,
        resolved: bool,
    ) -> Result<Student, AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE students SET external_id = ?, resolved = ?, updated_at = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(external_id)
        .bind(resolved as i32)
        .bind(&now)
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.stale_write("students", "Student", id).await);
        }

        self.increment_revision().await?;
        self.get_student(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))
    }

    /// Delete a student.
    pub async fn delete_student(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Student {} not found", id)));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Ids of the classrooms a student is enrolled in.
    pub async fn student_classroom_ids(&self, student_id: &str) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT classroom_id FROM classroom_students WHERE student_id = ?")
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("classroom_id")).collect())
    }

    // ==================== CLASSROOM OPERATIONS ====================

    /// List classrooms, optionally filtered by a case-insensitive title substring.
    pub async fn list_classrooms(&self, title: Option<&str>) -> Result<Vec<Classroom>, AppError> {
        let sql = format!(
            "SELECT {} FROM classrooms c WHERE (?1 IS NULL OR instr(lower(c.title), lower(?1)) > 0) ORDER BY c.title",
            CLASSROOM_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(title).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(classroom_from_row).collect())
    }

    pub async fn get_classroom(&self, id: &str) -> Result<Option<Classroom>, AppError> {
        let sql = format!("SELECT {} FROM classrooms c WHERE c.id = ?", CLASSROOM_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(classroom_from_row))
    }

    /// Create a classroom that is not yet synced.
    pub async fn create_classroom(
        &self,
        teacher_id: &str,
        request: &CreateClassroomRequest,
    ) -> Result<Classroom, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"INSERT INTO classrooms
                (id, title, description, organization, teacher_id, remote_group_id, web_url, updated_at, version)
               VALUES (?, ?, ?, ?, ?, NULL, NULL, ?, 1)"#,
        )
        .bind(&id)
        .bind(request.title.trim())
        .bind(&request.description)
        .bind(&request.organization)
        .bind(teacher_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        Ok(Classroom {
            id,
            title: request.title.trim().to_string(),
            description: request.description.clone(),
            organization: request.organization.clone(),
            teacher_id: teacher_id.to_string(),
            student_ids: Vec::new(),
            remote_group_id: None,
            web_url: None,
            updated_at: now,
            version: 1,
        })
    }

    /// Update a classroom with optimistic concurrency control.
    pub async fn update_classroom(
        &self,
        id: &str,
        request: &UpdateClassroomRequest,
    ) -> Result<Classroom, AppError> {
        let existing = self
            .get_classroom(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Classroom {} not found", id)))?;
        check_version(request.expected_version, existing.version)?;

        let now = Utc::now().to_rfc3339();
        let new_version = existing.version + 1;
        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .unwrap_or(&existing.title)
            .to_string();
        let description = request
            .description
            .clone()
            .unwrap_or(existing.description.clone());
        let organization = request.organization.clone().or(existing.organization.clone());

        let result = sqlx::query(
            "UPDATE classrooms SET title = ?, description = ?, organization = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(&title)
        .bind(&description)
        .bind(&organization)
        .bind(&now)
        .bind(new_version)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.stale_write("classrooms", "Classroom", id).await);
        }

        self.increment_revision().await?;

        Ok(Classroom {
            title,
            description,
            organization,
            updated_at: now,
            version: new_version,
            ..existing
        })
    }

    /// Store the remote group of a classroom, provided nobody wrote the row since
    /// `expected_version` was read.
    pub async fn set_classroom_remote(
        &self,
        id: &str,
        expected_version: i64,
        remote_group_id: i64,
        web_url: &str,
    ) -> Result<Classroom, AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE classrooms SET remote_group_id = ?, web_url = ?, updated_at = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(remote_group_id)
        .bind(web_url)
        .bind(&now)
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.stale_write("classrooms", "Classroom", id).await);
        }

        self.increment_revision().await?;
        self.get_classroom(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Classroom {} not found", id)))
    }

    /// Delete a classroom together with its assignments and links.
    pub async fn delete_classroom(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM classrooms WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Classroom {} not found", id)));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Link a student to a classroom. Linking twice is a no-op.
    pub async fn enroll_student(
        &self,
        classroom_id: &str,
        student_id: &str,
    ) -> Result<Classroom, AppError> {
        self.change_link(
            "INSERT OR IGNORE INTO classroom_students (classroom_id, student_id) VALUES (?, ?)",
            "UPDATE classrooms SET updated_at = ?, version = version + 1 WHERE id = ?",
            classroom_id,
            student_id,
        )
        .await?;
        self.get_classroom(classroom_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Classroom {} not found", classroom_id)))
    }

    /// Remove a student's classroom link. Missing links are a no-op.
    pub async fn unenroll_student(
        &self,
        classroom_id: &str,
        student_id: &str,
    ) -> Result<Classroom, AppError> {
        self.change_link(
            "DELETE FROM classroom_students WHERE classroom_id = ? AND student_id = ?",
            "UPDATE classrooms SET updated_at = ?, version = version + 1 WHERE id = ?",
            classroom_id,
            student_id,
        )
        .await?;
        self.get_classroom(classroom_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Classroom {} not found", classroom_id)))
    }

    /// Apply a link change and bump the owner's version when a row changed.
    async fn change_link(
        &self,
        link_sql: &str,
        touch_sql: &str,
        owner_id: &str,
        student_id: &str,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let changed = sqlx::query(link_sql)
            .bind(owner_id)
            .bind(student_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if changed {
            let now = Utc::now().to_rfc3339();
            sqlx::query(touch_sql)
                .bind(&now)
                .bind(owner_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1",
            )
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(changed)
    }

    // ==================== ASSIGNMENT OPERATIONS ====================

    /// List assignments, optionally filtered by a case-insensitive title substring.
    pub async fn list_assignments(&self, title: Option<&str>) -> Result<Vec<Assignment>, AppError> {
        let sql = format!(
            "SELECT {} FROM assignments a WHERE (?1 IS NULL OR instr(lower(a.title), lower(?1)) > 0) ORDER BY a.title",
            ASSIGNMENT_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(title).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(assignment_from_row).collect())
    }

    pub async fn list_classroom_assignments(
        &self,
        classroom_id: &str,
    ) -> Result<Vec<Assignment>, AppError> {
        let sql = format!(
            "SELECT {} FROM assignments a WHERE a.classroom_id = ? ORDER BY a.title",
            ASSIGNMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(classroom_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(assignment_from_row).collect())
    }

    pub async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, AppError> {
        let sql = format!("SELECT {} FROM assignments a WHERE a.id = ?", ASSIGNMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(assignment_from_row))
    }

    /// Create an assignment that is pending remotely.
    pub async fn create_assignment(
        &self,
        classroom_id: &str,
        teacher_id: &str,
        request: &CreateAssignmentRequest,
    ) -> Result<Assignment, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let deadline = request.deadline.map(|d| d.to_rfc3339());

        sqlx::query(
            r#"INSERT INTO assignments
                (id, title, description, deadline, classroom_id, teacher_id, remote_group_id, repo_url, updated_at, version)
               VALUES (?, ?, ?, ?, ?, ?, NULL, NULL, ?, 1)"#,
        )
        .bind(&id)
        .bind(request.title.trim())
        .bind(&request.description)
        .bind(&deadline)
        .bind(classroom_id)
        .bind(teacher_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        Ok(Assignment {
            id,
            title: request.title.trim().to_string(),
            description: request.description.clone(),
            deadline,
            classroom_id: classroom_id.to_string(),
            teacher_id: teacher_id.to_string(),
            student_ids: Vec::new(),
            remote_group_id: None,
            repo_url: None,
            updated_at: now,
            version: 1,
        })
    }

    /// Update an assignment with optimistic concurrency control.
    pub async fn update_assignment(
        &self,
        id: &str,
        request: &UpdateAssignmentRequest,
    ) -> Result<Assignment, AppError> {
        let existing = self
            .get_assignment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", id)))?;
        check_version(request.expected_version, existing.version)?;

        let now = Utc::now().to_rfc3339();
        let new_version = existing.version + 1;
        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .unwrap_or(&existing.title)
            .to_string();
        let description = request
            .description
            .clone()
            .unwrap_or(existing.description.clone());
        let deadline = request
            .deadline
            .map(|d| d.to_rfc3339())
            .or(existing.deadline.clone());

        let result = sqlx::query(
            "UPDATE assignments SET title = ?, description = ?, deadline = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(&title)
        .bind(&description)
        .bind(&deadline)
        .bind(&now)
        .bind(new_version)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.stale_write("assignments", "Assignment", id).await);
        }

        self.increment_revision().await?;

        Ok(Assignment {
            title,
            description,
            deadline,
            updated_at: now,
            version: new_version,
            ..existing
        })
    }

    /// Store the remote group of an assignment, conditional on `expected_version`.
    pub async fn set_assignment_remote(
        &self,
        id: &str,
        expected_version: i64,
        remote_group_id: i64,
        repo_url: &str,
    ) -> Result<Assignment, AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE assignments SET remote_group_id = ?, repo_url = ?, updated_at = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(remote_group_id)
        .bind(repo_url)
        .bind(&now)
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.stale_write("assignments", "Assignment", id).await);
        }

        self.increment_revision().await?;
        self.get_assignment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", id)))
    }

    /// Forget a remote group that no longer exists; the assignment becomes pending.
    pub async fn clear_assignment_remote(
        &self,
        id: &str,
        expected_version: i64,
    ) -> Result<Assignment, AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE assignments SET remote_group_id = NULL, repo_url = NULL, updated_at = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(&now)
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.stale_write("assignments", "Assignment", id).await);
        }

        self.increment_revision().await?;
        self.get_assignment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", id)))
    }

    /// Delete an assignment.
    pub async fn delete_assignment(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM assignments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Assignment {} not found", id)));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Link students to an assignment; existing links are kept.
    pub async fn assign_students(
        &self,
        assignment_id: &str,
        student_ids: &[String],
    ) -> Result<Assignment, AppError> {
        for student_id in student_ids {
            self.change_link(
                "INSERT OR IGNORE INTO assignment_students (assignment_id, student_id) VALUES (?, ?)",
                "UPDATE assignments SET updated_at = ?, version = version + 1 WHERE id = ?",
                assignment_id,
                student_id,
            )
            .await?;
        }
        self.get_assignment(assignment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", assignment_id)))
    }

    // ==================== SUBMISSION OPERATIONS ====================

    pub async fn list_submissions(&self, assignment_id: &str) -> Result<Vec<Submission>, AppError> {
        let sql = format!(
            "SELECT {} FROM submissions WHERE assignment_id = ? ORDER BY submitted_on, id",
            SUBMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(assignment_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(submission_from_row).collect())
    }

    pub async fn get_submission(&self, id: &str) -> Result<Option<Submission>, AppError> {
        let sql = format!("SELECT {} FROM submissions WHERE id = ?", SUBMISSION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(submission_from_row))
    }

    /// Record a submission; a second one for the same student is a conflict.
    pub async fn create_submission(
        &self,
        assignment_id: &str,
        request: &CreateSubmissionRequest,
    ) -> Result<Submission, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let submitted_on = request
            .submitted_on
            .unwrap_or_else(|| now.date_naive())
            .format("%Y-%m-%d")
            .to_string();
        let now = now.to_rfc3339();

        sqlx::query(
            r#"INSERT INTO submissions
                (id, assignment_id, student_id, submitted_on, grade, submission_link, feedback, updated_at, version)
               VALUES (?, ?, ?, ?, NULL, ?, NULL, ?, 1)"#,
        )
        .bind(&id)
        .bind(assignment_id)
        .bind(&request.student_id)
        .bind(&submitted_on)
        .bind(&request.submission_link)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        Ok(Submission {
            id,
            assignment_id: assignment_id.to_string(),
            student_id: request.student_id.clone(),
            submitted_on,
            grade: None,
            submission_link: request.submission_link.clone(),
            feedback: None,
            updated_at: now,
            version: 1,
        })
    }

    /// Set grade and feedback on a submission.
    pub async fn grade_submission(
        &self,
        id: &str,
        request: &GradeSubmissionRequest,
    ) -> Result<Submission, AppError> {
        let existing = self
            .get_submission(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Submission {} not found", id)))?;
        check_version(request.expected_version, existing.version)?;

        let now = Utc::now().to_rfc3339();
        let new_version = existing.version + 1;
        let grade = request.grade.clone().or(existing.grade.clone());
        let feedback = request.feedback.clone().or(existing.feedback.clone());

        let result = sqlx::query(
            "UPDATE submissions SET grade = ?, feedback = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(&grade)
        .bind(&feedback)
        .bind(&now)
        .bind(new_version)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.stale_write("submissions", "Submission", id).await);
        }

        self.increment_revision().await?;

        Ok(Submission {
            grade,
            feedback,
            updated_at: now,
            version: new_version,
            ..existing
        })
    }
}

pub fn check_version(expected: Option<i64>, current: i64) -> Result<(), AppError> {
    match expected {
        Some(expected) if expected != current => Err(AppError::Conflict {
            message: format!(
                "Version mismatch: expected {}, current {}",
                expected, current
            ),
            current_version: current,
        }),
        _ => Ok(()),
    }
}

// Helper functions for row conversion

fn teacher_from_row(row: &SqliteRow) -> Teacher {
    Teacher {
        id: row.get("id"),
        external_id: row.get("external_id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        updated_at: row.get("updated_at"),
    }
}

fn student_from_row(row: &SqliteRow) -> Student {
    let resolved: i32 = row.get("resolved");
    Student {
        id: row.get("id"),
        username: row.get("username"),
        external_id: row.get("external_id"),
        resolved: resolved != 0,
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        student_number: row.get("student_number"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

fn classroom_from_row(row: &SqliteRow) -> Classroom {
    Classroom {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        organization: row.get("organization"),
        teacher_id: row.get("teacher_id"),
        student_ids: split_ids(row.get("student_ids")),
        remote_group_id: row.get("remote_group_id"),
        web_url: row.get("web_url"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

fn assignment_from_row(row: &SqliteRow) -> Assignment {
    Assignment {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        deadline: row.get("deadline"),
        classroom_id: row.get("classroom_id"),
        teacher_id: row.get("teacher_id"),
        student_ids: split_ids(row.get("student_ids")),
        remote_group_id: row.get("remote_group_id"),
        repo_url: row.get("repo_url"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

fn submission_from_row(row: &SqliteRow) -> Submission {
    Submission {
        id: row.get("id"),
        assignment_id: row.get("assignment_id"),
        student_id: row.get("student_id"),
        submitted_on: row.get("submitted_on"),
        grade: row.get("grade"),
        submission_link: row.get("submission_link"),
        feedback: row.get("feedback"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

/// Split a `group_concat` of ids into a sorted list.
fn split_ids(joined: Option<String>) -> Vec<String> {
    let mut ids: Vec<String> = joined
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    ids.sort();
    ids
}
