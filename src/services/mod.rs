//! Lifecycle orchestration: local write, remote sync, then persist the remote id
//! or roll back according to the configured [`ConsistencyPolicy`].

use std::sync::Arc;

use crate::db::{check_version, Repository};
use crate::errors::AppError;
use crate::models::{
    Assignment, Classroom, CreateAssignmentRequest, CreateClassroomRequest, CreateStudentRequest,
    CreateSubmissionRequest, EnrollmentChange, ForkOutcome, GradeSubmissionRequest, Student,
    StudentResolution, Submission, SyncOutcome, Teacher, UpdateAssignmentRequest,
    UpdateClassroomRequest, UpdateStudentRequest, MAX_GRADE_LEN,
};
use crate::remote::{RemoteConnector, RemoteNamespaceClient};
use crate::search::{SearchEntry, SearchIndex};
use crate::sync::{
    assignment_key, classroom_key, sanitize, student_key, ConsistencyPolicy, EntityLocks,
    ForkBatchOperator, ForkTarget, HierarchySyncEngine, IdentityResolution, IdentityResolver,
    MembershipChange, MembershipReconciler, RemoteDeletion, SyncError,
};

/// Remote client and authenticated teacher for one request.
#[derive(Clone)]
pub struct RemoteSession {
    pub client: Arc<dyn RemoteNamespaceClient>,
    pub teacher: Teacher,
}

/// Orchestrates every operation that touches both the local store and the remote
/// namespace.
#[derive(Clone)]
pub struct SyncService {
    repo: Arc<Repository>,
    search: Arc<SearchIndex>,
    locks: Arc<EntityLocks>,
    policy: ConsistencyPolicy,
}

impl SyncService {
    pub fn new(repo: Arc<Repository>, search: Arc<SearchIndex>, policy: ConsistencyPolicy) -> Self {
        Self {
            repo,
            search,
            locks: Arc::new(EntityLocks::new()),
            policy,
        }
    }

    /// Authenticate against the remote service and mirror the account as a teacher.
    pub async fn open_session(
        &self,
        connector: &dyn RemoteConnector,
        token: &str,
    ) -> Result<RemoteSession, AppError> {
        let client = connector
            .connect(token)
            .map_err(|e| SyncError::update("session account", e))?;
        let user = client
            .current_user()
            .await
            .map_err(|e| SyncError::lookup("session account", e, SyncError::update))?;
        let teacher = self.repo.upsert_teacher(&user).await?;
        Ok(RemoteSession { client, teacher })
    }

    // ==================== CLASSROOMS ====================

    /// Create a classroom and its remote group tree. A remote failure removes the
    /// local row again.
    pub async fn create_classroom(
        &self,
        session: &RemoteSession,
        request: &CreateClassroomRequest,
    ) -> Result<Classroom, AppError> {
        validate_title(&request.title)?;

        let local = self
            .repo
            .create_classroom(&session.teacher.id, request)
            .await?;

        let engine = HierarchySyncEngine::new(session.client.clone());
        let namespace = match engine
            .create_classroom_namespace(&local.title, &local.description)
            .await
        {
            Ok(namespace) => namespace,
            Err(e) => {
                tracing::warn!(classroom_id = %local.id, error = %e, "classroom sync failed; removing local row");
                if let Err(db_err) = self.repo.delete_classroom(&local.id).await {
                    tracing::error!(classroom_id = %local.id, error = %db_err, "failed to remove unsynced classroom");
                }
                return Err(AppError::from(e).with_note("classroom was not created"));
            }
        };

        let classroom = self
            .repo
            .set_classroom_remote(
                &local.id,
                local.version,
                namespace.group.id,
                &namespace.group.web_url,
            )
            .await?;
        self.reindex(SearchEntry::from(&classroom)).await;

        tracing::info!(
            classroom_id = %classroom.id,
            group_id = namespace.group.id,
            members_id = namespace.members.id,
            assignments_id = namespace.assignments.id,
            "classroom created"
        );
        Ok(classroom)
    }

    /// Update a classroom's title/description locally and remotely.
    pub async fn update_classroom(
        &self,
        session: &RemoteSession,
        id: &str,
        request: &UpdateClassroomRequest,
    ) -> Result<Classroom, AppError> {
        let _guard = self.locks.acquire(classroom_key(id)).await;

        let existing = self.classroom(id).await?;
        ensure_owner(session, &existing.teacher_id, "classroom", id)?;
        check_version(request.expected_version, existing.version)?;
        if let Some(title) = &request.title {
            validate_title(title)?;
        }

        let title = request.title.as_deref().unwrap_or(&existing.title).trim();
        let description = request
            .description
            .as_deref()
            .unwrap_or(&existing.description);

        let engine = HierarchySyncEngine::new(session.client.clone());
        if let Some(group_id) = existing.remote_group_id {
            if let Err(e) = engine
                .update_classroom_namespace(group_id, title, description)
                .await
            {
                return Err(self.unverified_classroom(&existing, e).await);
            }
        }

        let classroom = match self
            .repo
            .update_classroom(
                id,
                &UpdateClassroomRequest {
                    expected_version: Some(existing.version),
                    ..request.clone()
                },
            )
            .await
        {
            Ok(classroom) => classroom,
            Err(e) => {
                if let Some(group_id) = existing.remote_group_id {
                    if let Err(restore) = engine
                        .update_classroom_namespace(group_id, &existing.title, &existing.description)
                        .await
                    {
                        tracing::error!(classroom_id = %id, group_id, error = %restore, "could not restore remote group after failed local update");
                    }
                }
                return Err(e);
            }
        };
        self.reindex(SearchEntry::from(&classroom)).await;
        Ok(classroom)
    }

    /// Delete a classroom and its remote group tree.
    pub async fn delete_classroom(
        &self,
        session: &RemoteSession,
        id: &str,
    ) -> Result<SyncOutcome<()>, AppError> {
        let _guard = self.locks.acquire(classroom_key(id)).await;

        let existing = self.classroom(id).await?;
        ensure_owner(session, &existing.teacher_id, "classroom", id)?;

        let mut warnings = Vec::new();
        if let Some(group_id) = existing.remote_group_id {
            let engine = HierarchySyncEngine::new(session.client.clone());
            match engine.delete_classroom_namespace(group_id).await {
                Ok(RemoteDeletion::Deleted) => {}
                Ok(RemoteDeletion::AlreadyAbsent) => {
                    warnings.push(format!("remote group {} was already gone", group_id));
                }
                Err(e) if self.policy.removes_unverified() && !e.is_auth() => {
                    tracing::warn!(classroom_id = %id, error = %e, "remote delete failed; deleting local classroom anyway");
                    warnings.push(e.to_string());
                }
                Err(e) => {
                    return Err(AppError::from(e).with_note("local classroom left unchanged"));
                }
            }
        }

        let assignments = self.repo.list_classroom_assignments(id).await?;
        self.repo.delete_classroom(id).await?;
        self.unindex(id).await;
        for assignment in &assignments {
            self.unindex(&assignment.id).await;
        }

        tracing::info!(classroom_id = %id, "classroom deleted");
        Ok(SyncOutcome {
            data: (),
            warnings,
        })
    }

    /// Apply the consistency policy to a classroom whose remote group could not
    /// be updated.
    async fn unverified_classroom(&self, classroom: &Classroom, err: SyncError) -> AppError {
        if !self.policy.removes_unverified() || err.is_auth() {
            return AppError::from(err).with_note("local classroom left unchanged");
        }
        tracing::warn!(classroom_id = %classroom.id, error = %err, "remote group unverifiable; removing local classroom");
        let assignments = self
            .repo
            .list_classroom_assignments(&classroom.id)
            .await
            .unwrap_or_default();
        if let Err(db_err) = self.repo.delete_classroom(&classroom.id).await {
            tracing::error!(classroom_id = %classroom.id, error = %db_err, "failed to remove unverifiable classroom");
            return AppError::from(err);
        }
        self.unindex(&classroom.id).await;
        for assignment in &assignments {
            self.unindex(&assignment.id).await;
        }
        AppError::from(err).with_note("local classroom was removed")
    }

    /// Enroll a student: grant remote membership, then link locally.
    pub async fn add_classroom_student(
        &self,
        session: &RemoteSession,
        classroom_id: &str,
        student_id: &str,
    ) -> Result<EnrollmentChange, AppError> {
        let _guard = self.locks.acquire(classroom_key(classroom_id)).await;

        let classroom = self.classroom(classroom_id).await?;
        ensure_owner(session, &classroom.teacher_id, "classroom", classroom_id)?;
        let student = self.student(student_id).await?;
        let group_id = synced_group(classroom.remote_group_id, "Classroom", classroom_id)?;

        let change = MembershipReconciler::new(session.client.clone())
            .add_student(group_id, &student.username, student.resolved_external_id())
            .await?;
        let classroom = self.repo.enroll_student(classroom_id, student_id).await?;

        Ok(EnrollmentChange { classroom, change })
    }

    /// Unenroll a student: revoke remote membership, then unlink locally.
    pub async fn remove_classroom_student(
        &self,
        session: &RemoteSession,
        classroom_id: &str,
        student_id: &str,
    ) -> Result<EnrollmentChange, AppError> {
        let _guard = self.locks.acquire(classroom_key(classroom_id)).await;

        let classroom = self.classroom(classroom_id).await?;
        ensure_owner(session, &classroom.teacher_id, "classroom", classroom_id)?;
        let student = self.student(student_id).await?;

        let change = match classroom.remote_group_id {
            Some(group_id) => {
                MembershipReconciler::new(session.client.clone())
                    .remove_student(group_id, &student.username, student.resolved_external_id())
                    .await?
            }
            None => MembershipChange::AlreadyAbsent,
        };
        let classroom = self.repo.unenroll_student(classroom_id, student_id).await?;

        Ok(EnrollmentChange { classroom, change })
    }

    // ==================== ASSIGNMENTS ====================

    /// Create an assignment for every student of the classroom. A remote failure
    /// keeps the assignment locally, pending a later sync.
    pub async fn create_assignment(
        &self,
        session: &RemoteSession,
        classroom_id: &str,
        request: &CreateAssignmentRequest,
    ) -> Result<SyncOutcome<Assignment>, AppError> {
        validate_title(&request.title)?;
        let _guard = self.locks.acquire(classroom_key(classroom_id)).await;

        let classroom = self.classroom(classroom_id).await?;
        ensure_owner(session, &classroom.teacher_id, "classroom", classroom_id)?;

        let local = self
            .repo
            .create_assignment(classroom_id, &session.teacher.id, request)
            .await?;
        let local = self
            .repo
            .assign_students(&local.id, &classroom.student_ids)
            .await?;

        let outcome = match self.push_assignment(session, &classroom, &local).await {
            Ok(assignment) => SyncOutcome::clean(assignment),
            Err(e) => {
                tracing::warn!(assignment_id = %local.id, error = %e, "assignment saved locally; remote group pending");
                SyncOutcome::with_warning(local, e.message())
            }
        };
        self.reindex(SearchEntry::from(&outcome.data)).await;
        Ok(outcome)
    }

    /// Create the remote group of a pending assignment and store its id.
    async fn push_assignment(
        &self,
        session: &RemoteSession,
        classroom: &Classroom,
        assignment: &Assignment,
    ) -> Result<Assignment, AppError> {
        let classroom_group = synced_group(classroom.remote_group_id, "Classroom", &classroom.id)?;
        let namespace = HierarchySyncEngine::new(session.client.clone())
            .create_assignment_namespace(
                classroom_group,
                &assignment.title,
                &assignment.description,
            )
            .await?;
        self.repo
            .set_assignment_remote(
                &assignment.id,
                assignment.version,
                namespace.group_id,
                &namespace.web_url,
            )
            .await
    }

    /// Update an assignment locally and remotely.
    pub async fn update_assignment(
        &self,
        session: &RemoteSession,
        id: &str,
        request: &UpdateAssignmentRequest,
    ) -> Result<SyncOutcome<Assignment>, AppError> {
        let _guard = self.locks.acquire(assignment_key(id)).await;

        let existing = self.assignment(id).await?;
        ensure_owner(session, &existing.teacher_id, "assignment", id)?;
        check_version(request.expected_version, existing.version)?;
        if let Some(title) = &request.title {
            validate_title(title)?;
        }

        let title = request.title.as_deref().unwrap_or(&existing.title).trim();
        let description = request
            .description
            .as_deref()
            .unwrap_or(&existing.description);

        let engine = HierarchySyncEngine::new(session.client.clone());
        let mut warnings = Vec::new();
        match existing.remote_group_id {
            Some(group_id) => {
                if let Err(e) = engine
                    .update_assignment_namespace(group_id, title, description)
                    .await
                {
                    return Err(self.unverified_assignment(&existing, e).await);
                }
            }
            None => warnings.push(format!("assignment {} has no remote group yet", id)),
        }

        let assignment = match self
            .repo
            .update_assignment(
                id,
                &UpdateAssignmentRequest {
                    expected_version: Some(existing.version),
                    ..request.clone()
                },
            )
            .await
        {
            Ok(assignment) => assignment,
            Err(e) => {
                if let Some(group_id) = existing.remote_group_id {
                    if let Err(restore) = engine
                        .update_assignment_namespace(group_id, &existing.title, &existing.description)
                        .await
                    {
                        tracing::error!(assignment_id = %id, group_id, error = %restore, "could not restore remote group after failed local update");
                    }
                }
                return Err(e);
            }
        };
        self.reindex(SearchEntry::from(&assignment)).await;
        Ok(SyncOutcome {
            data: assignment,
            warnings,
        })
    }

    async fn unverified_assignment(&self, assignment: &Assignment, err: SyncError) -> AppError {
        if !self.policy.removes_unverified() || err.is_auth() {
            return AppError::from(err).with_note("local assignment left unchanged");
        }
        tracing::warn!(assignment_id = %assignment.id, error = %err, "remote group unverifiable; removing local assignment");
        if let Err(db_err) = self.repo.delete_assignment(&assignment.id).await {
            tracing::error!(assignment_id = %assignment.id, error = %db_err, "failed to remove unverifiable assignment");
            return AppError::from(err);
        }
        self.unindex(&assignment.id).await;
        AppError::from(err).with_note("local assignment was removed")
    }

    /// Delete an assignment and its remote group.
    pub async fn delete_assignment(
        &self,
        session: &RemoteSession,
        id: &str,
    ) -> Result<SyncOutcome<()>, AppError> {
        let _guard = self.locks.acquire(assignment_key(id)).await;

        let existing = self.assignment(id).await?;
        ensure_owner(session, &existing.teacher_id, "assignment", id)?;

        let mut warnings = Vec::new();
        if let Some(group_id) = existing.remote_group_id {
            let engine = HierarchySyncEngine::new(session.client.clone());
            match engine.delete_assignment_namespace(group_id).await {
                Ok(RemoteDeletion::Deleted) => {}
                Ok(RemoteDeletion::AlreadyAbsent) => {
                    warnings.push(format!("remote group {} was already gone", group_id));
                }
                Err(e) if self.policy.removes_unverified() && !e.is_auth() => {
                    tracing::warn!(assignment_id = %id, error = %e, "remote delete failed; deleting local assignment anyway");
                    warnings.push(e.to_string());
                }
                Err(e) => {
                    return Err(AppError::from(e).with_note("local assignment left unchanged"));
                }
            }
        }

        self.repo.delete_assignment(id).await?;
        self.unindex(id).await;
        Ok(SyncOutcome {
            data: (),
            warnings,
        })
    }

    /// Retry a pending assignment, or verify that a synced one still exists and
    /// recreate its group if it does not.
    pub async fn sync_assignment(
        &self,
        session: &RemoteSession,
        id: &str,
    ) -> Result<SyncOutcome<Assignment>, AppError> {
        let _guard = self.locks.acquire(assignment_key(id)).await;

        let existing = self.assignment(id).await?;
        ensure_owner(session, &existing.teacher_id, "assignment", id)?;
        let classroom = self.classroom(&existing.classroom_id).await?;

        let (pending, warnings) = match existing.remote_group_id {
            None => (existing, Vec::new()),
            Some(group_id) => {
                let engine = HierarchySyncEngine::new(session.client.clone());
                match engine
                    .verify_group(group_id, &format!("group for assignment '{}'", existing.title))
                    .await
                {
                    Ok(_) => return Ok(SyncOutcome::clean(existing)),
                    Err(SyncError::RemoteNotFound { .. }) => {
                        tracing::warn!(assignment_id = %id, group_id, "assignment group vanished; recreating");
                        let cleared = self
                            .repo
                            .clear_assignment_remote(id, existing.version)
                            .await?;
                        (
                            cleared,
                            vec![format!("remote group {} was missing and has been recreated", group_id)],
                        )
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let assignment = self.push_assignment(session, &classroom, &pending).await?;
        self.reindex(SearchEntry::from(&assignment)).await;
        Ok(SyncOutcome {
            data: assignment,
            warnings,
        })
    }

    /// Fork a template for every classroom member and link the matching local
    /// students to the assignment.
    pub async fn fork_assignment_projects(
        &self,
        session: &RemoteSession,
        id: &str,
        template_project_id: i64,
    ) -> Result<ForkOutcome, AppError> {
        let _guard = self.locks.acquire(assignment_key(id)).await;

        let assignment = self.assignment(id).await?;
        ensure_owner(session, &assignment.teacher_id, "assignment", id)?;
        let assignment_group = synced_group(assignment.remote_group_id, "Assignment", id)?;
        let classroom = self.classroom(&assignment.classroom_id).await?;
        let classroom_group = synced_group(classroom.remote_group_id, "Classroom", &classroom.id)?;

        let report = ForkBatchOperator::new(session.client.clone())
            .fork_for_all_students(ForkTarget {
                assignment_group_id: assignment_group,
                classroom_group_id: classroom_group,
                teacher_external_id: session.teacher.external_id,
                template_project_id,
            })
            .await?;

        let external_ids: Vec<i64> = report
            .projects
            .iter()
            .chain(report.existing.iter())
            .map(|p| p.user_id)
            .collect();
        let student_ids: Vec<String> = self
            .repo
            .find_students_by_external_ids(&external_ids)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let assignment = self.repo.assign_students(id, &student_ids).await?;

        Ok(ForkOutcome { assignment, report })
    }

    // ==================== STUDENTS ====================

    /// Create a student and try to link the remote account with the same username.
    pub async fn create_student(
        &self,
        session: &RemoteSession,
        request: &CreateStudentRequest,
    ) -> Result<StudentResolution, AppError> {
        if request.username.trim().is_empty() {
            return Err(AppError::Validation("Username is required".to_string()));
        }
        let student = self.repo.create_student(request).await?;
        let _guard = self.locks.acquire(student_key(&student.id)).await;

        let resolved = self.resolve_identity(session, student).await?;
        self.reindex(SearchEntry::from(&resolved.student)).await;
        Ok(resolved)
    }

    /// Update a student; a changed username is resolved again.
    pub async fn update_student(
        &self,
        session: &RemoteSession,
        id: &str,
        request: &UpdateStudentRequest,
    ) -> Result<StudentResolution, AppError> {
        if request
            .username
            .as_deref()
            .is_some_and(|u| u.trim().is_empty())
        {
            return Err(AppError::Validation("Username cannot be empty".to_string()));
        }
        let _guard = self.locks.acquire(student_key(id)).await;

        let existing = self.student(id).await?;
        let student = self.repo.update_student(id, request).await?;

        let resolved = if student.username.eq_ignore_ascii_case(&existing.username) {
            StudentResolution {
                student,
                resolution: None,
            }
        } else {
            self.resolve_identity(session, student).await?
        };
        self.reindex(SearchEntry::from(&resolved.student)).await;
        Ok(resolved)
    }

    /// Look up the remote account of a student again.
    pub async fn resolve_student(
        &self,
        session: &RemoteSession,
        id: &str,
    ) -> Result<StudentResolution, AppError> {
        let _guard = self.locks.acquire(student_key(id)).await;
        let student = self.student(id).await?;
        self.resolve_identity(session, student).await
    }

    async fn resolve_identity(
        &self,
        session: &RemoteSession,
        student: Student,
    ) -> Result<StudentResolution, AppError> {
        let repo = self.repo.clone();
        let student_id = student.id.clone();
        let resolution = IdentityResolver::new(session.client.clone())
            .resolve(&student.username, |external_id| async move {
                repo.external_id_taken(external_id, &student_id).await
            })
            .await?;

        let student = match &resolution {
            // Keep whatever was known before; the lookup itself failed.
            IdentityResolution::Failed { .. } => student,
            IdentityResolution::Resolved { external_id } => {
                self.repo
                    .set_student_identity(&student.id, student.version, Some(*external_id), true)
                    .await?
            }
            IdentityResolution::NoAccount | IdentityResolution::Duplicate { .. } => {
                self.repo
                    .set_student_identity(&student.id, student.version, None, false)
                    .await?
            }
        };

        Ok(StudentResolution {
            student,
            resolution: Some(resolution),
        })
    }

    /// Delete a student, revoking their classroom memberships first. Membership
    /// failures do not block the local delete.
    pub async fn delete_student(
        &self,
        session: &RemoteSession,
        id: &str,
    ) -> Result<SyncOutcome<()>, AppError> {
        let _guard = self.locks.acquire(student_key(id)).await;
        let student = self.student(id).await?;

        let mut warnings = Vec::new();
        if let Some(external_id) = student.resolved_external_id() {
            let reconciler = MembershipReconciler::new(session.client.clone());
            for classroom_id in self.repo.student_classroom_ids(id).await? {
                let Some(classroom) = self.repo.get_classroom(&classroom_id).await? else {
                    continue;
                };
                let Some(group_id) = classroom.remote_group_id else {
                    continue;
                };
                if let Err(e) = reconciler
                    .remove_student(group_id, &student.username, Some(external_id))
                    .await
                {
                    if e.is_auth() {
                        return Err(e.into());
                    }
                    tracing::warn!(student_id = %id, classroom_id = %classroom.id, error = %e, "could not revoke membership");
                    warnings.push(format!("classroom '{}': {}", classroom.title, e));
                }
            }
        }

        self.repo.delete_student(id).await?;
        self.unindex(id).await;
        Ok(SyncOutcome {
            data: (),
            warnings,
        })
    }

    // ==================== SUBMISSIONS ====================

    /// Record a submission from a student enrolled in the assignment's classroom.
    pub async fn create_submission(
        &self,
        assignment_id: &str,
        request: &CreateSubmissionRequest,
    ) -> Result<Submission, AppError> {
        let assignment = self.assignment(assignment_id).await?;
        let student = self.student(&request.student_id).await?;
        let classroom = self.classroom(&assignment.classroom_id).await?;
        if !classroom.student_ids.contains(&student.id) {
            return Err(AppError::Validation(format!(
                "Student {} is not enrolled in classroom '{}'",
                student.username, classroom.title
            )));
        }
        self.repo.create_submission(assignment_id, request).await
    }

    pub async fn list_submissions(&self, assignment_id: &str) -> Result<Vec<Submission>, AppError> {
        self.assignment(assignment_id).await?;
        self.repo.list_submissions(assignment_id).await
    }

    /// Grade a submission. Grades are at most two characters.
    pub async fn grade_submission(
        &self,
        id: &str,
        request: &GradeSubmissionRequest,
    ) -> Result<Submission, AppError> {
        if let Some(grade) = &request.grade {
            let len = grade.trim().chars().count();
            if len == 0 || len > MAX_GRADE_LEN {
                return Err(AppError::Validation(format!(
                    "Grade must be 1 to {} characters",
                    MAX_GRADE_LEN
                )));
            }
        }
        let request = GradeSubmissionRequest {
            grade: request.grade.as_ref().map(|g| g.trim().to_string()),
            ..request.clone()
        };
        self.repo.grade_submission(id, &request).await
    }

    // ==================== HELPERS ====================

    async fn classroom(&self, id: &str) -> Result<Classroom, AppError> {
        self.repo
            .get_classroom(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Classroom {} not found", id)))
    }

    async fn assignment(&self, id: &str) -> Result<Assignment, AppError> {
        self.repo
            .get_assignment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", id)))
    }

    async fn student(&self, id: &str) -> Result<Student, AppError> {
        self.repo
            .get_student(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))
    }

    async fn reindex(&self, entry: SearchEntry) {
        let entity_id = entry.entity_id.clone();
        if let Err(e) = self.search.index(entry).await {
            tracing::warn!("Failed to index {}: {}", entity_id, e);
        }
    }

    async fn unindex(&self, entity_id: &str) {
        if let Err(e) = self.search.remove(entity_id).await {
            tracing::warn!("Failed to remove {} from index: {}", entity_id, e);
        }
    }
}

fn validate_title(title: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if sanitize(title).is_empty() {
        return Err(AppError::Validation(format!(
            "Title '{}' has no characters usable in a remote path",
            title
        )));
    }
    Ok(())
}

fn ensure_owner(
    session: &RemoteSession,
    teacher_id: &str,
    entity: &str,
    id: &str,
) -> Result<(), AppError> {
    if session.teacher.id != teacher_id {
        return Err(AppError::Forbidden(format!(
            "Only the owning teacher may change {} {}",
            entity, id
        )));
    }
    Ok(())
}

fn synced_group(group_id: Option<i64>, entity: &str, id: &str) -> Result<i64, AppError> {
    group_id.ok_or_else(|| {
        AppError::Validation(format!(
            "{} {} has no remote group yet; sync it first",
            entity, id
        ))
    })
}
