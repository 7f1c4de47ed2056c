use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use super::{fork_project_name, get_or_create_role, SubgroupRole, SyncError};
use crate::remote::{
    AccessLevel, ForkRequest, Group, Project, RemoteError, RemoteNamespaceClient, RemoteUser,
};

/// Everything a fork batch needs to know about one assignment.
#[derive(Debug, Clone, Copy)]
pub struct ForkTarget {
    pub assignment_group_id: i64,
    pub classroom_group_id: i64,
    /// Remote account of the classroom owner; never receives a fork.
    pub teacher_external_id: i64,
    pub template_project_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkedProject {
    pub user_id: i64,
    pub username: String,
    pub project_id: i64,
    pub web_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkFailure {
    pub user_id: i64,
    pub username: String,
    pub error: String,
}

/// Per-student results of one fork batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkReport {
    pub forked: usize,
    pub skipped: usize,
    /// Forks created by this run.
    pub projects: Vec<ForkedProject>,
    /// Forks that were already present.
    pub existing: Vec<ForkedProject>,
    pub failures: Vec<ForkFailure>,
}

enum StudentFork {
    Created(Project),
    Existing(Project),
}

/// Forks an assignment template once per classroom member.
#[derive(Clone)]
pub struct ForkBatchOperator {
    remote: Arc<dyn RemoteNamespaceClient>,
}

impl ForkBatchOperator {
    pub fn new(remote: Arc<dyn RemoteNamespaceClient>) -> Self {
        Self { remote }
    }

    /// Fork the template for every MEMBERS user except the teacher.
    ///
    /// Students that already own a fork are skipped. A failure for one student is
    /// recorded and the batch moves on; a rejected credential aborts the batch.
    #[instrument(skip(self), fields(assignment_group_id = target.assignment_group_id))]
    pub async fn fork_for_all_students(&self, target: ForkTarget) -> Result<ForkReport, SyncError> {
        let entity = format!("forks of assignment group {}", target.assignment_group_id);

        let assignment_group = self
            .remote
            .get_group(target.assignment_group_id)
            .await
            .map_err(|e| SyncError::lookup(entity.as_str(), e, SyncError::create))?;
        let members =
            get_or_create_role(self.remote.as_ref(), target.classroom_group_id, SubgroupRole::Members)
                .await
                .map_err(|e| SyncError::lookup(entity.as_str(), e, SyncError::create))?;
        let students = self
            .remote
            .list_group_members(members.id)
            .await
            .map_err(|e| SyncError::lookup(entity.as_str(), e, SyncError::create))?;

        let template = match self.remote.get_project(target.template_project_id).await {
            Ok(project) => project,
            Err(e) if e.is_not_found() => {
                return Err(SyncError::TemplateNotFound {
                    template_id: target.template_project_id,
                })
            }
            Err(e) => return Err(SyncError::create(entity, e)),
        };

        let mut report = ForkReport::default();
        for student in students
            .iter()
            .filter(|s| s.id != target.teacher_external_id)
        {
            match self.fork_one(&template, &assignment_group, student).await {
                Ok(StudentFork::Created(project)) => {
                    report.forked += 1;
                    report.projects.push(forked(student, project));
                }
                Ok(StudentFork::Existing(project)) => {
                    report.skipped += 1;
                    report.existing.push(forked(student, project));
                }
                Err(RemoteError::Unauthorized) => {
                    return Err(SyncError::RemoteAuth { entity });
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = student.id,
                        username = %student.username,
                        error = %e,
                        "fork failed"
                    );
                    report.failures.push(ForkFailure {
                        user_id: student.id,
                        username: student.username.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            forked = report.forked,
            skipped = report.skipped,
            failed = report.failures.len(),
            "fork batch finished"
        );
        Ok(report)
    }

    async fn fork_one(
        &self,
        template: &Project,
        assignment_group: &Group,
        student: &RemoteUser,
    ) -> Result<StudentFork, RemoteError> {
        let name = fork_project_name(&assignment_group.name, &student.username);

        let outcome = match self.find_fork(&name, assignment_group.id).await? {
            Some(project) => StudentFork::Existing(project),
            None => {
                let request = ForkRequest {
                    namespace_id: assignment_group.id,
                    name: name.clone(),
                    path: name.clone(),
                };
                match self.remote.fork_project(template.id, &request).await {
                    Ok(project) => StudentFork::Created(project),
                    // A fork that landed despite a failed response shows up on re-check.
                    Err(e @ RemoteError::Rejected { .. }) | Err(e @ RemoteError::Server { .. }) => {
                        match self.find_fork(&name, assignment_group.id).await? {
                            Some(project) => StudentFork::Existing(project),
                            None => return Err(e),
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let project_id = match &outcome {
            StudentFork::Created(p) | StudentFork::Existing(p) => p.id,
        };
        match self
            .remote
            .create_project_membership(project_id, student.id, AccessLevel::Developer)
            .await
        {
            Ok(()) | Err(RemoteError::Rejected { status: 409, .. }) => Ok(outcome),
            Err(e) => Err(e),
        }
    }

    async fn find_fork(&self, name: &str, namespace_id: i64) -> Result<Option<Project>, RemoteError> {
        let found = self.remote.search_projects(name, namespace_id).await?;
        Ok(found
            .into_iter()
            .find(|p| p.namespace_id == namespace_id && p.name.eq_ignore_ascii_case(name)))
    }
}

fn forked(student: &RemoteUser, project: Project) -> ForkedProject {
    ForkedProject {
        user_id: student.id,
        username: student.username.clone(),
        project_id: project.id,
        web_url: project.web_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::{InMemoryRemote, Op};
    use crate::sync::HierarchySyncEngine;

    struct Scenario {
        remote: Arc<InMemoryRemote>,
        target: ForkTarget,
        members_id: i64,
        assignment_group_id: i64,
    }

    async fn scenario() -> Scenario {
        let remote = InMemoryRemote::new("teacher");
        let engine = HierarchySyncEngine::new(remote.clone());
        let ns = engine.create_classroom_namespace("Systems", "").await.unwrap();
        let assignment = engine
            .create_assignment_namespace(ns.group.id, "Lab 1", "")
            .await
            .unwrap();
        let template = remote.add_project("lab1-template");
        let teacher = remote.actor();
        remote.seed_membership(ns.members.id, teacher.id, AccessLevel::Owner);

        Scenario {
            target: ForkTarget {
                assignment_group_id: assignment.group_id,
                classroom_group_id: ns.group.id,
                teacher_external_id: teacher.id,
                template_project_id: template.id,
            },
            members_id: ns.members.id,
            assignment_group_id: assignment.group_id,
            remote,
        }
    }

    fn enroll(s: &Scenario, username: &str) -> RemoteUser {
        let user = s.remote.add_user(username);
        s.remote
            .seed_membership(s.members_id, user.id, AccessLevel::Developer);
        user
    }

    #[tokio::test]
    async fn test_forks_every_student_but_the_teacher() {
        let s = scenario().await;
        let alice = enroll(&s, "alice");
        let bob = enroll(&s, "bob");

        let report = ForkBatchOperator::new(s.remote.clone())
            .fork_for_all_students(s.target)
            .await
            .unwrap();

        assert_eq!(report.forked, 2);
        assert_eq!(report.skipped, 0);
        assert!(report.failures.is_empty());

        let mut names: Vec<String> = s
            .remote
            .projects_in(s.assignment_group_id)
            .into_iter()
            .map(|p| p.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["lab_1_alice_project", "lab_1_bob_project"]);

        for (user, fork) in [(&alice, &report.projects[0]), (&bob, &report.projects[1])] {
            assert_eq!(fork.user_id, user.id);
            assert_eq!(
                s.remote.project_access(fork.project_id, user.id),
                Some(AccessLevel::Developer)
            );
        }
    }

    #[tokio::test]
    async fn test_second_run_skips_existing_forks() {
        let s = scenario().await;
        enroll(&s, "alice");
        enroll(&s, "bob");
        let operator = ForkBatchOperator::new(s.remote.clone());

        operator.fork_for_all_students(s.target).await.unwrap();
        let second = operator.fork_for_all_students(s.target).await.unwrap();

        assert_eq!(second.forked, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(second.existing.len(), 2);
        assert_eq!(s.remote.projects_in(s.assignment_group_id).len(), 2);
    }

    #[tokio::test]
    async fn test_rerun_tolerates_existing_project_member() {
        let s = scenario().await;
        let alice = enroll(&s, "alice");
        let operator = ForkBatchOperator::new(s.remote.clone());

        let first = operator.fork_for_all_students(s.target).await.unwrap();
        let second = operator.fork_for_all_students(s.target).await.unwrap();

        assert_eq!(first.forked, 1);
        assert!(second.failures.is_empty());
        assert_eq!(second.skipped, first.forked);
        assert_eq!(s.remote.calls(Op::CreateProjectMembership), 2);
        assert_eq!(
            s.remote.project_access(first.projects[0].project_id, alice.id),
            Some(AccessLevel::Developer)
        );
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_batch() {
        let s = scenario().await;
        enroll(&s, "alice");
        enroll(&s, "bob");
        enroll(&s, "carol");
        s.remote.fail_after(
            Op::ForkProject,
            1,
            RemoteError::Rejected {
                status: 403,
                message: "forbidden".to_string(),
            },
        );

        let report = ForkBatchOperator::new(s.remote.clone())
            .fork_for_all_students(s.target)
            .await
            .unwrap();

        assert_eq!(report.forked, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].username, "bob");
        assert_eq!(s.remote.projects_in(s.assignment_group_id).len(), 2);
    }

    #[tokio::test]
    async fn test_missing_template_forks_nothing() {
        let s = scenario().await;
        enroll(&s, "alice");
        let target = ForkTarget {
            template_project_id: 9999,
            ..s.target
        };

        let err = ForkBatchOperator::new(s.remote.clone())
            .fork_for_all_students(target)
            .await
            .unwrap_err();

        assert_eq!(err, SyncError::TemplateNotFound { template_id: 9999 });
        assert_eq!(s.remote.calls(Op::ForkProject), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_aborts_batch() {
        let s = scenario().await;
        enroll(&s, "alice");
        enroll(&s, "bob");
        s.remote.fail_next(Op::ForkProject, RemoteError::Unauthorized);

        let err = ForkBatchOperator::new(s.remote.clone())
            .fork_for_all_students(s.target)
            .await
            .unwrap_err();

        assert!(err.is_auth());
        assert_eq!(s.remote.calls(Op::ForkProject), 1);
    }

    #[tokio::test]
    async fn test_grant_failure_converges_on_rerun() {
        let s = scenario().await;
        let alice = enroll(&s, "alice");
        s.remote
            .fail_next(Op::CreateProjectMembership, RemoteError::Server { status: 500 });
        let operator = ForkBatchOperator::new(s.remote.clone());

        let first = operator.fork_for_all_students(s.target).await.unwrap();
        assert_eq!(first.failures.len(), 1);

        let second = operator.fork_for_all_students(s.target).await.unwrap();
        assert_eq!(second.skipped, 1);
        let project_id = second.existing[0].project_id;
        assert_eq!(
            s.remote.project_access(project_id, alice.id),
            Some(AccessLevel::Developer)
        );
    }

    #[tokio::test]
    async fn test_deleted_assignment_group_is_not_found() {
        let s = scenario().await;
        let target = ForkTarget {
            assignment_group_id: 4242,
            ..s.target
        };
        let err = ForkBatchOperator::new(s.remote.clone())
            .fork_for_all_students(target)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteNotFound { .. }));
    }
}
