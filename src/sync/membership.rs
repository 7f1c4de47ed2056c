use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use super::{get_or_create_role, SubgroupRole, SyncError};
use crate::remote::{AccessLevel, RemoteError, RemoteNamespaceClient};

/// Outcome of a membership change on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MembershipChange {
    Granted,
    AlreadyMember,
    Revoked,
    AlreadyAbsent,
}

/// Keeps a classroom's MEMBERS subgroup in line with its enrolled students.
#[derive(Clone)]
pub struct MembershipReconciler {
    remote: Arc<dyn RemoteNamespaceClient>,
}

impl MembershipReconciler {
    pub fn new(remote: Arc<dyn RemoteNamespaceClient>) -> Self {
        Self { remote }
    }

    /// Grant a student developer access to the classroom's MEMBERS subgroup.
    ///
    /// A student without a resolved remote account fails before any remote call.
    #[instrument(skip(self, external_id))]
    pub async fn add_student(
        &self,
        classroom_group_id: i64,
        username: &str,
        external_id: Option<i64>,
    ) -> Result<MembershipChange, SyncError> {
        let user_id = external_id.ok_or_else(|| SyncError::UnresolvedIdentity {
            username: username.to_string(),
        })?;
        let entity = format!("membership of {username}");

        let members = get_or_create_role(self.remote.as_ref(), classroom_group_id, SubgroupRole::Members)
            .await
            .map_err(|e| SyncError::lookup(entity.as_str(), e, SyncError::create))?;

        match self
            .remote
            .create_membership(members.id, user_id, AccessLevel::Developer)
            .await
        {
            Ok(()) => {
                tracing::info!(group_id = members.id, user_id, "granted membership");
                Ok(MembershipChange::Granted)
            }
            Err(RemoteError::Rejected { status: 409, .. }) => {
                tracing::debug!(group_id = members.id, user_id, "already a member");
                Ok(MembershipChange::AlreadyMember)
            }
            Err(e) => Err(SyncError::create(entity, e)),
        }
    }

    /// Revoke a student's MEMBERS membership. Missing memberships are not an error.
    #[instrument(skip(self, external_id))]
    pub async fn remove_student(
        &self,
        classroom_group_id: i64,
        username: &str,
        external_id: Option<i64>,
    ) -> Result<MembershipChange, SyncError> {
        let Some(user_id) = external_id else {
            return Ok(MembershipChange::AlreadyAbsent);
        };
        let entity = format!("membership of {username}");

        let hierarchy = match super::fetch_hierarchy(self.remote.as_ref(), classroom_group_id).await {
            Ok(hierarchy) => hierarchy,
            Err(e) if e.is_not_found() => return Ok(MembershipChange::AlreadyAbsent),
            Err(e) => return Err(SyncError::delete(entity, e)),
        };
        let Some(members) = hierarchy.role(SubgroupRole::Members) else {
            return Ok(MembershipChange::AlreadyAbsent);
        };

        match self.remote.get_membership(members.id, user_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(MembershipChange::AlreadyAbsent),
            Err(e) => return Err(SyncError::delete(entity, e)),
        }
        // 404 here means the membership went away after the lookup.
        match self.remote.delete_membership(members.id, user_id).await {
            Ok(()) => {
                tracing::info!(group_id = members.id, user_id, "revoked membership");
                Ok(MembershipChange::Revoked)
            }
            Err(e) if e.is_not_found() => Ok(MembershipChange::AlreadyAbsent),
            Err(e) => Err(SyncError::delete(entity, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::{InMemoryRemote, Op};
    use crate::sync::HierarchySyncEngine;

    async fn classroom(remote: &Arc<InMemoryRemote>) -> (i64, i64) {
        let ns = HierarchySyncEngine::new(remote.clone())
            .create_classroom_namespace("Systems", "")
            .await
            .unwrap();
        (ns.group.id, ns.members.id)
    }

    #[tokio::test]
    async fn test_add_then_add_again() {
        let remote = InMemoryRemote::new("teacher");
        let (group_id, members_id) = classroom(&remote).await;
        let alice = remote.add_user("alice");
        let reconciler = MembershipReconciler::new(remote.clone());

        let first = reconciler
            .add_student(group_id, "alice", Some(alice.id))
            .await
            .unwrap();
        let second = reconciler
            .add_student(group_id, "alice", Some(alice.id))
            .await
            .unwrap();

        assert_eq!(first, MembershipChange::Granted);
        assert_eq!(second, MembershipChange::AlreadyMember);
        assert!(remote.is_group_member(members_id, alice.id));
    }

    #[tokio::test]
    async fn test_unresolved_student_makes_no_remote_call() {
        let remote = InMemoryRemote::new("teacher");
        let (group_id, _) = classroom(&remote).await;
        let before = remote.calls(Op::GetGroup);

        let err = MembershipReconciler::new(remote.clone())
            .add_student(group_id, "ghost", None)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SyncError::UnresolvedIdentity {
                username: "ghost".to_string()
            }
        );
        assert_eq!(remote.calls(Op::GetGroup), before);
        assert_eq!(remote.calls(Op::CreateMembership), 0);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let remote = InMemoryRemote::new("teacher");
        let (group_id, members_id) = classroom(&remote).await;
        let bob = remote.add_user("bob");
        remote.seed_membership(members_id, bob.id, AccessLevel::Developer);
        let reconciler = MembershipReconciler::new(remote.clone());

        let first = reconciler
            .remove_student(group_id, "bob", Some(bob.id))
            .await
            .unwrap();
        let second = reconciler
            .remove_student(group_id, "bob", Some(bob.id))
            .await
            .unwrap();

        assert_eq!(first, MembershipChange::Revoked);
        assert_eq!(second, MembershipChange::AlreadyAbsent);
        assert!(!remote.is_group_member(members_id, bob.id));
        assert_eq!(remote.calls(Op::GetMembership), 2);
        assert_eq!(remote.calls(Op::DeleteMembership), 1);
    }

    #[tokio::test]
    async fn test_remove_lookup_failure_is_delete_error() {
        let remote = InMemoryRemote::new("teacher");
        let (group_id, members_id) = classroom(&remote).await;
        let bob = remote.add_user("bob");
        remote.seed_membership(members_id, bob.id, AccessLevel::Developer);
        remote.fail_next(Op::GetMembership, RemoteError::Server { status: 502 });

        let err = MembershipReconciler::new(remote.clone())
            .remove_student(group_id, "bob", Some(bob.id))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::RemoteDelete { .. }));
        assert!(remote.is_group_member(members_id, bob.id));
        assert_eq!(remote.calls(Op::DeleteMembership), 0);
    }

    #[tokio::test]
    async fn test_remove_from_deleted_classroom_is_absent() {
        let remote = InMemoryRemote::new("teacher");
        let bob = remote.add_user("bob");
        let change = MembershipReconciler::new(remote.clone())
            .remove_student(999, "bob", Some(bob.id))
            .await
            .unwrap();
        assert_eq!(change, MembershipChange::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_add_failure_is_create_error() {
        let remote = InMemoryRemote::new("teacher");
        let (group_id, _) = classroom(&remote).await;
        let alice = remote.add_user("alice");
        remote.fail_next(Op::CreateMembership, RemoteError::Server { status: 500 });

        let err = MembershipReconciler::new(remote.clone())
            .add_student(group_id, "alice", Some(alice.id))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteCreate { .. }));
    }

    #[tokio::test]
    async fn test_add_to_missing_classroom_is_not_found() {
        let remote = InMemoryRemote::new("teacher");
        let alice = remote.add_user("alice");
        let err = MembershipReconciler::new(remote.clone())
            .add_student(12345, "alice", Some(alice.id))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteNotFound { .. }));
    }
}
