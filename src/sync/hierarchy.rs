//! Classroom and assignment group hierarchy.
//!
//! ```text
//! <classroom>                 path: sanitize(title)
//! ├── MEMBERS                 path: <classroom>_MEMBERS
//! └── ASSIGNMENTS             path: <classroom>_ASSIGNMENTS
//!     └── <assignment>        path: ASSIGNMENTS_<sanitize(title)>
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::instrument;

use super::{assignment_group_path, sanitize, subgroup_path, SubgroupRole, SyncError};
use crate::remote::{Group, GroupUpdate, NewGroup, RemoteError, RemoteNamespaceClient};

/// A classroom group with its subgroups keyed by name.
#[derive(Debug, Clone)]
pub struct ClassroomHierarchy {
    pub root: Group,
    subgroups: HashMap<String, Group>,
}

impl ClassroomHierarchy {
    /// Build the name index. The remote does not guarantee listing order, so a
    /// duplicated name resolves to the oldest (lowest id) group.
    pub fn new(root: Group, subgroups: Vec<Group>) -> Self {
        let mut by_name: HashMap<String, Group> = HashMap::new();
        for group in subgroups {
            match by_name.get(&group.name) {
                Some(existing) if existing.id <= group.id => {}
                _ => {
                    by_name.insert(group.name.clone(), group);
                }
            }
        }
        Self {
            root,
            subgroups: by_name,
        }
    }

    pub fn role(&self, role: SubgroupRole) -> Option<&Group> {
        self.subgroups.get(role.name())
    }
}

/// Fetch a classroom group and index its subgroups.
pub async fn fetch_hierarchy(
    remote: &dyn RemoteNamespaceClient,
    group_id: i64,
) -> Result<ClassroomHierarchy, RemoteError> {
    let root = remote.get_group(group_id).await?;
    let subgroups = remote.list_subgroups(group_id).await?;
    Ok(ClassroomHierarchy::new(root, subgroups))
}

/// Resolve a role subgroup, creating it when the classroom lacks one.
pub async fn get_or_create_role(
    remote: &dyn RemoteNamespaceClient,
    classroom_group_id: i64,
    role: SubgroupRole,
) -> Result<Group, RemoteError> {
    let hierarchy = fetch_hierarchy(remote, classroom_group_id).await?;
    if let Some(group) = hierarchy.role(role) {
        return Ok(group.clone());
    }
    tracing::warn!(
        classroom_group_id,
        role = role.name(),
        "classroom group is missing a subgroup; recreating it"
    );
    remote
        .create_group(&NewGroup {
            name: role.name().to_string(),
            path: subgroup_path(&hierarchy.root.path, role),
            description: role.description().to_string(),
            parent_id: Some(hierarchy.root.id),
        })
        .await
}

/// Remote groups created for a new classroom.
#[derive(Debug, Clone)]
pub struct ClassroomNamespace {
    pub group: Group,
    pub members: Group,
    pub assignments: Group,
}

/// Remote group created for a new assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentNamespace {
    pub group_id: i64,
    pub web_url: String,
}

/// Result of a remote delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteDeletion {
    Deleted,
    AlreadyAbsent,
}

/// Creates, updates and deletes the classroom/assignment group tree.
#[derive(Clone)]
pub struct HierarchySyncEngine {
    remote: Arc<dyn RemoteNamespaceClient>,
}

impl HierarchySyncEngine {
    pub fn new(remote: Arc<dyn RemoteNamespaceClient>) -> Self {
        Self { remote }
    }

    /// Create the classroom group and its MEMBERS/ASSIGNMENTS subgroups.
    ///
    /// If a subgroup cannot be created the root group is deleted again before the
    /// error is returned, so no partial tree is left behind.
    #[instrument(name = "sync_create_classroom", skip(self, description))]
    pub async fn create_classroom_namespace(
        &self,
        title: &str,
        description: &str,
    ) -> Result<ClassroomNamespace, SyncError> {
        let root = self
            .remote
            .create_group(&NewGroup {
                name: title.to_string(),
                path: sanitize(title),
                description: description.to_string(),
                parent_id: None,
            })
            .await
            .map_err(|e| SyncError::create(format!("group for classroom '{title}'"), e))?;

        let members = match self.create_subgroup(&root, SubgroupRole::Members).await {
            Ok(group) => group,
            Err(e) => return Err(self.abandon(&root, title, SubgroupRole::Members, e).await),
        };
        let assignments = match self.create_subgroup(&root, SubgroupRole::Assignments).await {
            Ok(group) => group,
            Err(e) => return Err(self.abandon(&root, title, SubgroupRole::Assignments, e).await),
        };

        tracing::info!(
            group_id = root.id,
            members_id = members.id,
            assignments_id = assignments.id,
            "created classroom namespace"
        );
        Ok(ClassroomNamespace {
            group: root,
            members,
            assignments,
        })
    }

    async fn create_subgroup(&self, parent: &Group, role: SubgroupRole) -> Result<Group, RemoteError> {
        self.remote
            .create_group(&NewGroup {
                name: role.name().to_string(),
                path: subgroup_path(&parent.path, role),
                description: role.description().to_string(),
                parent_id: Some(parent.id),
            })
            .await
    }

    async fn abandon(
        &self,
        root: &Group,
        title: &str,
        role: SubgroupRole,
        err: RemoteError,
    ) -> SyncError {
        self.discard(root).await;
        SyncError::create(format!("{} subgroup of classroom '{title}'", role.name()), err)
    }

    /// Compensating delete of a partially created classroom tree.
    async fn discard(&self, root: &Group) {
        match self.remote.delete_group(root.id).await {
            Ok(()) => {
                tracing::warn!(group_id = root.id, "removed partially created classroom group")
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::error!(
                group_id = root.id,
                error = %e,
                "could not remove partially created classroom group; it is orphaned"
            ),
        }
    }

    #[instrument(name = "sync_update_classroom", skip(self, description))]
    pub async fn update_classroom_namespace(
        &self,
        group_id: i64,
        title: &str,
        description: &str,
    ) -> Result<(), SyncError> {
        self.update_group(
            group_id,
            format!("group for classroom '{title}'"),
            title,
            description,
        )
        .await
    }

    #[instrument(name = "sync_delete_classroom", skip(self))]
    pub async fn delete_classroom_namespace(
        &self,
        group_id: i64,
    ) -> Result<RemoteDeletion, SyncError> {
        self.delete_group(group_id, format!("classroom group {group_id}"))
            .await
    }

    /// Create the assignment group under the classroom's ASSIGNMENTS subgroup.
    #[instrument(name = "sync_create_assignment", skip(self, description))]
    pub async fn create_assignment_namespace(
        &self,
        classroom_group_id: i64,
        title: &str,
        description: &str,
    ) -> Result<AssignmentNamespace, SyncError> {
        let entity = format!("group for assignment '{title}'");
        let hierarchy = fetch_hierarchy(self.remote.as_ref(), classroom_group_id)
            .await
            .map_err(|e| SyncError::create(entity.as_str(), e))?;
        let assignments = hierarchy.role(SubgroupRole::Assignments).ok_or_else(|| {
            SyncError::create(
                entity.as_str(),
                RemoteError::not_found(format!(
                    "ASSIGNMENTS subgroup of group {classroom_group_id}"
                )),
            )
        })?;

        let name = sanitize(title);
        let group = self
            .remote
            .create_group(&NewGroup {
                name: name.clone(),
                path: assignment_group_path(&assignments.name, &name),
                description: description.to_string(),
                parent_id: Some(assignments.id),
            })
            .await
            .map_err(|e| SyncError::create(entity.as_str(), e))?;

        tracing::info!(group_id = group.id, classroom_group_id, "created assignment group");
        Ok(AssignmentNamespace {
            group_id: group.id,
            web_url: group.web_url,
        })
    }

    #[instrument(name = "sync_update_assignment", skip(self, description))]
    pub async fn update_assignment_namespace(
        &self,
        group_id: i64,
        title: &str,
        description: &str,
    ) -> Result<(), SyncError> {
        self.update_group(
            group_id,
            format!("group for assignment '{title}'"),
            &sanitize(title),
            description,
        )
        .await
    }

    #[instrument(name = "sync_delete_assignment", skip(self))]
    pub async fn delete_assignment_namespace(
        &self,
        group_id: i64,
    ) -> Result<RemoteDeletion, SyncError> {
        self.delete_group(group_id, format!("assignment group {group_id}"))
            .await
    }

    /// Confirm a group still exists.
    pub async fn verify_group(&self, group_id: i64, entity: &str) -> Result<Group, SyncError> {
        self.remote
            .get_group(group_id)
            .await
            .map_err(|e| SyncError::lookup(entity, e, SyncError::update))
    }

    async fn update_group(
        &self,
        group_id: i64,
        entity: String,
        name: &str,
        description: &str,
    ) -> Result<(), SyncError> {
        self.verify_group(group_id, &entity).await?;
        self.remote
            .update_group(
                group_id,
                &GroupUpdate {
                    name: Some(name.to_string()),
                    description: Some(description.to_string()),
                },
            )
            .await
            .map_err(|e| SyncError::lookup(entity, e, SyncError::update))
    }

    async fn delete_group(&self, group_id: i64, entity: String) -> Result<RemoteDeletion, SyncError> {
        let absent = || {
            tracing::warn!(group_id, "remote group already gone; nothing to delete");
            Ok(RemoteDeletion::AlreadyAbsent)
        };

        match self.remote.get_group(group_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return absent(),
            Err(e) => return Err(SyncError::delete(entity, e)),
        }
        match self.remote.delete_group(group_id).await {
            Ok(()) => Ok(RemoteDeletion::Deleted),
            Err(e) if e.is_not_found() => absent(),
            Err(e) => Err(SyncError::delete(entity, e)),
        }
    }
}
