//! In-memory remote service used by tests.
//!
//! Mirrors the remote semantics the sync engine relies on: unique paths per
//! namespace, cascading group deletion, 404 for missing resources. Failures can be
//! injected per operation and subgroup listing order can be reversed.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    AccessLevel, ForkRequest, Group, GroupUpdate, Membership, NewGroup, Project, RemoteConnector,
    RemoteError, RemoteNamespaceClient, RemoteUser,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateGroup,
    GetGroup,
    UpdateGroup,
    DeleteGroup,
    ListSubgroups,
    CreateMembership,
    GetMembership,
    DeleteMembership,
    ListGroupMembers,
    GetProject,
    SearchProjects,
    ForkProject,
    CreateProjectMembership,
    ListUsers,
}

#[derive(Debug, Clone)]
struct StoredGroup {
    group: Group,
    description: String,
}

#[derive(Default)]
struct State {
    next_id: i64,
    groups: BTreeMap<i64, StoredGroup>,
    projects: BTreeMap<i64, Project>,
    users: BTreeMap<i64, RemoteUser>,
    group_members: BTreeMap<(i64, i64), AccessLevel>,
    project_members: BTreeMap<(i64, i64), AccessLevel>,
    failures: HashMap<Op, VecDeque<Option<RemoteError>>>,
    calls: HashMap<Op, usize>,
    reverse_subgroups: bool,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn full_path(&self, group_id: i64) -> String {
        let mut segments = Vec::new();
        let mut current = Some(group_id);
        while let Some(id) = current {
            match self.groups.get(&id) {
                Some(stored) => {
                    segments.push(stored.group.path.clone());
                    current = stored.group.parent_id;
                }
                None => break,
            }
        }
        segments.reverse();
        segments.join("/")
    }

    fn descendants(&self, root: i64) -> Vec<i64> {
        let mut out = vec![root];
        let mut i = 0;
        while i < out.len() {
            let parent = out[i];
            out.extend(
                self.groups
                    .values()
                    .filter(|g| g.group.parent_id == Some(parent))
                    .map(|g| g.group.id),
            );
            i += 1;
        }
        out
    }

    fn path_taken(&self, parent_id: Option<i64>, path: &str) -> bool {
        let lowered = path.to_lowercase();
        let group_clash = self
            .groups
            .values()
            .any(|g| g.group.parent_id == parent_id && g.group.path.to_lowercase() == lowered);
        let project_clash = parent_id.is_some_and(|ns| {
            self.projects
                .values()
                .any(|p| p.namespace_id == ns && p.path.to_lowercase() == lowered)
        });
        group_clash || project_clash
    }
}

/// Shared in-memory remote. Clones of the `Arc` observe the same state.
pub struct InMemoryRemote {
    actor: RemoteUser,
    state: Mutex<State>,
}

impl InMemoryRemote {
    /// Create a remote whose authenticated user is `teacher_username`.
    pub fn new(teacher_username: &str) -> Arc<Self> {
        let mut state = State::default();
        let id = state.allocate_id();
        let actor = RemoteUser {
            id,
            username: teacher_username.to_string(),
            name: format!("{teacher_username} (teacher)"),
        };
        state.users.insert(id, actor.clone());
        Arc::new(Self {
            actor,
            state: Mutex::new(state),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn actor(&self) -> RemoteUser {
        self.actor.clone()
    }

    pub fn add_user(&self, username: &str) -> RemoteUser {
        let mut state = self.state();
        let id = state.allocate_id();
        let user = RemoteUser {
            id,
            username: username.to_string(),
            name: username.to_string(),
        };
        state.users.insert(id, user.clone());
        user
    }

    /// Add a standalone project, e.g. an assignment template.
    pub fn add_project(&self, name: &str) -> Project {
        let mut state = self.state();
        let id = state.allocate_id();
        let project = Project {
            id,
            name: name.to_string(),
            path: name.to_string(),
            web_url: format!("https://remote.test/templates/{name}"),
            namespace_id: 0,
        };
        state.projects.insert(id, project.clone());
        project
    }

    /// Fail the next call of `op` with `err`. Repeated calls queue failures.
    pub fn fail_next(&self, op: Op, err: RemoteError) {
        self.fail_after(op, 0, err);
    }

    /// Let `successes` calls of `op` through, then fail one with `err`.
    pub fn fail_after(&self, op: Op, successes: usize, err: RemoteError) {
        let mut state = self.state();
        let queue = state.failures.entry(op).or_default();
        queue.extend(std::iter::repeat(None).take(successes));
        queue.push_back(Some(err));
    }

    pub fn set_reverse_subgroups(&self, reverse: bool) {
        self.state().reverse_subgroups = reverse;
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn group(&self, id: i64) -> Option<Group> {
        self.state().groups.get(&id).map(|g| g.group.clone())
    }

    pub fn group_description(&self, id: i64) -> Option<String> {
        self.state().groups.get(&id).map(|g| g.description.clone())
    }

    pub fn group_count(&self) -> usize {
        self.state().groups.len()
    }

    pub fn children(&self, parent_id: i64) -> Vec<Group> {
        self.state()
            .groups
            .values()
            .filter(|g| g.group.parent_id == Some(parent_id))
            .map(|g| g.group.clone())
            .collect()
    }

    pub fn projects_in(&self, namespace_id: i64) -> Vec<Project> {
        self.state()
            .projects
            .values()
            .filter(|p| p.namespace_id == namespace_id)
            .cloned()
            .collect()
    }

    pub fn is_group_member(&self, group_id: i64, user_id: i64) -> bool {
        self.state().group_members.contains_key(&(group_id, user_id))
    }

    pub fn project_access(&self, project_id: i64, user_id: i64) -> Option<AccessLevel> {
        self.state()
            .project_members
            .get(&(project_id, user_id))
            .copied()
    }

    /// Add a membership directly, bypassing failure injection.
    pub fn seed_membership(&self, group_id: i64, user_id: i64, level: AccessLevel) {
        self.state().group_members.insert((group_id, user_id), level);
    }

    /// Record the call and pop an injected failure, if any.
    fn enter(&self, state: &mut State, op: Op) -> Result<(), RemoteError> {
        *state.calls.entry(op).or_insert(0) += 1;
        match state.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteNamespaceClient for InMemoryRemote {
    async fn current_user(&self) -> Result<RemoteUser, RemoteError> {
        Ok(self.actor.clone())
    }

    async fn create_group(&self, group: &NewGroup) -> Result<Group, RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::CreateGroup)?;
        if let Some(parent_id) = group.parent_id {
            if !state.groups.contains_key(&parent_id) {
                return Err(RemoteError::not_found(format!("groups/{parent_id}")));
            }
        }
        if group.path.is_empty() {
            return Err(RemoteError::Rejected {
                status: 400,
                message: "path can't be blank".to_string(),
            });
        }
        if state.path_taken(group.parent_id, &group.path) {
            return Err(RemoteError::Rejected {
                status: 400,
                message: "path has already been taken".to_string(),
            });
        }
        let id = state.allocate_id();
        let mut created = Group {
            id,
            name: group.name.clone(),
            path: group.path.clone(),
            web_url: String::new(),
            parent_id: group.parent_id,
        };
        state.groups.insert(
            id,
            StoredGroup {
                group: created.clone(),
                description: group.description.clone(),
            },
        );
        created.web_url = format!("https://remote.test/groups/{}", state.full_path(id));
        if let Some(stored) = state.groups.get_mut(&id) {
            stored.group.web_url = created.web_url.clone();
        }
        Ok(created)
    }

    async fn get_group(&self, id: i64) -> Result<Group, RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::GetGroup)?;
        state
            .groups
            .get(&id)
            .map(|g| g.group.clone())
            .ok_or_else(|| RemoteError::not_found(format!("groups/{id}")))
    }

    async fn update_group(&self, id: i64, update: &GroupUpdate) -> Result<(), RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::UpdateGroup)?;
        let stored = state
            .groups
            .get_mut(&id)
            .ok_or_else(|| RemoteError::not_found(format!("groups/{id}")))?;
        if let Some(name) = &update.name {
            stored.group.name = name.clone();
        }
        if let Some(description) = &update.description {
            stored.description = description.clone();
        }
        Ok(())
    }

    async fn delete_group(&self, id: i64) -> Result<(), RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::DeleteGroup)?;
        if !state.groups.contains_key(&id) {
            return Err(RemoteError::not_found(format!("groups/{id}")));
        }
        let doomed = state.descendants(id);
        for group_id in &doomed {
            state.groups.remove(group_id);
        }
        state.projects.retain(|_, p| !doomed.contains(&p.namespace_id));
        let live_projects: Vec<i64> = state.projects.keys().copied().collect();
        state
            .group_members
            .retain(|(group_id, _), _| !doomed.contains(group_id));
        state
            .project_members
            .retain(|(project_id, _), _| live_projects.contains(project_id));
        Ok(())
    }

    async fn list_subgroups(&self, parent_id: i64) -> Result<Vec<Group>, RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::ListSubgroups)?;
        if !state.groups.contains_key(&parent_id) {
            return Err(RemoteError::not_found(format!("groups/{parent_id}")));
        }
        let mut children: Vec<Group> = state
            .groups
            .values()
            .filter(|g| g.group.parent_id == Some(parent_id))
            .map(|g| g.group.clone())
            .collect();
        if state.reverse_subgroups {
            children.reverse();
        }
        Ok(children)
    }

    async fn create_membership(
        &self,
        group_id: i64,
        user_id: i64,
        access_level: AccessLevel,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::CreateMembership)?;
        if !state.groups.contains_key(&group_id) {
            return Err(RemoteError::not_found(format!("groups/{group_id}")));
        }
        if !state.users.contains_key(&user_id) {
            return Err(RemoteError::not_found(format!("users/{user_id}")));
        }
        if state.group_members.contains_key(&(group_id, user_id)) {
            return Err(RemoteError::Rejected {
                status: 409,
                message: "Member already exists".to_string(),
            });
        }
        state.group_members.insert((group_id, user_id), access_level);
        Ok(())
    }

    async fn get_membership(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Membership, RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::GetMembership)?;
        let level = state
            .group_members
            .get(&(group_id, user_id))
            .copied()
            .ok_or_else(|| RemoteError::not_found(format!("groups/{group_id}/members/{user_id}")))?;
        let username = state
            .users
            .get(&user_id)
            .map(|u| u.username.clone())
            .unwrap_or_default();
        Ok(Membership {
            user_id,
            username,
            access_level: level,
        })
    }

    async fn delete_membership(&self, group_id: i64, user_id: i64) -> Result<(), RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::DeleteMembership)?;
        state
            .group_members
            .remove(&(group_id, user_id))
            .map(|_| ())
            .ok_or_else(|| RemoteError::not_found(format!("groups/{group_id}/members/{user_id}")))
    }

    async fn list_group_members(&self, group_id: i64) -> Result<Vec<RemoteUser>, RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::ListGroupMembers)?;
        if !state.groups.contains_key(&group_id) {
            return Err(RemoteError::not_found(format!("groups/{group_id}")));
        }
        Ok(state
            .group_members
            .keys()
            .filter(|(g, _)| *g == group_id)
            .filter_map(|(_, user_id)| state.users.get(user_id).cloned())
            .collect())
    }

    async fn get_project(&self, id: i64) -> Result<Project, RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::GetProject)?;
        state
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("projects/{id}")))
    }

    async fn search_projects(
        &self,
        query: &str,
        namespace_id: i64,
    ) -> Result<Vec<Project>, RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::SearchProjects)?;
        let needle = query.to_lowercase();
        Ok(state
            .projects
            .values()
            .filter(|p| p.namespace_id == namespace_id && p.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn fork_project(
        &self,
        project_id: i64,
        fork: &ForkRequest,
    ) -> Result<Project, RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::ForkProject)?;
        if !state.projects.contains_key(&project_id) {
            return Err(RemoteError::not_found(format!("projects/{project_id}")));
        }
        if !state.groups.contains_key(&fork.namespace_id) {
            return Err(RemoteError::not_found(format!("groups/{}", fork.namespace_id)));
        }
        if state.path_taken(Some(fork.namespace_id), &fork.path) {
            return Err(RemoteError::Rejected {
                status: 409,
                message: "path has already been taken".to_string(),
            });
        }
        let id = state.allocate_id();
        let project = Project {
            id,
            name: fork.name.clone(),
            path: fork.path.clone(),
            web_url: format!(
                "https://remote.test/groups/{}/{}",
                state.full_path(fork.namespace_id),
                fork.path
            ),
            namespace_id: fork.namespace_id,
        };
        state.projects.insert(id, project.clone());
        Ok(project)
    }

    async fn create_project_membership(
        &self,
        project_id: i64,
        user_id: i64,
        access_level: AccessLevel,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::CreateProjectMembership)?;
        if !state.projects.contains_key(&project_id) {
            return Err(RemoteError::not_found(format!("projects/{project_id}")));
        }
        if state.project_members.contains_key(&(project_id, user_id)) {
            return Err(RemoteError::Rejected {
                status: 409,
                message: "Member already exists".to_string(),
            });
        }
        state
            .project_members
            .insert((project_id, user_id), access_level);
        Ok(())
    }

    async fn list_users(&self, username: &str) -> Result<Vec<RemoteUser>, RemoteError> {
        let mut state = self.state();
        self.enter(&mut state, Op::ListUsers)?;
        Ok(state
            .users
            .values()
            .filter(|u| u.username.eq_ignore_ascii_case(username))
            .cloned()
            .collect())
    }
}

/// Connector handing out the shared fake for one accepted token.
pub struct InMemoryConnector {
    pub remote: Arc<InMemoryRemote>,
    pub token: String,
}

impl RemoteConnector for InMemoryConnector {
    fn connect(&self, token: &str) -> Result<Arc<dyn RemoteNamespaceClient>, RemoteError> {
        if token != self.token {
            return Err(RemoteError::Unauthorized);
        }
        let client: Arc<dyn RemoteNamespaceClient> = self.remote.clone();
        Ok(client)
    }
}
