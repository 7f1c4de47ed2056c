//! Remote namespace client abstraction.
//!
//! The sync engine talks to the hosting service exclusively through
//! [`RemoteNamespaceClient`]. Production code uses the GitLab REST client; tests
//! use the in-memory fake.

mod gitlab;
#[cfg(test)]
pub mod memory;

pub use gitlab::*;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access levels understood by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessLevel {
    Guest,
    Reporter,
    Developer,
    Maintainer,
    Owner,
}

impl AccessLevel {
    /// Numeric value used on the wire.
    pub fn as_i64(self) -> i64 {
        match self {
            AccessLevel::Guest => 10,
            AccessLevel::Reporter => 20,
            AccessLevel::Developer => 30,
            AccessLevel::Maintainer => 40,
            AccessLevel::Owner => 50,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            10 => Some(AccessLevel::Guest),
            20 => Some(AccessLevel::Reporter),
            30 => Some(AccessLevel::Developer),
            40 => Some(AccessLevel::Maintainer),
            50 => Some(AccessLevel::Owner),
            _ => None,
        }
    }
}

/// A remote group (namespace container).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub web_url: String,
    pub parent_id: Option<i64>,
}

/// A remote project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub web_url: String,
    pub namespace_id: i64,
}

/// A remote user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: i64,
    pub username: String,
    pub name: String,
}

/// A user's membership in a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub user_id: i64,
    pub username: String,
    pub access_level: AccessLevel,
}

/// Parameters for creating a group.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub path: String,
    pub description: String,
    pub parent_id: Option<i64>,
}

/// Partial group update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Parameters for forking a project.
#[derive(Debug, Clone)]
pub struct ForkRequest {
    pub namespace_id: i64,
    pub name: String,
    pub path: String,
}

/// Failures reported by the remote service or the transport.
///
/// The `Display` output is safe to show to users; transport details are only
/// kept in fields for logging.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("remote credential was rejected")]
    Unauthorized,

    #[error("remote service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("remote service failed ({status})")]
    Server { status: u16 },

    #[error("remote service unreachable")]
    Unreachable { detail: String, before_send: bool },

    #[error("remote service timed out")]
    Timeout,

    #[error("unexpected response from remote service")]
    Decode { detail: String },
}

impl RemoteError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        RemoteError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized)
    }

    /// Whether the failure may succeed on a retry of the same request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Server { .. } | RemoteError::Unreachable { .. } | RemoteError::Timeout
        )
    }
}

/// Group/project/membership operations consumed by the sync engine.
#[async_trait]
pub trait RemoteNamespaceClient: Send + Sync {
    /// The account the client is authenticated as.
    async fn current_user(&self) -> Result<RemoteUser, RemoteError>;

    async fn create_group(&self, group: &NewGroup) -> Result<Group, RemoteError>;
    async fn get_group(&self, id: i64) -> Result<Group, RemoteError>;
    async fn update_group(&self, id: i64, update: &GroupUpdate) -> Result<(), RemoteError>;
    async fn delete_group(&self, id: i64) -> Result<(), RemoteError>;
    async fn list_subgroups(&self, parent_id: i64) -> Result<Vec<Group>, RemoteError>;

    async fn create_membership(
        &self,
        group_id: i64,
        user_id: i64,
        access_level: AccessLevel,
    ) -> Result<(), RemoteError>;
    async fn get_membership(&self, group_id: i64, user_id: i64)
        -> Result<Membership, RemoteError>;
    async fn delete_membership(&self, group_id: i64, user_id: i64) -> Result<(), RemoteError>;
    async fn list_group_members(&self, group_id: i64) -> Result<Vec<RemoteUser>, RemoteError>;

    async fn get_project(&self, id: i64) -> Result<Project, RemoteError>;
    async fn search_projects(
        &self,
        query: &str,
        namespace_id: i64,
    ) -> Result<Vec<Project>, RemoteError>;
    async fn fork_project(
        &self,
        project_id: i64,
        fork: &ForkRequest,
    ) -> Result<Project, RemoteError>;
    async fn create_project_membership(
        &self,
        project_id: i64,
        user_id: i64,
        access_level: AccessLevel,
    ) -> Result<(), RemoteError>;

    async fn list_users(&self, username: &str) -> Result<Vec<RemoteUser>, RemoteError>;
}

/// Builds a client bound to one access token.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, token: &str) -> Result<Arc<dyn RemoteNamespaceClient>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_level_wire_values() {
        assert_eq!(AccessLevel::Developer.as_i64(), 30);
        assert_eq!(AccessLevel::from_i64(30), Some(AccessLevel::Developer));
        assert_eq!(AccessLevel::from_i64(31), None);
    }

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Timeout.is_transient());
        assert!(RemoteError::Server { status: 502 }.is_transient());
        assert!(!RemoteError::not_found("group 1").is_transient());
        assert!(!RemoteError::Rejected {
            status: 400,
            message: "bad".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_display_hides_transport_detail() {
        let err = RemoteError::Unreachable {
            detail: "tcp connect error: 10.0.0.3:443".to_string(),
            before_send: true,
        };
        assert_eq!(err.to_string(), "remote service unreachable");
    }
}
