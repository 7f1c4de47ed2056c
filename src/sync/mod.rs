//! Reconciliation between local classroom entities and the remote namespace.
//!
//! The engines in this module only talk to the remote service; persisting the
//! resulting ids (or rolling back local rows) is the service layer's job.

mod fork;
mod hierarchy;
mod identity;
mod locks;
mod membership;
mod path;

pub use fork::*;
pub use hierarchy::*;
pub use identity::*;
pub use locks::*;
pub use membership::*;
pub use path::*;

use std::str::FromStr;

use thiserror::Error;

use crate::remote::RemoteError;

/// Failures surfaced by sync operations.
///
/// Messages name the affected entity and the remote cause and are meant to be
/// shown to users as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("remote {entity} no longer exists ({source})")]
    RemoteNotFound { entity: String, source: RemoteError },

    #[error("could not create remote {entity}: {source}")]
    RemoteCreate { entity: String, source: RemoteError },

    #[error("could not update remote {entity}: {source}")]
    RemoteUpdate { entity: String, source: RemoteError },

    #[error("could not delete remote {entity}: {source}")]
    RemoteDelete { entity: String, source: RemoteError },

    #[error("remote credential was rejected while syncing {entity}")]
    RemoteAuth { entity: String },

    #[error("student {username} has no remote account")]
    UnresolvedIdentity { username: String },

    #[error("template project {template_id} not found")]
    TemplateNotFound { template_id: i64 },
}

impl SyncError {
    pub fn create(entity: impl Into<String>, source: RemoteError) -> Self {
        let entity = entity.into();
        if source.is_unauthorized() {
            return SyncError::RemoteAuth { entity };
        }
        SyncError::RemoteCreate { entity, source }
    }

    pub fn update(entity: impl Into<String>, source: RemoteError) -> Self {
        let entity = entity.into();
        if source.is_unauthorized() {
            return SyncError::RemoteAuth { entity };
        }
        SyncError::RemoteUpdate { entity, source }
    }

    pub fn delete(entity: impl Into<String>, source: RemoteError) -> Self {
        let entity = entity.into();
        if source.is_unauthorized() {
            return SyncError::RemoteAuth { entity };
        }
        SyncError::RemoteDelete { entity, source }
    }

    /// Like `fallback`, but a missing resource becomes [`SyncError::RemoteNotFound`].
    pub fn lookup(
        entity: impl Into<String>,
        source: RemoteError,
        fallback: fn(String, RemoteError) -> SyncError,
    ) -> Self {
        let entity = entity.into();
        if source.is_not_found() {
            return SyncError::RemoteNotFound { entity, source };
        }
        fallback(entity, source)
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::RemoteAuth { .. })
    }
}

/// What happens to a local record whose remote counterpart cannot be verified
/// after a failed update or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsistencyPolicy {
    /// Remove the local record; it can no longer be trusted.
    #[default]
    StrictRemoteConsistency,
    /// Reject the operation and leave the local record as it was.
    KeepLocal,
}

impl ConsistencyPolicy {
    pub fn removes_unverified(self) -> bool {
        matches!(self, ConsistencyPolicy::StrictRemoteConsistency)
    }
}

impl FromStr for ConsistencyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ConsistencyPolicy::StrictRemoteConsistency),
            "keep-local" | "keep_local" => Ok(ConsistencyPolicy::KeepLocal),
            other => Err(format!("unknown consistency policy: {other}")),
        }
    }
}

/// Fixed-role children of a classroom group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubgroupRole {
    Members,
    Assignments,
}

impl SubgroupRole {
    /// Literal remote group name of the role.
    pub fn name(self) -> &'static str {
        match self {
            SubgroupRole::Members => "MEMBERS",
            SubgroupRole::Assignments => "ASSIGNMENTS",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SubgroupRole::Members => "Classroom Members",
            SubgroupRole::Assignments => "Assignments folder",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_always_maps_to_auth() {
        let err = SyncError::create("group for classroom 'A'", RemoteError::Unauthorized);
        assert!(err.is_auth());
        let err = SyncError::delete("group 4", RemoteError::Unauthorized);
        assert!(err.is_auth());
    }

    #[test]
    fn test_lookup_distinguishes_not_found() {
        let err = SyncError::lookup(
            "group 4",
            RemoteError::not_found("groups/4"),
            SyncError::update,
        );
        assert!(matches!(err, SyncError::RemoteNotFound { .. }));

        let err = SyncError::lookup(
            "group 4",
            RemoteError::Server { status: 500 },
            SyncError::update,
        );
        assert!(matches!(err, SyncError::RemoteUpdate { .. }));
    }

    #[test]
    fn test_message_names_entity_without_transport_detail() {
        let err = SyncError::create(
            "group for classroom 'Systems'",
            RemoteError::Unreachable {
                detail: "dns error: no such host".to_string(),
                before_send: true,
            },
        );
        let message = err.to_string();
        assert!(message.contains("classroom 'Systems'"));
        assert!(!message.contains("dns"));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "strict".parse::<ConsistencyPolicy>().unwrap(),
            ConsistencyPolicy::StrictRemoteConsistency
        );
        assert_eq!(
            "keep-local".parse::<ConsistencyPolicy>().unwrap(),
            ConsistencyPolicy::KeepLocal
        );
        assert!("lenient".parse::<ConsistencyPolicy>().is_err());
    }
}
