use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use super::SyncError;
use crate::remote::{RemoteNamespaceClient, RemoteUser};

/// How a student username resolved against the remote user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum IdentityResolution {
    /// Linked to the remote account with this id.
    Resolved { external_id: i64 },
    /// No remote account carries the username.
    NoAccount,
    /// The remote account is already linked to another student.
    Duplicate { external_id: i64 },
    /// The lookup itself failed; the student stays unresolved.
    Failed { message: String },
}

impl IdentityResolution {
    pub fn external_id(&self) -> Option<i64> {
        match self {
            IdentityResolution::Resolved { external_id } => Some(*external_id),
            _ => None,
        }
    }
}

/// Maps student usernames to remote account ids.
#[derive(Clone)]
pub struct IdentityResolver {
    remote: Arc<dyn RemoteNamespaceClient>,
}

impl IdentityResolver {
    pub fn new(remote: Arc<dyn RemoteNamespaceClient>) -> Self {
        Self { remote }
    }

    /// Find the remote account whose username matches exactly (ignoring ASCII case).
    pub async fn lookup(&self, username: &str) -> Result<Option<RemoteUser>, SyncError> {
        let users = self
            .remote
            .list_users(username)
            .await
            .map_err(|e| SyncError::lookup(format!("account of {username}"), e, SyncError::update))?;
        Ok(users
            .into_iter()
            .find(|u| u.username.eq_ignore_ascii_case(username)))
    }

    /// Resolve a username, rejecting accounts that `taken` reports as already
    /// linked to another student. Remote failures are folded into
    /// [`IdentityResolution::Failed`]; only errors from `taken` propagate.
    pub async fn resolve<F, Fut, E>(&self, username: &str, taken: F) -> Result<IdentityResolution, E>
    where
        F: FnOnce(i64) -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        let user = match self.lookup(username).await {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(IdentityResolution::NoAccount),
            Err(e) => {
                tracing::warn!(username, error = %e, "identity lookup failed");
                return Ok(IdentityResolution::Failed {
                    message: e.to_string(),
                });
            }
        };
        if taken(user.id).await? {
            tracing::warn!(
                username,
                external_id = user.id,
                "remote account already linked to another student"
            );
            return Ok(IdentityResolution::Duplicate {
                external_id: user.id,
            });
        }
        Ok(IdentityResolution::Resolved {
            external_id: user.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::{InMemoryRemote, Op};
    use crate::remote::RemoteError;

    #[tokio::test]
    async fn test_lookup_matches_username() {
        let remote = InMemoryRemote::new("teacher");
        let carol = remote.add_user("Carol");
        let resolver = IdentityResolver::new(remote.clone());

        let found = resolver.lookup("carol").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(carol.id));
        assert!(resolver.lookup("dave").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_failure_is_error() {
        let remote = InMemoryRemote::new("teacher");
        remote.fail_next(Op::ListUsers, RemoteError::Timeout);

        let err = IdentityResolver::new(remote.clone())
            .lookup("carol")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteUpdate { .. }));
    }

    #[tokio::test]
    async fn test_resolve_outcomes() {
        let remote = InMemoryRemote::new("teacher");
        let erin = remote.add_user("erin");
        let resolver = IdentityResolver::new(remote.clone());

        let free = |_: i64| async { Ok::<_, ()>(false) };
        let taken = |_: i64| async { Ok::<_, ()>(true) };

        assert_eq!(
            resolver.resolve("erin", free).await,
            Ok(IdentityResolution::Resolved {
                external_id: erin.id
            })
        );
        assert_eq!(
            resolver.resolve("erin", taken).await,
            Ok(IdentityResolution::Duplicate {
                external_id: erin.id
            })
        );
        assert_eq!(
            resolver.resolve("nobody", free).await,
            Ok(IdentityResolution::NoAccount)
        );

        remote.fail_next(Op::ListUsers, RemoteError::Server { status: 502 });
        assert!(matches!(
            resolver.resolve("erin", free).await,
            Ok(IdentityResolution::Failed { .. })
        ));
    }

    #[test]
    fn test_only_resolved_carries_id() {
        assert_eq!(
            IdentityResolution::Resolved { external_id: 7 }.external_id(),
            Some(7)
        );
        assert_eq!(
            IdentityResolution::Duplicate { external_id: 7 }.external_id(),
            None
        );
    }
}
