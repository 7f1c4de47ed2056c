//! GitLab REST v4 implementation of [`RemoteNamespaceClient`].
//!
//! Every call carries the configured timeout. Transient failures (5xx, timeouts,
//! connection errors) are retried with linear backoff on idempotent methods; a POST
//! is only retried when the connection failed before anything was sent. 4xx
//! responses are never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use super::{
    AccessLevel, ForkRequest, Group, GroupUpdate, Membership, NewGroup, Project, RemoteConnector,
    RemoteError, RemoteNamespaceClient, RemoteUser,
};
use crate::config::RemoteSettings;

/// Header carrying the personal access token.
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// Page size used for list endpoints.
const PAGE_SIZE: usize = 100;

/// Retry behaviour for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 200,
        }
    }
}

impl From<&RemoteSettings> for RetryPolicy {
    fn from(settings: &RemoteSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_backoff_ms: settings.base_backoff_ms,
        }
    }
}

/// GitLab API client bound to a single access token.
pub struct GitLabClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    retry: RetryPolicy,
}

impl GitLabClient {
    /// Bind a token to a shared connection pool.
    pub fn with_http(http: reqwest::Client, settings: &RemoteSettings, token: &str) -> Self {
        Self {
            http,
            api_base: format!("{}/api/v4", settings.base_url.trim_end_matches('/')),
            token: token.to_string(),
            retry: RetryPolicy::from(settings),
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response, RemoteError> {
        let url = format!("{}{}", self.api_base, path);
        let idempotent = method != Method::POST;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self
                .http
                .request(method.clone(), &url)
                .header(TOKEN_HEADER, &self.token)
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            let err = match request.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => error_from_response(path, resp).await,
                Err(e) => error_from_transport(&e),
            };

            let retryable = match &err {
                RemoteError::Unreachable { before_send, .. } => idempotent || *before_send,
                other => idempotent && other.is_transient(),
            };
            if !retryable || attempt >= self.retry.max_attempts {
                if let RemoteError::Unreachable { detail, .. } | RemoteError::Decode { detail } =
                    &err
                {
                    tracing::warn!(%method, path, attempt, detail = %detail, "remote call failed");
                }
                return Err(err);
            }

            tracing::warn!(%method, path, attempt, error = %err, "retrying remote call");
            tokio::time::sleep(Duration::from_millis(
                self.retry.base_backoff_ms.saturating_mul(attempt as u64),
            ))
            .await;
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        let resp = self.execute(Method::GET, path, query, None).await?;
        decode(resp).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<T, RemoteError> {
        let resp = self.execute(method, path, &[], Some(body)).await?;
        decode(resp).await
    }

    /// Follow `x-next-page` until the listing is exhausted.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, RemoteError> {
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            let mut paged = query.to_vec();
            paged.push(("per_page", PAGE_SIZE.to_string()));
            paged.push(("page", page.to_string()));

            let resp = self.execute(Method::GET, path, &paged, None).await?;
            let next = resp
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<usize>().ok());
            let batch: Vec<T> = decode(resp).await?;
            let len = batch.len();
            items.extend(batch);

            match next {
                Some(n) if n > page => page = n,
                None if len == PAGE_SIZE => page += 1,
                _ => break,
            }
        }
        Ok(items)
    }
}

fn build_http_client(settings: &RemoteSettings) -> Result<reqwest::Client, RemoteError> {
    reqwest::Client::builder()
        .timeout(settings.timeout)
        .build()
        .map_err(|e| RemoteError::Unreachable {
            detail: format!("failed to build http client: {e}"),
            before_send: true,
        })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, RemoteError> {
    resp.json::<T>().await.map_err(|e| RemoteError::Decode {
        detail: e.to_string(),
    })
}

fn error_from_transport(err: &reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Unreachable {
            detail: err.to_string(),
            before_send: err.is_connect(),
        }
    }
}

async fn error_from_response(path: &str, resp: Response) -> RemoteError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").or_else(|| v.get("error")).cloned())
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

    match status {
        StatusCode::NOT_FOUND => RemoteError::not_found(path.trim_start_matches('/')),
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized,
        s if s.is_client_error() => RemoteError::Rejected {
            status: s.as_u16(),
            message,
        },
        s => RemoteError::Server { status: s.as_u16() },
    }
}

// Wire payloads

#[derive(Debug, Deserialize)]
struct GroupPayload {
    id: i64,
    name: String,
    path: String,
    #[serde(default)]
    web_url: String,
    #[serde(default)]
    parent_id: Option<i64>,
}

impl From<GroupPayload> for Group {
    fn from(p: GroupPayload) -> Self {
        Group {
            id: p.id,
            name: p.name,
            path: p.path,
            web_url: p.web_url,
            parent_id: p.parent_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NamespacePayload {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ProjectPayload {
    id: i64,
    name: String,
    path: String,
    #[serde(default)]
    web_url: String,
    namespace: NamespacePayload,
}

impl From<ProjectPayload> for Project {
    fn from(p: ProjectPayload) -> Self {
        Project {
            id: p.id,
            name: p.name,
            path: p.path,
            web_url: p.web_url,
            namespace_id: p.namespace.id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: i64,
    username: String,
    #[serde(default)]
    name: String,
}

impl From<UserPayload> for RemoteUser {
    fn from(p: UserPayload) -> Self {
        RemoteUser {
            id: p.id,
            username: p.username,
            name: p.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MemberPayload {
    id: i64,
    username: String,
    access_level: i64,
}

#[async_trait]
impl RemoteNamespaceClient for GitLabClient {
    #[instrument(name = "remote_current_user", skip(self))]
    async fn current_user(&self) -> Result<RemoteUser, RemoteError> {
        let user: UserPayload = self.get_json("/user", &[]).await?;
        Ok(user.into())
    }

    #[instrument(name = "remote_create_group", skip(self, group), fields(path = %group.path))]
    async fn create_group(&self, group: &NewGroup) -> Result<Group, RemoteError> {
        let mut body = json!({
            "name": group.name,
            "path": group.path,
            "description": group.description,
        });
        if let Some(parent_id) = group.parent_id {
            body["parent_id"] = json!(parent_id);
        }
        let created: GroupPayload = self.send_json(Method::POST, "/groups", &body).await?;
        Ok(created.into())
    }

    #[instrument(name = "remote_get_group", skip(self))]
    async fn get_group(&self, id: i64) -> Result<Group, RemoteError> {
        let group: GroupPayload = self
            .get_json(
                &format!("/groups/{id}"),
                &[("with_projects", "false".to_string())],
            )
            .await?;
        Ok(group.into())
    }

    #[instrument(name = "remote_update_group", skip(self, update))]
    async fn update_group(&self, id: i64, update: &GroupUpdate) -> Result<(), RemoteError> {
        let mut body = json!({});
        if let Some(name) = &update.name {
            body["name"] = json!(name);
        }
        if let Some(description) = &update.description {
            body["description"] = json!(description);
        }
        self.execute(Method::PUT, &format!("/groups/{id}"), &[], Some(&body))
            .await?;
        Ok(())
    }

    #[instrument(name = "remote_delete_group", skip(self))]
    async fn delete_group(&self, id: i64) -> Result<(), RemoteError> {
        self.execute(Method::DELETE, &format!("/groups/{id}"), &[], None)
            .await?;
        Ok(())
    }

    #[instrument(name = "remote_list_subgroups", skip(self))]
    async fn list_subgroups(&self, parent_id: i64) -> Result<Vec<Group>, RemoteError> {
        let groups: Vec<GroupPayload> = self
            .get_all(
                &format!("/groups/{parent_id}/subgroups"),
                &[("all_available", "true".to_string())],
            )
            .await?;
        Ok(groups.into_iter().map(Group::from).collect())
    }

    #[instrument(name = "remote_create_membership", skip(self))]
    async fn create_membership(
        &self,
        group_id: i64,
        user_id: i64,
        access_level: AccessLevel,
    ) -> Result<(), RemoteError> {
        let body = json!({ "user_id": user_id, "access_level": access_level.as_i64() });
        self.execute(
            Method::POST,
            &format!("/groups/{group_id}/members"),
            &[],
            Some(&body),
        )
        .await?;
        Ok(())
    }

    #[instrument(name = "remote_get_membership", skip(self))]
    async fn get_membership(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Membership, RemoteError> {
        let member: MemberPayload = self
            .get_json(&format!("/groups/{group_id}/members/{user_id}"), &[])
            .await?;
        Ok(Membership {
            user_id: member.id,
            username: member.username,
            access_level: AccessLevel::from_i64(member.access_level).unwrap_or(AccessLevel::Guest),
        })
    }

    #[instrument(name = "remote_delete_membership", skip(self))]
    async fn delete_membership(&self, group_id: i64, user_id: i64) -> Result<(), RemoteError> {
        self.execute(
            Method::DELETE,
            &format!("/groups/{group_id}/members/{user_id}"),
            &[],
            None,
        )
        .await?;
        Ok(())
    }

    #[instrument(name = "remote_list_group_members", skip(self))]
    async fn list_group_members(&self, group_id: i64) -> Result<Vec<RemoteUser>, RemoteError> {
        let members: Vec<UserPayload> = self
            .get_all(&format!("/groups/{group_id}/members"), &[])
            .await?;
        Ok(members.into_iter().map(RemoteUser::from).collect())
    }

    #[instrument(name = "remote_get_project", skip(self))]
    async fn get_project(&self, id: i64) -> Result<Project, RemoteError> {
        let project: ProjectPayload = self.get_json(&format!("/projects/{id}"), &[]).await?;
        Ok(project.into())
    }

    #[instrument(name = "remote_search_projects", skip(self))]
    async fn search_projects(
        &self,
        query: &str,
        namespace_id: i64,
    ) -> Result<Vec<Project>, RemoteError> {
        let projects: Vec<ProjectPayload> = self
            .get_all(
                &format!("/groups/{namespace_id}/projects"),
                &[("search", query.to_string())],
            )
            .await?;
        Ok(projects.into_iter().map(Project::from).collect())
    }

    #[instrument(name = "remote_fork_project", skip(self, fork), fields(path = %fork.path))]
    async fn fork_project(
        &self,
        project_id: i64,
        fork: &ForkRequest,
    ) -> Result<Project, RemoteError> {
        let body = json!({
            "namespace_id": fork.namespace_id,
            "name": fork.name,
            "path": fork.path,
        });
        let project: ProjectPayload = self
            .send_json(Method::POST, &format!("/projects/{project_id}/fork"), &body)
            .await?;
        Ok(project.into())
    }

    #[instrument(name = "remote_create_project_membership", skip(self))]
    async fn create_project_membership(
        &self,
        project_id: i64,
        user_id: i64,
        access_level: AccessLevel,
    ) -> Result<(), RemoteError> {
        let body = json!({ "user_id": user_id, "access_level": access_level.as_i64() });
        self.execute(
            Method::POST,
            &format!("/projects/{project_id}/members"),
            &[],
            Some(&body),
        )
        .await?;
        Ok(())
    }

    #[instrument(name = "remote_list_users", skip(self))]
    async fn list_users(&self, username: &str) -> Result<Vec<RemoteUser>, RemoteError> {
        let users: Vec<UserPayload> = self
            .get_json("/users", &[("username", username.to_string())])
            .await?;
        Ok(users.into_iter().map(RemoteUser::from).collect())
    }
}

/// Connector sharing one connection pool across per-request clients.
pub struct GitLabConnector {
    settings: RemoteSettings,
    http: reqwest::Client,
}

impl GitLabConnector {
    pub fn new(settings: RemoteSettings) -> Result<Self, RemoteError> {
        let http = build_http_client(&settings)?;
        Ok(Self { settings, http })
    }
}

impl RemoteConnector for GitLabConnector {
    fn connect(&self, token: &str) -> Result<Arc<dyn RemoteNamespaceClient>, RemoteError> {
        if token.trim().is_empty() {
            return Err(RemoteError::Unauthorized);
        }
        Ok(Arc::new(GitLabClient::with_http(
            self.http.clone(),
            &self.settings,
            token,
        )))
    }
}
