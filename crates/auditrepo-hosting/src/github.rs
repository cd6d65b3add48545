//! GitHub implementation of [`HostingClient`].
//!
//! Repository, contents, label and git-ref operations go through the REST
//! API. Project boards (Projects v2) are only reachable through GraphQL.

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::HostingClient;
use crate::error::{HostingError, HostingErrorKind, HostingResult};
use crate::types::{
    BoardHandle, BoardTemplate, IssueTemplate, LabelSpec, LabelSyncOutcome, RefOutcome,
    RepoHandle, TagSpec, TemplateOutcome,
};

const API_VERSION: &str = "2022-11-28";
const LABEL_PAGE_SIZE: usize = 100;

/// GitHub connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// REST base URL; `https://api.github.com` or a GitHub Enterprise `/api/v3` root.
    pub api_url: String,
    /// GraphQL endpoint. Derived from `api_url` when `None`.
    #[serde(default)]
    pub graphql_url: Option<String>,
    /// Organization that owns created repositories.
    pub organization: String,
    /// Access token with `repo` and `project` scopes.
    #[serde(skip_serializing)]
    pub token: String,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("graphql_url", &self.graphql_url)
            .field("organization", &self.organization)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl GitHubConfig {
    pub fn new(organization: &str, token: &str) -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            graphql_url: None,
            organization: organization.to_string(),
            token: token.to_string(),
        }
    }

    /// Point at a different API root (GitHub Enterprise or a test server).
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    fn graphql_endpoint(&self) -> String {
        if let Some(url) = &self.graphql_url {
            return url.clone();
        }
        let base = self.api_url.trim_end_matches('/');
        match base.strip_suffix("/api/v3") {
            Some(enterprise) => format!("{enterprise}/api/graphql"),
            None => format!("{base}/graphql"),
        }
    }
}

/// GitHub API client.
#[derive(Debug)]
pub struct GitHubClient {
    config: GitHubConfig,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct RepoPayload {
    name: String,
    node_id: String,
    clone_url: String,
    #[serde(default)]
    default_branch: Option<String>,
    owner: OwnerPayload,
}

#[derive(Debug, Deserialize)]
struct OwnerPayload {
    login: String,
}

#[derive(Debug, Deserialize)]
struct LabelPayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TagObjectPayload {
    sha: String,
}

impl RepoPayload {
    /// An empty repository reports no usable default branch; the handle
    /// carries an empty one until the first push names it.
    fn into_handle(self) -> RepoHandle {
        RepoHandle {
            owner: self.owner.login,
            name: self.name,
            node_id: self.node_id,
            clone_url: self.clone_url,
            default_branch: self.default_branch.unwrap_or_default(),
        }
    }
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> HostingResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("auditrepo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HostingError::transport("build_client", e))?;
        Ok(Self { config, http })
    }

    pub fn organization(&self) -> &str {
        &self.config.organization
    }

    fn endpoint(&self, operation: &'static str, segments: &[&str]) -> HostingResult<Url> {
        let mut url = Url::parse(&self.config.api_url)
            .map_err(|e| HostingError::decode(operation, format!("invalid api url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| HostingError::decode(operation, "api url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.config.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(USER_AGENT, concat!("auditrepo/", env!("CARGO_PKG_VERSION")))
    }

    /// Send a request, turning any non-2xx answer into a classified error.
    async fn send(&self, operation: &'static str, request: RequestBuilder) -> HostingResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| HostingError::transport(operation, e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(operation, status = status.as_u16(), "hosting call rejected");
        Err(HostingError::from_status(operation, status.as_u16(), &body))
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> HostingResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| HostingError::decode(operation, e.without_url()))
    }

    async fn graphql(&self, operation: &'static str, query: &str, variables: Value) -> HostingResult<Value> {
        let url = Url::parse(&self.config.graphql_endpoint())
            .map_err(|e| HostingError::decode(operation, format!("invalid graphql url: {e}")))?;
        let response = self
            .send(
                operation,
                self.request(Method::POST, url)
                    .json(&json!({ "query": query, "variables": variables })),
            )
            .await?;
        let body: Value = Self::decode(operation, response).await?;

        // GraphQL reports failures in-band with a 200.
        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                let messages: Vec<String> = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                    .map(str::to_string)
                    .collect();
                let not_found = errors
                    .iter()
                    .any(|e| e.get("type").and_then(|t| t.as_str()) == Some("NOT_FOUND"));
                let kind = if not_found {
                    HostingErrorKind::NotFound
                } else {
                    HostingErrorKind::Rejected
                };
                return Err(HostingError::new(operation, kind, messages.join("; ")));
            }
        }
        body.get("data")
            .cloned()
            .ok_or_else(|| HostingError::decode(operation, "graphql response without data"))
    }

    async fn list_labels(&self, repo: &RepoHandle) -> HostingResult<Vec<String>> {
        const OP: &str = "list_labels";
        let mut names = Vec::new();
        let mut page = 1usize;
        loop {
            let mut url = self.endpoint(OP, &["repos", &repo.owner, &repo.name, "labels"])?;
            url.query_pairs_mut()
                .append_pair("per_page", &LABEL_PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());
            let response = self.send(OP, self.request(Method::GET, url)).await?;
            let batch: Vec<LabelPayload> = Self::decode(OP, response).await?;
            let len = batch.len();
            names.extend(batch.into_iter().map(|l| l.name));
            if len < LABEL_PAGE_SIZE {
                return Ok(names);
            }
            page += 1;
        }
    }

    async fn create_ref(
        &self,
        operation: &'static str,
        repo: &RepoHandle,
        full_ref: &str,
        sha: &str,
    ) -> HostingResult<RefOutcome> {
        let url = self.endpoint(operation, &["repos", &repo.owner, &repo.name, "git", "refs"])?;
        let result = self
            .send(
                operation,
                self.request(Method::POST, url)
                    .json(&json!({ "ref": full_ref, "sha": sha })),
            )
            .await;
        match result {
            Ok(_) => Ok(RefOutcome::Created),
            Err(e) if e.is_already_exists() => Ok(RefOutcome::AlreadyExists),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl HostingClient for GitHubClient {
    async fn create_repository(&self, name: &str, private: bool) -> HostingResult<RepoHandle> {
        const OP: &str = "create_repository";
        let org = &self.config.organization;

        let probe = self.endpoint(OP, &["repos", org, name])?;
        match self.send(OP, self.request(Method::GET, probe)).await {
            Ok(_) => {
                return Err(HostingError::new(
                    OP,
                    HostingErrorKind::AlreadyExists,
                    format!("repository {org}/{name} already exists"),
                ))
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let url = self.endpoint(OP, &["orgs", org, "repos"])?;
        let response = self
            .send(
                OP,
                self.request(Method::POST, url).json(&json!({
                    "name": name,
                    "private": private,
                    "auto_init": false,
                    "has_issues": true,
                    "has_projects": true,
                })),
            )
            .await?;
        let payload: RepoPayload = Self::decode(OP, response).await?;
        info!(repo = %format!("{org}/{name}"), "created repository");
        Ok(payload.into_handle())
    }

    async fn set_issue_template(
        &self,
        repo: &RepoHandle,
        template: &IssueTemplate,
    ) -> HostingResult<TemplateOutcome> {
        const OP: &str = "set_issue_template";
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str(), "contents"];
        segments.extend(template.path.split('/'));
        let url = self.endpoint(OP, &segments)?;

        match self.send(OP, self.request(Method::GET, url.clone())).await {
            Ok(_) => return Ok(TemplateOutcome::AlreadyPresent),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let content = base64::engine::general_purpose::STANDARD.encode(template.body.as_bytes());
        self.send(
            OP,
            self.request(Method::PUT, url).json(&json!({
                "message": template.commit_message,
                "content": content,
                "branch": repo.default_branch,
            })),
        )
        .await?;
        Ok(TemplateOutcome::Created)
    }

    async fn ensure_labels(
        &self,
        repo: &RepoHandle,
        labels: &[LabelSpec],
    ) -> HostingResult<LabelSyncOutcome> {
        const OP: &str = "ensure_labels";
        let present: Vec<String> = self
            .list_labels(repo)
            .await?
            .into_iter()
            .map(|n| n.to_lowercase())
            .collect();

        let mut outcome = LabelSyncOutcome::default();
        for label in labels {
            if present.contains(&label.name.to_lowercase()) {
                outcome.existing.push(label.name.clone());
                continue;
            }
            let url = self.endpoint(OP, &["repos", &repo.owner, &repo.name, "labels"])?;
            let result = self
                .send(
                    OP,
                    self.request(Method::POST, url).json(&json!({
                        "name": label.name,
                        "color": label.color.trim_start_matches('#'),
                        "description": label.description,
                    })),
                )
                .await;
            match result {
                Ok(_) => outcome.created.push(label.name.clone()),
                Err(e) if e.is_already_exists() => outcome.existing.push(label.name.clone()),
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    async fn delete_label(&self, repo: &RepoHandle, name: &str) -> HostingResult<bool> {
        const OP: &str = "delete_label";
        let url = self.endpoint(OP, &["repos", &repo.owner, &repo.name, "labels", name])?;
        match self.send(OP, self.request(Method::DELETE, url)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_branch(
        &self,
        repo: &RepoHandle,
        name: &str,
        from_sha: &str,
    ) -> HostingResult<RefOutcome> {
        self.create_ref("create_branch", repo, &format!("refs/heads/{name}"), from_sha)
            .await
    }

    async fn create_tag(&self, repo: &RepoHandle, tag: &TagSpec) -> HostingResult<RefOutcome> {
        const OP: &str = "create_tag";
        let url = self.endpoint(OP, &["repos", &repo.owner, &repo.name, "git", "tags"])?;
        let response = self
            .send(
                OP,
                self.request(Method::POST, url).json(&json!({
                    "tag": tag.name,
                    "message": tag.message,
                    "object": tag.target,
                    "type": "commit",
                })),
            )
            .await?;
        let object: TagObjectPayload = Self::decode(OP, response).await?;
        self.create_ref(OP, repo, &format!("refs/tags/{}", tag.name), &object.sha)
            .await
    }

    async fn clone_project_board(
        &self,
        template: &BoardTemplate,
        title: &str,
    ) -> HostingResult<BoardHandle> {
        const OP: &str = "clone_project_board";
        let lookup = self
            .graphql(
                OP,
                "query($login: String!, $number: Int!) { \
                   organization(login: $login) { id projectV2(number: $number) { id } } }",
                json!({ "login": template.owner, "number": template.number }),
            )
            .await?;
        let owner_id = lookup
            .pointer("/organization/id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                HostingError::new(
                    OP,
                    HostingErrorKind::NotFound,
                    format!("organization {} not found", template.owner),
                )
            })?;
        let project_id = lookup
            .pointer("/organization/projectV2/id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                HostingError::new(
                    OP,
                    HostingErrorKind::NotFound,
                    format!(
                        "project template #{} not found in {}",
                        template.number, template.owner
                    ),
                )
            })?;

        let copied = self
            .graphql(
                OP,
                "mutation($ownerId: ID!, $projectId: ID!, $title: String!) { \
                   copyProjectV2(input: {ownerId: $ownerId, projectId: $projectId, title: $title, includeDraftIssues: false}) { \
                     projectV2 { id number url title } } }",
                json!({ "ownerId": owner_id, "projectId": project_id, "title": title }),
            )
            .await?;
        let project = copied
            .pointer("/copyProjectV2/projectV2")
            .ok_or_else(|| HostingError::decode(OP, "copyProjectV2 returned no project"))?;
        serde_json::from_value::<BoardHandle>(project.clone()).map_err(|e| HostingError::decode(OP, e))
    }

    async fn link_board(&self, repo: &RepoHandle, board: &BoardHandle) -> HostingResult<()> {
        const OP: &str = "link_board";
        self.graphql(
            OP,
            "mutation($projectId: ID!, $repositoryId: ID!) { \
               linkProjectV2ToRepository(input: {projectId: $projectId, repositoryId: $repositoryId}) { \
                 repository { id } } }",
            json!({ "projectId": board.id, "repositoryId": repo.node_id }),
        )
        .await?;
        Ok(())
    }
}
