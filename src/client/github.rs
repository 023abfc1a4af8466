//! # GitHub REST Client
//!
//! Executor runs are workflow runs started by `repository_dispatch`, the host
//! run is the workflow run of the orchestrator itself, and the collaboration
//! surface is the comment thread of the migration issue.
//!
//! Two tokens are held: the dispatch token is scoped to the target instance
//! and only used to trigger batches; the host token covers run listing,
//! cancellation and comments.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::constants::correlation::DISPATCH_EVENT_FILTER;
use crate::error::{OrchestratorError, Result};
use crate::models::{Comment, RemoteRun};
use crate::orchestration::types::{
    CollaborationSurface, DispatchRequest, HostMonitor, HostRunState, JobExecutor, RunListQuery,
};

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "x-github-api-version";
const API_VERSION: &str = "2022-11-28";
const COMMENTS_PER_PAGE: u32 = 100;
const MAX_COMMENT_PAGES: usize = 50;

/// Coordinates of the repository, workflow and issue this client works against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubClientConfig {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub executor_workflow: String,
    pub issue_number: u64,
    pub host_run_id: u64,
    pub timeout_ms: u64,
}

impl From<&OrchestratorConfig> for GitHubClientConfig {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            api_url: config.github.api_url.clone(),
            owner: config.github.owner.clone(),
            repo: config.github.repo.clone(),
            executor_workflow: config.github.executor_workflow.clone(),
            issue_number: config.orchestration.issue_number,
            host_run_id: config.orchestration.run_id,
            timeout_ms: config.github.request_timeout_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowRunsPage {
    #[serde(default)]
    workflow_runs: Vec<RemoteRun>,
}

pub struct GitHubClient {
    http: Client,
    config: GitHubClientConfig,
    host_token: String,
    dispatch_token: String,
}

impl GitHubClient {
    pub fn new(
        config: GitHubClientConfig,
        host_token: impl Into<String>,
        dispatch_token: impl Into<String>,
    ) -> Result<Self> {
        Url::parse(&config.api_url).map_err(|e| {
            OrchestratorError::fatal_config(format!("Invalid API URL {}: {e}", config.api_url))
        })?;

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT));
        default_headers.insert(
            API_VERSION_HEADER,
            header::HeaderValue::from_static(API_VERSION),
        );

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(format!("batch-orchestrator/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(default_headers)
            .build()
            .map_err(|e| {
                OrchestratorError::fatal_config(format!("Failed to create HTTP client: {e}"))
            })?;

        info!(
            api_url = %config.api_url,
            repository = %format!("{}/{}", config.owner, config.repo),
            workflow = %config.executor_workflow,
            timeout_ms = config.timeout_ms,
            "Created GitHub client"
        );

        Ok(Self {
            http,
            config,
            host_token: host_token.into(),
            dispatch_token: dispatch_token.into(),
        })
    }

    pub fn config(&self) -> &GitHubClientConfig {
        &self.config
    }

    /// Absolute URL for a path under `/repos/{owner}/{repo}`
    fn repo_url(&self, path: &str) -> Result<Url> {
        let raw = format!(
            "{}/repos/{}/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            path.trim_start_matches('/')
        );
        Url::parse(&raw)
            .map_err(|e| OrchestratorError::fatal_config(format!("Failed to construct URL: {e}")))
    }

    fn runs_url(&self, query: &RunListQuery) -> Result<Url> {
        let mut url = self.repo_url(&format!(
            "actions/workflows/{}/runs",
            self.config.executor_workflow
        ))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("event", DISPATCH_EVENT_FILTER);
            pairs.append_pair("per_page", &query.per_page.to_string());
            if let Some(status) = query.status {
                pairs.append_pair("status", &status.to_string());
            }
        }
        Ok(url)
    }

    fn comments_url(&self, since: Option<DateTime<Utc>>) -> Result<Url> {
        let mut url = self.repo_url(&format!("issues/{}/comments", self.config.issue_number))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("per_page", &COMMENTS_PER_PAGE.to_string());
            if let Some(since) = since {
                pairs.append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, token: &str) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder, operation: &str) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(operation = operation, status = %status, "GitHub request succeeded");
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        error!(status = %status, error = %error_text, "Failed operation: {}", operation);
        Err(OrchestratorError::api_error(status.as_u16(), error_text))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<T> {
        let body = self.send(request, operation).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("config", &self.config)
            .field("host_token", &"***")
            .field("dispatch_token", &"***")
            .finish()
    }
}

#[async_trait]
impl JobExecutor for GitHubClient {
    fn executor_name(&self) -> &'static str {
        "github-actions"
    }

    /// POST /repos/{owner}/{repo}/dispatches
    async fn dispatch(&self, request: &DispatchRequest) -> Result<()> {
        let url = self.repo_url("dispatches")?;
        debug!(url = %url, event_type = %request.event_type, "Sending repository dispatch");

        self.send(
            self.request(Method::POST, url, &self.dispatch_token).json(request),
            "repository dispatch",
        )
        .await
        .map(|_| ())
    }

    /// GET /repos/{owner}/{repo}/actions/workflows/{workflow}/runs
    async fn list_runs(&self, query: &RunListQuery) -> Result<Vec<RemoteRun>> {
        let url = self.runs_url(query)?;
        let page: WorkflowRunsPage = self
            .send_json(
                self.request(Method::GET, url, &self.host_token),
                "list workflow runs",
            )
            .await?;
        Ok(page.workflow_runs)
    }

    /// POST /repos/{owner}/{repo}/actions/runs/{run_id}/cancel
    async fn cancel_run(&self, run_id: u64) -> Result<()> {
        let url = self.repo_url(&format!("actions/runs/{run_id}/cancel"))?;
        self.send(
            self.request(Method::POST, url, &self.host_token),
            "cancel workflow run",
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl HostMonitor for GitHubClient {
    /// GET /repos/{owner}/{repo}/actions/runs/{host_run_id}
    async fn own_run_state(&self) -> Result<HostRunState> {
        let url = self.repo_url(&format!("actions/runs/{}", self.config.host_run_id))?;
        self.send_json(
            self.request(Method::GET, url, &self.host_token),
            "get orchestrator run",
        )
        .await
    }
}

#[async_trait]
impl CollaborationSurface for GitHubClient {
    /// POST /repos/{owner}/{repo}/issues/{issue}/comments
    async fn post_comment(&self, body: &str) -> Result<()> {
        let url = self.comments_url(None)?;
        self.send(
            self.request(Method::POST, url, &self.host_token)
                .json(&serde_json::json!({ "body": body })),
            "post issue comment",
        )
        .await
        .map(|_| ())
    }

    /// GET /repos/{owner}/{repo}/issues/{issue}/comments?since=, following `Link` pages
    async fn list_comments_since(&self, since: DateTime<Utc>) -> Result<Vec<Comment>> {
        let first = self.comments_url(Some(since))?;
        let mut next = Some(first.clone());
        let mut comments: Vec<Comment> = Vec::new();
        let mut pages = 0;

        while let Some(url) = next.take() {
            if pages == MAX_COMMENT_PAGES {
                warn!(
                    pages = pages,
                    comments = comments.len(),
                    "Stopped following comment pages"
                );
                break;
            }
            pages += 1;

            let response = self
                .send(
                    self.request(Method::GET, url, &self.host_token),
                    "list issue comments",
                )
                .await?;
            next = next_page_url(response.headers())
                .filter(|link| link.origin() == first.origin());
            let page: Vec<Comment> = serde_json::from_str(&response.text().await?)?;
            comments.extend(page);
        }

        debug!(pages = pages, comments = comments.len(), "Listed issue comments");

        // `since` filters on update time upstream
        Ok(comments
            .into_iter()
            .filter(|comment| comment.created_at >= since)
            .collect())
    }
}

/// Target of the `rel="next"` entry in a `Link` response header
fn next_page_url(headers: &header::HeaderMap) -> Option<Url> {
    headers
        .get_all(header::LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|link| {
            let mut parts = link.split(';');
            let target = parts
                .next()?
                .trim()
                .strip_prefix('<')?
                .strip_suffix('>')?;
            let is_next = parts.any(|param| {
                matches!(param.trim(), "rel=\"next\"" | "rel=next")
            });
            if is_next {
                Url::parse(target).ok()
            } else {
                None
            }
        })
}
