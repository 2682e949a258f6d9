use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Response;
use serde::Deserialize;
use tracing::debug;

use super::CheckRunId;
use super::ChecksError;
use super::ChecksService;
use super::CreateCheckRun;
use super::UpdateCheckRun;
use crate::auth::TokenSource;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub(crate) const API_VERSION: &str = "2022-11-28";

pub(crate) fn user_agent() -> String {
    format!("checks4shell/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize)]
struct CheckRunCreated {
    id: i64,
}

/// [`ChecksService`] backed by the GitHub REST API.
pub struct GithubChecksClient {
    api_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl GithubChecksClient {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            client: reqwest::Client::new(),
            tokens,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn check_runs_url(&self, owner: &str, repo: &str) -> String {
        format!(
            "{}/repos/{owner}/{repo}/check-runs",
            self.api_url.trim_end_matches('/')
        )
    }

    async fn authorized(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, ChecksError> {
        let token = self.tokens.token().await?;
        Ok(request
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", user_agent())
            .header("X-GitHub-Api-Version", API_VERSION)
            .bearer_auth(token))
    }
}

impl std::fmt::Debug for GithubChecksClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubChecksClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

async fn error_for_status(response: Response) -> Result<Response, ChecksError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read response body".to_string());
    Err(ChecksError::Http {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ChecksService for GithubChecksClient {
    async fn create_check_run(
        &self,
        owner: &str,
        repo: &str,
        request: &CreateCheckRun,
    ) -> Result<CheckRunId, ChecksError> {
        let builder = self
            .authorized(self.client.post(self.check_runs_url(owner, repo)))
            .await?;
        let response = error_for_status(builder.json(request).send().await?).await?;
        let created: CheckRunCreated = response.json().await?;
        debug!(check_run_id = created.id, owner, repo, "created check run");
        Ok(CheckRunId(created.id))
    }

    async fn update_check_run(
        &self,
        owner: &str,
        repo: &str,
        id: CheckRunId,
        request: &UpdateCheckRun,
    ) -> Result<(), ChecksError> {
        let url = format!("{}/{id}", self.check_runs_url(owner, repo));
        let builder = self.authorized(self.client.patch(url)).await?;
        error_for_status(builder.json(request).send().await?).await?;
        debug!(check_run_id = id.0, status = ?request.report.status, "updated check run");
        Ok(())
    }
}
