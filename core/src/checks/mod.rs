//! Check run wire types and the service that stores them.
//!
//! The types serialize exactly like the GitHub Checks REST API payloads so
//! the same values can be sent over HTTP or dumped for local debugging.

use std::fmt;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;

mod github;
mod local;

pub use github::DEFAULT_API_URL;
pub use github::GithubChecksClient;
pub(crate) use github::API_VERSION;
pub(crate) use github::user_agent;
pub use local::LOCAL_CHECK_RUN_ID;
pub use local::LocalChecksService;

/// Identifier GitHub assigns to a check run when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckRunId(pub i64);

impl fmt::Display for CheckRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunConclusion {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationLevel {
    Notice,
    Warning,
    Failure,
}

/// One annotation as read from an annotation JSON file. Every field is
/// optional on input; GitHub validates the combination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRunAnnotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_level: Option<AnnotationLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRunImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRunOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<CheckRunAnnotation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<CheckRunImage>,
}

/// State and rendered output of a check run at one point in time. Shared by
/// the create and update payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRunReport {
    pub status: CheckRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<CheckRunConclusion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub output: CheckRunOutput,
}

/// Body of `POST /repos/{owner}/{repo}/check-runs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCheckRun {
    pub name: String,
    pub head_sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(flatten)]
    pub report: CheckRunReport,
}

/// Body of `PATCH /repos/{owner}/{repo}/check-runs/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheckRun {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(flatten)]
    pub report: CheckRunReport,
}

#[derive(Error, Debug)]
pub enum ChecksError {
    #[error("GitHub API returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("http error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("failed to encode check run: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Remote store of check runs. Calls are never retried; a failure is final.
#[async_trait]
pub trait ChecksService: Send + Sync {
    async fn create_check_run(
        &self,
        owner: &str,
        repo: &str,
        request: &CreateCheckRun,
    ) -> Result<CheckRunId, ChecksError>;

    async fn update_check_run(
        &self,
        owner: &str,
        repo: &str,
        id: CheckRunId,
        request: &UpdateCheckRun,
    ) -> Result<(), ChecksError>;
}
