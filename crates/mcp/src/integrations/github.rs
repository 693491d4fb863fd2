//! GitHub Issues API client.

use super::endpoint_url;
use crate::error::ToolError;
use mcpgate_core::Secret;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "GitHub";

/// GitHub Issues API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: Secret,
}

/// A GitHub issue (or pull request, which the issues endpoint also returns).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub assignees: Vec<User>,
    pub html_url: String,
    /// Present only when the item is a pull request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub login: String,
}

/// A comment on an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub html_url: String,
    pub created_at: String,
}

impl GitHubClient {
    pub fn new(client: reqwest::Client, base_url: &str, token: Secret) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn api_url(&self, owner: &str, repo: &str, path: &[&str]) -> Result<url::Url, ToolError> {
        let mut segments = vec!["repos", owner, repo];
        segments.extend_from_slice(path);
        endpoint_url(&self.base_url, &segments)
    }

    /// Make an authenticated request.
    fn request(&self, method: reqwest::Method, url: url::Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(self.token.expose())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ToolError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ToolError::upstream(SERVICE, response).await);
        }
        Ok(response.json().await?)
    }

    /// Open issues of a repository, pull requests excluded
    pub async fn list_open_issues(&self, owner: &str, repo: &str) -> Result<Vec<Issue>, ToolError> {
        let url = self.api_url(owner, repo, &["issues"])?;
        let request = self
            .request(reqwest::Method::GET, url)
            .query(&[("state", "open"), ("per_page", "100")]);

        let items: Vec<Issue> = self.send(request).await?;
        let total = items.len();
        let issues: Vec<Issue> = items.into_iter().filter(|i| !i.is_pull_request()).collect();

        tracing::debug!(owner, repo, total, issues = issues.len(), "Listed GitHub issues");
        Ok(issues)
    }

    /// Get a specific issue by number.
    pub async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, ToolError> {
        let url = self.api_url(owner, repo, &["issues", &number.to_string()])?;
        self.send(self.request(reqwest::Method::GET, url)).await
    }

    /// Add a comment to an issue.
    pub async fn add_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<IssueComment, ToolError> {
        let url = self.api_url(owner, repo, &["issues", &number.to_string(), "comments"])?;
        let request = self
            .request(reqwest::Method::POST, url)
            .json(&serde_json::json!({ "body": body }));

        let comment: IssueComment = self.send(request).await?;
        tracing::info!(owner, repo, number, comment_id = comment.id, "Added GitHub comment");
        Ok(comment)
    }
}
