// GitHub issue tools

use crate::error::ToolError;
use crate::integrations::GitHubClient;
use crate::protocol::{ToolResult, ToolSchema};
use crate::schema::{InputSchema, PropertySchema};
use crate::tools::Tool;
use mcpgate_core::credentials::env;
use serde::{Deserialize, Serialize};

pub(crate) fn require_github(client: &Option<GitHubClient>) -> Result<&GitHubClient, ToolError> {
    client
        .as_ref()
        .ok_or_else(|| ToolError::Configuration(env::GITHUB_TOKEN.to_string()))
}

pub(crate) fn repo_schema() -> InputSchema {
    InputSchema::object()
        .required("owner", PropertySchema::string("Repository owner (user or organization)"))
        .required("repo", PropertySchema::string("Repository name"))
}

pub(crate) fn issue_number_schema() -> PropertySchema {
    PropertySchema::integer("Issue number").with_minimum(1.0)
}

/// Lists the open issues of a repository
pub struct ListGitHubIssuesTool {
    client: Option<GitHubClient>,
}

impl ListGitHubIssuesTool {
    pub fn new(client: Option<GitHubClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct RepoArgs {
    owner: String,
    repo: String,
}

#[derive(Debug, Serialize)]
struct IssueSummary {
    number: u64,
    title: String,
    state: String,
    labels: Vec<String>,
    assignees: Vec<String>,
    url: String,
}

#[derive(Debug, Serialize)]
struct IssueList {
    repository: String,
    total_issues: usize,
    issues: Vec<IssueSummary>,
}

#[async_trait::async_trait]
impl Tool for ListGitHubIssuesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list_github_issues".to_string(),
            description: "List open issues in a GitHub repository (pull requests excluded)"
                .to_string(),
            input_schema: repo_schema(),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: RepoArgs = serde_json::from_value(arguments)?;
        let client = require_github(&self.client)?;

        let issues = client.list_open_issues(&args.owner, &args.repo).await?;
        if issues.is_empty() {
            return Ok(ToolResult::text(format!(
                "No open issues found in {}/{}",
                args.owner, args.repo
            )));
        }

        let issues: Vec<IssueSummary> = issues
            .into_iter()
            .map(|issue| IssueSummary {
                number: issue.number,
                title: issue.title,
                state: issue.state,
                labels: issue.labels.into_iter().map(|l| l.name).collect(),
                assignees: issue.assignees.into_iter().map(|u| u.login).collect(),
                url: issue.html_url,
            })
            .collect();

        Ok(ToolResult::json(&IssueList {
            repository: format!("{}/{}", args.owner, args.repo),
            total_issues: issues.len(),
            issues,
        }))
    }
}

/// Posts a comment on an issue
pub struct AddGitHubIssueCommentTool {
    client: Option<GitHubClient>,
}

impl AddGitHubIssueCommentTool {
    pub fn new(client: Option<GitHubClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentArgs {
    owner: String,
    repo: String,
    issue_number: u64,
    comment: String,
}

#[derive(Debug, Serialize)]
struct CommentAdded {
    success: bool,
    comment_id: u64,
    comment_url: String,
    issue_url: String,
    created_at: String,
}

#[async_trait::async_trait]
impl Tool for AddGitHubIssueCommentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "add_github_issue_comment".to_string(),
            description: "Add a comment to a GitHub issue".to_string(),
            input_schema: repo_schema()
                .required("issueNumber", issue_number_schema())
                .required("comment", PropertySchema::string("Comment text (Markdown)")),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: CommentArgs = serde_json::from_value(arguments)?;
        let client = require_github(&self.client)?;

        let comment = client
            .add_comment(&args.owner, &args.repo, args.issue_number, &args.comment)
            .await?;

        Ok(ToolResult::json(&CommentAdded {
            success: true,
            comment_id: comment.id,
            comment_url: comment.html_url,
            issue_url: format!(
                "https://github.com/{}/{}/issues/{}",
                args.owner, args.repo, args.issue_number
            ),
            created_at: comment.created_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpgate_core::Secret;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> Option<GitHubClient> {
        Some(GitHubClient::new(
            reqwest::Client::new(),
            &server.uri(),
            Secret::new("ghp_test"),
        ))
    }

    fn issue(number: u64, pull_request: bool) -> Value {
        let mut issue = json!({
            "number": number,
            "title": format!("Issue {}", number),
            "state": "open",
            "labels": [{"name": "bug", "color": "f00"}],
            "assignees": [{"login": "octocat"}],
            "html_url": format!("https://github.com/octo/hello/issues/{}", number),
        });
        if pull_request {
            issue["pull_request"] = json!({"url": "https://api.github.com/repos/octo/hello/pulls/1"});
        }
        issue
    }

    #[tokio::test]
    async fn test_list_excludes_pull_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/hello/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                issue(1, false),
                issue(2, true),
                issue(3, false),
                issue(4, true),
                issue(5, false),
            ])))
            .mount(&server)
            .await;

        let tool = ListGitHubIssuesTool::new(client(&server));
        let result = tool
            .execute(json!({"owner": "octo", "repo": "hello"}))
            .await
            .unwrap();

        assert!(!result.is_error);
        let body: Value = serde_json::from_str(&result.text_content()).unwrap();
        assert_eq!(body["repository"], "octo/hello");
        assert_eq!(body["total_issues"], 3);
        assert_eq!(body["issues"].as_array().unwrap().len(), 3);
        assert_eq!(body["issues"][0]["labels"], json!(["bug"]));
        assert_eq!(body["issues"][0]["assignees"], json!(["octocat"]));
        assert_eq!(body["issues"][2]["url"], "https://github.com/octo/hello/issues/5");
    }

    #[tokio::test]
    async fn test_list_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/empty/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([issue(7, true)])))
            .mount(&server)
            .await;

        let tool = ListGitHubIssuesTool::new(client(&server));
        let result = tool
            .execute(json!({"owner": "octo", "repo": "empty"}))
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.text_content(), "No open issues found in octo/empty");
    }

    #[tokio::test]
    async fn test_upstream_failure_reports_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/private/issues"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Resource not accessible"))
            .mount(&server)
            .await;

        let tool = ListGitHubIssuesTool::new(client(&server));
        let err = tool
            .execute(json!({"owner": "octo", "repo": "private"}))
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("403"));
        assert!(message.contains("Resource not accessible"));
    }

    #[tokio::test]
    async fn test_missing_token_is_configuration_error() {
        let tool = ListGitHubIssuesTool::new(None);
        let err = tool
            .execute(json!({"owner": "octo", "repo": "hello"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Configuration(ref name) if name == "GITHUB_TOKEN"));
    }

    #[tokio::test]
    async fn test_add_comment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/hello/issues/12/comments"))
            .and(body_json(json!({"body": "Looks good"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 987654,
                "html_url": "https://github.com/octo/hello/issues/12#issuecomment-987654",
                "created_at": "2024-05-01T10:00:00Z",
                "body": "Looks good"
            })))
            .mount(&server)
            .await;

        let tool = AddGitHubIssueCommentTool::new(client(&server));
        let result = tool
            .execute(json!({"owner": "octo", "repo": "hello", "issueNumber": 12, "comment": "Looks good"}))
            .await
            .unwrap();

        let body: Value = serde_json::from_str(&result.text_content()).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["comment_id"], 987654);
        let issue_url = body["issue_url"].as_str().unwrap();
        assert_eq!(issue_url, "https://github.com/octo/hello/issues/12");
        assert!(body["comment_url"].as_str().unwrap().starts_with(issue_url));
    }
}
