// Google Docs tools

use crate::error::ToolError;
use crate::integrations::{GitHubClient, GoogleDocsClient};
use crate::protocol::{ToolResult, ToolSchema};
use crate::schema::PropertySchema;
use crate::tools::github::{issue_number_schema, repo_schema, require_github};
use crate::tools::Tool;
use mcpgate_core::credentials::env;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn require_google(client: &Option<Arc<GoogleDocsClient>>) -> Result<&GoogleDocsClient, ToolError> {
    client.as_deref().ok_or_else(|| {
        ToolError::Configuration(format!(
            "{}, {} and {}",
            env::GOOGLE_CLIENT_ID,
            env::GOOGLE_CLIENT_SECRET,
            env::GOOGLE_REFRESH_TOKEN
        ))
    })
}

/// Creates a Google Doc seeded with a link to a GitHub issue
pub struct CreateGoogleDocForIssueTool {
    github: Option<GitHubClient>,
    google: Option<Arc<GoogleDocsClient>>,
    folder: Option<String>,
}

impl CreateGoogleDocForIssueTool {
    pub fn new(
        github: Option<GitHubClient>,
        google: Option<Arc<GoogleDocsClient>>,
        folder: Option<String>,
    ) -> Self {
        Self {
            github,
            google,
            folder,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueArgs {
    owner: String,
    repo: String,
    issue_number: u64,
}

#[derive(Debug, Serialize)]
struct DocumentCreated {
    success: bool,
    document_id: String,
    document_url: String,
    title: String,
    issue_url: String,
}

#[async_trait::async_trait]
impl Tool for CreateGoogleDocForIssueTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "create_google_doc_for_issue".to_string(),
            description: "Create a Google Doc for a GitHub issue, linking back to the issue"
                .to_string(),
            input_schema: repo_schema().required("issueNumber", issue_number_schema()),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: IssueArgs = serde_json::from_value(arguments)?;
        let github = require_github(&self.github)?;
        let google = require_google(&self.google)?;

        let issue = github
            .get_issue(&args.owner, &args.repo, args.issue_number)
            .await?;

        let title = format!("{} - Issue #{}: {}", args.repo, args.issue_number, issue.title);
        let document_id = google
            .create_document(&title, self.folder.as_deref())
            .await?;
        google
            .insert_text(&document_id, 1, &format!("Issue Details: {}\n", issue.html_url))
            .await?;

        Ok(ToolResult::json(&DocumentCreated {
            success: true,
            document_url: GoogleDocsClient::document_url(&document_id),
            document_id,
            title,
            issue_url: issue.html_url,
        }))
    }
}

/// Appends text to the end of an existing Google Doc
pub struct EditGoogleDocTool {
    google: Option<Arc<GoogleDocsClient>>,
}

impl EditGoogleDocTool {
    pub fn new(google: Option<Arc<GoogleDocsClient>>) -> Self {
        Self { google }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditArgs {
    document_id: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct DocumentEdited {
    success: bool,
    document_id: String,
    document_url: String,
    content_added: String,
}

#[async_trait::async_trait]
impl Tool for EditGoogleDocTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "edit_google_doc".to_string(),
            description: "Append content to the end of a Google Doc".to_string(),
            input_schema: crate::schema::InputSchema::object()
                .required("documentId", PropertySchema::string("Google Doc ID"))
                .required("content", PropertySchema::string("Text to append")),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: EditArgs = serde_json::from_value(arguments)?;
        let google = require_google(&self.google)?;

        google.append_text(&args.document_id, &args.content).await?;

        Ok(ToolResult::json(&DocumentEdited {
            success: true,
            document_url: GoogleDocsClient::document_url(&args.document_id),
            document_id: args.document_id,
            content_added: args.content,
        }))
    }
}
