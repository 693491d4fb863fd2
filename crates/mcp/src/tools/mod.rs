pub mod echo;
pub mod github;
pub mod google_docs;
pub mod oura;
mod registry;

pub use echo::EchoTool;
pub use github::{AddGitHubIssueCommentTool, ListGitHubIssuesTool};
pub use google_docs::{CreateGoogleDocForIssueTool, EditGoogleDocTool};
pub use oura::OuraStressRecoveryTool;
pub use registry::{Tool, ToolDefinition, ToolRegistry};

use crate::error::RegistryError;
use crate::integrations::Integrations;
use std::sync::Arc;

/// The fixed tool catalogue, in the order clients see it
pub fn builtin_registry(integrations: &Integrations) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(EchoTool))?;
    registry.register(Arc::new(ListGitHubIssuesTool::new(integrations.github.clone())))?;
    registry.register(Arc::new(OuraStressRecoveryTool::new(integrations.oura.clone())))?;
    registry.register(Arc::new(CreateGoogleDocForIssueTool::new(
        integrations.github.clone(),
        integrations.google.clone(),
        integrations.google_drive_folder.clone(),
    )))?;
    registry.register(Arc::new(EditGoogleDocTool::new(integrations.google.clone())))?;
    registry.register(Arc::new(AddGitHubIssueCommentTool::new(integrations.github.clone())))?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalogue() {
        let registry = builtin_registry(&Integrations::default()).unwrap();
        let names: Vec<_> = registry.list().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "echo",
                "list_github_issues",
                "get_oura_stress_recovery",
                "create_google_doc_for_issue",
                "edit_google_doc",
                "add_github_issue_comment",
            ]
        );
    }

    #[tokio::test]
    async fn test_unconfigured_tools_still_listed_and_report_setting() {
        let registry = builtin_registry(&Integrations::default()).unwrap();
        let tool = registry.lookup("list_github_issues").unwrap();
        let err = tool
            .handler
            .execute(serde_json::json!({"owner": "o", "repo": "r"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }
}
