//! REST adapters for the backends the tools bridge to.
//!
//! Each client owns its credential and a base URL, so tests can point
//! them at a local mock server.

pub mod github;
pub mod google;
pub mod oura;

pub use github::{GitHubClient, Issue, IssueComment};
pub use google::GoogleDocsClient;
pub use oura::{DailyStress, OuraClient};

use crate::error::ToolError;
use mcpgate_core::Credentials;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Base URLs of the upstream services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub github_api: String,
    pub oura_api: String,
    pub google_docs_api: String,
    pub google_drive_api: String,
    pub google_token_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            github_api: "https://api.github.com".to_string(),
            oura_api: "https://api.ouraring.com".to_string(),
            google_docs_api: "https://docs.googleapis.com".to_string(),
            google_drive_api: "https://www.googleapis.com".to_string(),
            google_token_url: "https://oauth2.googleapis.com/token".to_string(),
        }
    }
}

impl Endpoints {
    /// Every service served from one base URL, as a mock server does
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            github_api: base.to_string(),
            oura_api: base.to_string(),
            google_docs_api: base.to_string(),
            google_drive_api: base.to_string(),
            google_token_url: format!("{}/token", base),
        }
    }
}

/// `base` extended by `segments`, each encoded as exactly one path segment
pub(crate) fn endpoint_url(base: &str, segments: &[&str]) -> Result<url::Url, ToolError> {
    let mut url = url::Url::parse(base)
        .map_err(|e| ToolError::Other(format!("Invalid endpoint {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| ToolError::Other(format!("Invalid endpoint {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Shared HTTP client for all upstream calls
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("mcpgate/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()
}

/// The configured adapters; an absent credential leaves its client unset
#[derive(Clone, Default)]
pub struct Integrations {
    pub github: Option<GitHubClient>,
    pub oura: Option<OuraClient>,
    pub google: Option<Arc<GoogleDocsClient>>,
    pub google_drive_folder: Option<String>,
}

impl Integrations {
    pub fn new(credentials: &Credentials, endpoints: &Endpoints) -> Result<Self, reqwest::Error> {
        let client = http_client()?;

        Ok(Self {
            github: credentials.github.as_ref().map(|credential| {
                GitHubClient::new(client.clone(), &endpoints.github_api, credential.secret.clone())
            }),
            oura: credentials.oura.as_ref().map(|credential| {
                OuraClient::new(client.clone(), &endpoints.oura_api, credential.secret.clone())
            }),
            google: credentials
                .google
                .as_ref()
                .map(|google| Arc::new(GoogleDocsClient::new(client.clone(), endpoints, google.clone()))),
            google_drive_folder: credentials.google_drive_folder.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_only_configured_clients_built() {
        let env: HashMap<&str, &str> = [("GITHUB_TOKEN", "ghp_test")].into_iter().collect();
        let credentials = Credentials::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        let integrations = Integrations::new(&credentials, &Endpoints::default()).unwrap();
        assert!(integrations.github.is_some());
        assert!(integrations.oura.is_none());
        assert!(integrations.google.is_none());
    }

    #[test]
    fn test_all_at_strips_trailing_slash() {
        let endpoints = Endpoints::all_at("http://127.0.0.1:9000/");
        assert_eq!(endpoints.github_api, "http://127.0.0.1:9000");
        assert_eq!(endpoints.google_token_url, "http://127.0.0.1:9000/token");
    }

    #[test]
    fn test_endpoint_url_escapes_segments() {
        let url = endpoint_url("http://127.0.0.1:9000/api/", &["repos", "a/b", "c?d#e"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/api/repos/a%2Fb/c%3Fd%23e");

        let url = endpoint_url("http://127.0.0.1:9000", &["v1", "documents"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/v1/documents");

        assert!(endpoint_url("not a url", &["x"]).is_err());
    }
}
