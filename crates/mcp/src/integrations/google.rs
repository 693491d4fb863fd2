//! Google Docs and Drive client authenticated with an OAuth2 refresh token.

use super::{endpoint_url, Endpoints};
use crate::error::ToolError;
use mcpgate_core::GoogleCredentials;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SERVICE: &str = "Google";
const DOCUMENT_MIME_TYPE: &str = "application/vnd.google-apps.document";

/// Access tokens are refreshed this long before they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct CreatedFile {
    id: Option<String>,
}

pub struct GoogleDocsClient {
    client: reqwest::Client,
    docs_api: String,
    drive_api: String,
    token_url: String,
    credentials: GoogleCredentials,
    token: Mutex<Option<AccessToken>>,
}

impl GoogleDocsClient {
    pub fn new(client: reqwest::Client, endpoints: &Endpoints, credentials: GoogleCredentials) -> Self {
        Self {
            client,
            docs_api: endpoints.google_docs_api.trim_end_matches('/').to_string(),
            drive_api: endpoints.google_drive_api.trim_end_matches('/').to_string(),
            token_url: endpoints.google_token_url.clone(),
            credentials,
            token: Mutex::new(None),
        }
    }

    /// Link a user opens the document with
    pub fn document_url(document_id: &str) -> String {
        format!("https://docs.google.com/document/d/{}/edit", document_id)
    }

    /// A valid access token, refreshed when missing or about to expire
    async fn access_token(&self) -> Result<String, ToolError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + EXPIRY_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.expose()),
                ("refresh_token", self.credentials.refresh_token.expose()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ToolError::upstream(SERVICE, response).await);
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!(expires_in = token.expires_in, "Refreshed Google access token");

        let value = token.access_token.clone();
        *cached = Some(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    async fn call(&self, method: reqwest::Method, url: url::Url, body: Option<Value>) -> Result<Value, ToolError> {
        let token = self.access_token().await?;
        let mut request = self.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ToolError::upstream(SERVICE, response).await);
        }
        Ok(response.json().await?)
    }

    /// Create an empty Google Doc through Drive, optionally inside a folder
    pub async fn create_document(&self, title: &str, folder: Option<&str>) -> Result<String, ToolError> {
        let mut metadata = json!({
            "name": title,
            "mimeType": DOCUMENT_MIME_TYPE,
        });
        if let Some(folder) = folder {
            metadata["parents"] = json!([folder]);
        }

        let mut url = endpoint_url(&self.drive_api, &["drive", "v3", "files"])?;
        url.query_pairs_mut()
            .append_pair("fields", "id")
            .append_pair("supportsAllDrives", "true");
        let created: CreatedFile =
            serde_json::from_value(self.call(reqwest::Method::POST, url, Some(metadata)).await?)?;

        let id = created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ToolError::Other("Error: Failed to create document".to_string()))?;

        tracing::info!(document_id = %id, "Created Google Doc");
        Ok(id)
    }

    /// Insert text at a character index
    pub async fn insert_text(&self, document_id: &str, index: u64, text: &str) -> Result<(), ToolError> {
        let segment = format!("{}:batchUpdate", document_id);
        let url = endpoint_url(&self.docs_api, &["v1", "documents", &segment])?;
        let body = json!({
            "requests": [{
                "insertText": {
                    "location": { "index": index },
                    "text": text,
                }
            }]
        });
        self.call(reqwest::Method::POST, url, Some(body)).await?;
        Ok(())
    }

    /// Index just before the trailing newline of the document body
    pub async fn end_index(&self, document_id: &str) -> Result<u64, ToolError> {
        let url = endpoint_url(&self.docs_api, &["v1", "documents", document_id])?;
        let document = self.call(reqwest::Method::GET, url, None).await?;

        let content = document
            .pointer("/body/content")
            .and_then(Value::as_array)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ToolError::Other("Error: Could not read document content".to_string()))?;

        let end = content
            .last()
            .and_then(|element| element.get("endIndex"))
            .and_then(Value::as_u64)
            .filter(|&end| end > 1)
            .map_or(1, |end| end - 1);
        Ok(end)
    }

    /// Append a new line of text at the end of the document
    pub async fn append_text(&self, document_id: &str, text: &str) -> Result<u64, ToolError> {
        let index = self.end_index(document_id).await?;
        self.insert_text(document_id, index, &format!("\n{}", text)).await?;
        tracing::info!(document_id, index, "Appended to Google Doc");
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpgate_core::Secret;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GoogleDocsClient {
        GoogleDocsClient::new(
            reqwest::Client::new(),
            &Endpoints::all_at(&server.uri()),
            GoogleCredentials {
                client_id: "client".to_string(),
                client_secret: Secret::new("secret"),
                refresh_token: Secret::new("refresh"),
            },
        )
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "ya29.test", "expires_in": 3599})),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/v1/documents/doc1"))
            .and(header("authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "body": {"content": [{"endIndex": 1}, {"startIndex": 1, "endIndex": 12}]}
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(client.end_index("doc1").await.unwrap(), 11);
        assert_eq!(client.end_index("doc1").await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_create_document_in_folder() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/drive/v3/files"))
            .and(body_partial_json(json!({
                "name": "Doc",
                "mimeType": DOCUMENT_MIME_TYPE,
                "parents": ["folder9"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "new-doc"})))
            .mount(&server)
            .await;

        let id = client(&server)
            .create_document("Doc", Some("folder9"))
            .await
            .unwrap();
        assert_eq!(id, "new-doc");
    }

    #[tokio::test]
    async fn test_refresh_failure_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let err = client(&server).end_index("doc1").await.unwrap_err();
        assert_eq!(err.to_string(), "Google API Error (400): invalid_grant");
    }

    #[tokio::test]
    async fn test_document_id_stays_one_segment() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/v1/documents/doc1%2F..%2Fother"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "body": {"content": [{"endIndex": 5}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(client(&server).end_index("doc1/../other").await.unwrap(), 4);
    }

    #[test]
    fn test_document_url() {
        assert_eq!(
            GoogleDocsClient::document_url("abc"),
            "https://docs.google.com/document/d/abc/edit"
        );
    }
}
