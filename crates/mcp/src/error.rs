use crate::schema::SchemaError;

/// Failure raised by a tool handler; rendered into an error result, never
/// propagated past the dispatcher
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Error: {0} not configured in environment variables")]
    Configuration(String),

    #[error("{service} API Error ({status}): {body}")]
    Upstream {
        service: String,
        status: u16,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ToolError {
    /// Read a non-2xx response into an upstream error
    pub async fn upstream(service: impl Into<String>, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::Upstream {
            service: service.into(),
            status,
            body,
        }
    }
}

/// Registration failure; the process refuses to start
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool name must not be empty")]
    EmptyName,

    #[error("Tool already registered: {0}")]
    DuplicateName(String),

    #[error("Tool {name} has an invalid input schema: {source}")]
    InvalidSchema {
        name: String,
        #[source]
        source: SchemaError,
    },
}
