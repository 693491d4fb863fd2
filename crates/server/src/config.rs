use anyhow::{bail, Context, Result};
use mcpgate_core::{Credentials, SessionBus, SessionStore};
use mcpgate_mcp::{builtin_registry, Dispatcher, Endpoints, Integrations, McpServer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Path the MCP routes are mounted on
    pub base_path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            base_path: "/mcp".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub heartbeat_interval_secs: u64,
    pub idle_timeout_secs: u64,
    pub reap_interval_secs: u64,
    /// Frames buffered per outbound stream before writers wait
    pub outbound_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 15,
            idle_timeout_secs: 30 * 60,
            reap_interval_secs: 60,
            outbound_buffer: 64,
        }
    }
}

impl SessionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub tool_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: mcpgate_mcp::DEFAULT_TOOL_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Shared pub/sub store; in-process bridging when unset
    pub redis_url: Option<String>,
    /// Per-channel buffer of the in-process bus
    pub local_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            local_capacity: 256,
        }
    }
}

impl ServerConfig {
    /// Load the TOML file at `config_path`, or defaults when it does not exist
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::info!("Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read configuration file")?;
        toml::from_str(&content).context("Failed to parse configuration file")
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        let base = &self.server.base_path;
        if !base.starts_with('/') || base.len() < 2 || base.ends_with('/') {
            bail!("server.base_path must start with '/' and not end with one, got {:?}", base);
        }
        if self.session.heartbeat_interval_secs == 0 {
            bail!("session.heartbeat_interval_secs must be positive");
        }
        if self.session.reap_interval_secs == 0 {
            bail!("session.reap_interval_secs must be positive");
        }
        if self.session.outbound_buffer == 0 {
            bail!("session.outbound_buffer must be positive");
        }
        if self.dispatch.tool_timeout_secs == 0 {
            bail!("dispatch.tool_timeout_secs must be positive");
        }

        for (name, value) in [
            ("github_api", &self.endpoints.github_api),
            ("oura_api", &self.endpoints.oura_api),
            ("google_docs_api", &self.endpoints.google_docs_api),
            ("google_drive_api", &self.endpoints.google_drive_api),
            ("google_token_url", &self.endpoints.google_token_url),
        ] {
            url::Url::parse(value).with_context(|| format!("endpoints.{} is not a valid URL", name))?;
        }

        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.tool_timeout_secs)
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub store: SessionStore,
    pub mcp: McpServer,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig, bus: Arc<dyn SessionBus>, credentials: &Credentials) -> Result<Self> {
        let integrations = Integrations::new(credentials, &config.endpoints)
            .context("Failed to create HTTP client")?;
        let registry = builtin_registry(&integrations).context("Failed to build tool registry")?;

        tracing::info!(
            tools = registry.len(),
            providers = ?credentials.configured_providers(),
            "Tool registry ready"
        );

        let dispatcher = Dispatcher::new(Arc::new(registry)).with_timeout(config.tool_timeout());

        Ok(Self {
            store: SessionStore::new(bus),
            mcp: McpServer::new(dispatcher),
            config,
        })
    }
}
