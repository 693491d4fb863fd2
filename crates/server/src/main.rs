use anyhow::{Context, Result};
use clap::Parser;
use mcpgate_core::{Credentials, LocalBus, SessionBus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod api;
mod config;
mod reaper;

use config::{AppState, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "mcpgate")]
#[command(about = "MCP tool gateway for GitHub, Oura and Google Docs", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mcpgate.toml")]
    config: PathBuf,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Redis URL for bridging sessions across instances
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Wall-clock budget per tool call, in seconds
    #[arg(long, env = "MCPGATE_TOOL_TIMEOUT_SECS")]
    tool_timeout_secs: Option<u64>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(url) = self.redis_url.filter(|u| !u.trim().is_empty()) {
            config.bridge.redis_url = Some(url);
        }
        if let Some(secs) = self.tool_timeout_secs {
            config.dispatch.tool_timeout_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcpgate=info,tower_http=info".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let args = Args::parse();

    tracing::info!("Starting mcpgate");

    // Load configuration
    let mut config = ServerConfig::load(&args.config)?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let bus = connect_bus(&config).await?;
    tracing::info!(backend = bus.backend(), "Session bridge ready");

    let credentials = Credentials::from_env();
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, bus, &credentials)?);

    let shutdown = CancellationToken::new();
    let reaper = tokio::spawn(reaper::run(
        state.store.clone(),
        state.config.session.clone(),
        shutdown.clone(),
    ));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C");
            }
            shutdown.cancel();
        });
    }

    // Start API server
    tracing::info!("Starting API server on {}", addr);
    let result = api::serve(&addr, state, shutdown.clone()).await;

    shutdown.cancel();
    let _ = reaper.await;
    result
}

/// Pick the bridge backend: Redis when a URL is configured, in-process otherwise
async fn connect_bus(config: &ServerConfig) -> Result<Arc<dyn SessionBus>> {
    match &config.bridge.redis_url {
        None => Ok(Arc::new(LocalBus::with_capacity(config.bridge.local_capacity))),
        Some(url) => connect_redis(url).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(url: &str) -> Result<Arc<dyn SessionBus>> {
    let bus = mcpgate_core::bus::RedisBus::connect(url)
        .await
        .context("Failed to connect to Redis")?;
    Ok(Arc::new(bus))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_url: &str) -> Result<Arc<dyn SessionBus>> {
    anyhow::bail!("A Redis URL is configured but mcpgate was built without the `redis` feature")
}
