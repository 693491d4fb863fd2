// Periodic sweep that closes sessions left idle too long

use crate::config::SessionConfig;
use mcpgate_core::SessionStore;
use tokio_util::sync::CancellationToken;

pub async fn run(store: SessionStore, config: SessionConfig, shutdown: CancellationToken) {
    let idle_timeout = config.idle_timeout();
    let mut interval = tokio::time::interval(config.reap_interval());
    // First tick fires immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let closed = store.close_idle(idle_timeout);
                if !closed.is_empty() {
                    tracing::info!(closed = closed.len(), "Reaped idle sessions");
                }
            }
        }
    }

    tracing::debug!("Idle session reaper stopped");
}
