// Dispatch engine: validate, invoke under a deadline, normalize the outcome

use crate::protocol::{ToolCallRequest, ToolResult};
use crate::tools::ToolRegistry;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Aborts the handler task when the dispatch future is dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs tool calls against the registry.
///
/// Every outcome, including unknown tools, invalid arguments, handler
/// errors, panics and timeouts, comes back as a [`ToolResult`].
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute a tool call
    pub async fn dispatch(&self, request: ToolCallRequest) -> ToolResult {
        let ToolCallRequest {
            request_id,
            tool_name,
            arguments,
        } = request;

        let Some(tool) = self.registry.lookup(&tool_name) else {
            tracing::warn!(request_id = %request_id, tool = %tool_name, "Unknown tool");
            return ToolResult::error(format!("unknown tool: {}", tool_name));
        };

        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        if let Some(violation) = tool.schema.input_schema.validate(&arguments).into_iter().next() {
            tracing::debug!(request_id = %request_id, tool = %tool_name, %violation, "Rejected arguments");
            return ToolResult::error(format!("invalid arguments for {}: {}", tool_name, violation));
        }

        tracing::info!(request_id = %request_id, tool = %tool_name, "Invoking tool");
        let started = std::time::Instant::now();

        let handler = tool.handler.clone();
        let mut task = AbortOnDrop(tokio::spawn(async move { handler.execute(arguments).await }));

        let result = match tokio::time::timeout(self.timeout, &mut task.0).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                tracing::warn!(request_id = %request_id, tool = %tool_name, error = %e, "Tool failed");
                ToolResult::error(e.to_string())
            }
            Ok(Err(join_error)) => {
                tracing::error!(request_id = %request_id, tool = %tool_name, error = %join_error, "Tool panicked");
                ToolResult::error("error invoking tool")
            }
            Err(_) => {
                task.0.abort();
                tracing::warn!(
                    request_id = %request_id,
                    tool = %tool_name,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Tool timed out"
                );
                ToolResult::error(format!(
                    "timeout: {} did not complete within {:?}",
                    tool_name, self.timeout
                ))
            }
        };

        tracing::debug!(
            request_id = %request_id,
            tool = %tool_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            is_error = result.is_error,
            "Tool finished"
        );
        result
    }
}
