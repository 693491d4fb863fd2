// Capability registry: the fixed catalogue of tools served to clients

use crate::error::{RegistryError, ToolError};
use crate::protocol::{ToolResult, ToolSchema};
use std::collections::HashMap;
use std::sync::Arc;

/// Tool executor trait
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool schema for MCP
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with arguments that already passed schema validation
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;
}

/// A registered tool with its schema captured at registration
#[derive(Clone)]
pub struct ToolDefinition {
    pub schema: ToolSchema,
    pub handler: Arc<dyn Tool>,
}

impl ToolDefinition {
    pub fn name(&self) -> &str {
        &self.schema.name
    }
}

/// Tool registry for managing available tools.
///
/// Populated once at startup and shared read-only afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, rejecting duplicate names and malformed schemas
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let schema = tool.schema();

        if schema.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.index.contains_key(&schema.name) {
            return Err(RegistryError::DuplicateName(schema.name));
        }
        schema
            .input_schema
            .check()
            .map_err(|source| RegistryError::InvalidSchema {
                name: schema.name.clone(),
                source,
            })?;

        tracing::debug!(tool = %schema.name, "Registered tool");
        self.index.insert(schema.name.clone(), self.tools.len());
        self.tools.push(ToolDefinition {
            schema,
            handler: tool,
        });
        Ok(())
    }

    /// Get a tool by name
    pub fn lookup(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// All tool schemas, in registration order
    pub fn list(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
