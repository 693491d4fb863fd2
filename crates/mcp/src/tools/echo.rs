// Diagnostic tool that repeats its input

use crate::error::ToolError;
use crate::protocol::{ToolResult, ToolSchema};
use crate::schema::{InputSchema, PropertySchema};
use crate::tools::Tool;
use serde::Deserialize;

pub struct EchoTool;

#[derive(Debug, Deserialize)]
struct EchoArgs {
    message: String,
}

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "echo".to_string(),
            description: "Echo a message back to the caller".to_string(),
            input_schema: InputSchema::object()
                .required("message", PropertySchema::string("Message to echo")),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: EchoArgs = serde_json::from_value(arguments)?;
        Ok(ToolResult::text(format!("Tool echo: {}", args.message)))
    }
}
