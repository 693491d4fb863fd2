// MCP (Model Context Protocol) layer: protocol types, tool catalogue,
// dispatch and the upstream integrations the tools call

pub mod dispatch;
pub mod error;
pub mod integrations;
pub mod protocol;
pub mod schema;
pub mod server;
pub mod tools;

pub use dispatch::{Dispatcher, DEFAULT_TOOL_TIMEOUT};
pub use error::{RegistryError, ToolError};
pub use integrations::{Endpoints, Integrations};
pub use server::McpServer;
pub use tools::{builtin_registry, Tool, ToolRegistry};
