// MCP method router: maps JSON-RPC requests onto the dispatcher

use crate::dispatch::Dispatcher;
use crate::protocol::{
    negotiate_version, request_key, CallToolParams, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerCapabilities,
    ServerInfo, ToolCallRequest, ToolsCapability,
};
use serde_json::{json, Value};

const INSTRUCTIONS: &str = "Tools for GitHub issues, Oura stress and recovery data, and Google Docs. \
Call tools/list to discover the available tools and their arguments.";

/// Answers MCP requests. Notifications are handled by the transport,
/// which owns the session state they refer to.
#[derive(Clone)]
pub struct McpServer {
    dispatcher: Dispatcher,
    info: ServerInfo,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            info: ServerInfo {
                name: "mcpgate".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle a request that expects a response
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);

        match request.method.as_str() {
            "initialize" => self.initialize(id, request.params),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::from_result(
                id,
                &ListToolsResult {
                    tools: self.dispatcher.registry().list(),
                },
            ),
            "tools/call" => self.call_tool(id, request.params).await,
            method => {
                tracing::debug!(method, "Method not found");
                JsonRpcResponse::error(id, JsonRpcError::method_not_found(method))
            }
        }
    }

    fn initialize(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params: InitializeParams = match params {
            Some(params) => match serde_json::from_value(params) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(id, JsonRpcError::invalid_params(e.to_string()))
                }
            },
            None => InitializeParams::default(),
        };

        if let Some(client) = &params.client_info {
            tracing::info!(client = %client.name, version = %client.version, "Client initializing");
        }

        JsonRpcResponse::from_result(
            id,
            &InitializeResult {
                protocol_version: negotiate_version(params.protocol_version.as_deref()).to_string(),
                capabilities: ServerCapabilities {
                    tools: Some(ToolsCapability {
                        list_changed: false,
                    }),
                },
                server_info: self.info.clone(),
                instructions: Some(INSTRUCTIONS.to_string()),
            },
        )
    }

    async fn call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params(e.to_string()))
            }
            None => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params("tools/call requires params"),
                )
            }
        };

        let result = self
            .dispatcher
            .dispatch(ToolCallRequest {
                request_id: request_key(&id),
                tool_name: params.name,
                arguments: params.arguments.unwrap_or(Value::Null),
            })
            .await;

        JsonRpcResponse::from_result(id, &result)
    }
}
