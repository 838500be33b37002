//! MCP server core: dispatch and stdio transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use forcelink_mcp_types::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    RequestId, ServerCapabilities, Tool, methods,
};

use crate::handlers::ToolHandler;

/// MCP server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No initialize request seen yet.
    Uninitialized,
    /// Initialize handled, waiting for the initialized notification.
    Initializing,
    /// Ready to handle requests.
    Ready,
    /// Transport closed.
    Stopped,
}

/// Tools-only MCP server over line-delimited JSON-RPC.
pub struct McpServer {
    info: Implementation,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
    tools: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
    state: RwLock<ServerState>,
    running: AtomicBool,
    client_info: RwLock<Option<Implementation>>,
}

impl McpServer {
    pub fn new(info: Implementation, capabilities: ServerCapabilities) -> Self {
        Self {
            info,
            capabilities,
            instructions: None,
            tools: RwLock::new(HashMap::new()),
            state: RwLock::new(ServerState::Uninitialized),
            running: AtomicBool::new(false),
            client_info: RwLock::new(None),
        }
    }

    /// Set the instructions returned from initialize.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn info(&self) -> &Implementation {
        &self.info
    }

    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a tool handler.
    pub async fn register_tool(&self, handler: Arc<dyn ToolHandler>) {
        let tool = handler.tool();
        let name = tool.name.clone();
        self.tools.write().await.insert(name.clone(), handler);
        debug!(tool = %name, "Registered tool");
    }

    /// Register multiple tool handlers.
    pub async fn register_tools(&self, handlers: Vec<Arc<dyn ToolHandler>>) {
        for handler in handlers {
            self.register_tool(handler).await;
        }
    }

    /// All registered tool definitions.
    pub async fn tools(&self) -> Vec<Tool> {
        self.tools.read().await.values().map(|h| h.tool()).collect()
    }

    /// Handle a JSON-RPC request.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!(method = %request.method, id = %request.id, "Handling request");

        let result = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request.params).await,
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => self.handle_list_tools().await,
            methods::TOOLS_CALL => self.handle_call_tool(request.params).await,
            _ => Err(JsonRpcError::method_not_found(&request.method)),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::error(request.id, error),
        }
    }

    /// Handle a JSON-RPC notification.
    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        debug!(method = %notification.method, "Handling notification");

        match notification.method.as_str() {
            methods::INITIALIZED => {
                *self.state.write().await = ServerState::Ready;
                info!("Server initialized and ready");
            }
            methods::CANCELLED => {
                debug!("Cancellation received; tool calls run to completion");
            }
            _ => {
                warn!(method = %notification.method, "Unknown notification");
            }
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        // Check-and-transition under one write lock so concurrent initialize
        // requests cannot both pass the uninitialized check.
        {
            let mut state = self.state.write().await;
            if *state != ServerState::Uninitialized {
                return Err(JsonRpcError::invalid_request("Server already initialized"));
            }
            *state = ServerState::Initializing;
        }

        if let Some(params) = params {
            let init: InitializeParams = serde_json::from_value(params)
                .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {e}")))?;
            info!(
                client = %init.client_info.name,
                version = %init.client_info.version,
                protocol = %init.protocol_version,
                "Client connected"
            );
            *self.client_info.write().await = Some(init.client_info);
        }

        let result = InitializeResult {
            protocol_version: forcelink_mcp_types::PROTOCOL_VERSION.to_string(),
            capabilities: self.capabilities.clone(),
            server_info: self.info.clone(),
            instructions: self.instructions.clone(),
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        let result = ListToolsResult::new(self.tools().await);
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let call: CallToolParams = serde_json::from_value(
            params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?,
        )
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {e}")))?;

        debug!(tool = %call.name, "Calling tool");

        let handler = self
            .tools
            .read()
            .await
            .get(&call.name)
            .cloned()
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", call.name)))?;

        let arguments = call.arguments.unwrap_or(json!({}));
        let result = match handler.execute(arguments).await {
            Ok(call_result) => call_result,
            // Handler failures become tool-level errors, not protocol errors.
            Err(e) => CallToolResult::error(e.to_string()),
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    /// Run the server on stdin/stdout, one JSON-RPC message per line.
    pub async fn run_stdio(self: Arc<Self>) -> Result<()> {
        info!(server = %self.info.name, "Starting MCP server with stdio transport");
        self.running.store(true, Ordering::SeqCst);

        let mut reader = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut line = String::new();

        while self.running.load(Ordering::SeqCst) {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("EOF received, shutting down");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Ok(request) = serde_json::from_str::<JsonRpcRequest>(trimmed) {
                        let response = self.handle_request(request).await;
                        let response_json = serde_json::to_string(&response)
                            .context("Failed to serialize response")?;
                        stdout
                            .write_all(response_json.as_bytes())
                            .await
                            .context("Failed to write response")?;
                        stdout.write_all(b"\n").await?;
                        stdout.flush().await?;
                    } else if let Ok(notification) =
                        serde_json::from_str::<JsonRpcNotification>(trimmed)
                    {
                        self.handle_notification(notification).await;
                    } else {
                        warn!(line = %trimmed, "Invalid JSON-RPC message");
                        let error_response = JsonRpcResponse::error(
                            RequestId::Number(0),
                            JsonRpcError::parse_error("Invalid JSON"),
                        );
                        let error_json = serde_json::to_string(&error_response)?;
                        stdout.write_all(error_json.as_bytes()).await?;
                        stdout.write_all(b"\n").await?;
                        stdout.flush().await?;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Error reading from stdin");
                    break;
                }
            }
        }

        *self.state.write().await = ServerState::Stopped;
        self.running.store(false, Ordering::SeqCst);
        info!("MCP server stopped");
        Ok(())
    }

    /// Stop the server after the current message.
    pub async fn stop(&self) {
        info!("Stopping MCP server");
        self.running.store(false, Ordering::SeqCst);
    }
}
