//! Forcelink MCP Types - Model Context Protocol type definitions.
//!
//! Type definitions for the subset of the Model Context Protocol this
//! server speaks: JSON-RPC 2.0 framing, the initialize handshake, and
//! tool listing and invocation.

mod initialization;
mod jsonrpc;
mod tools;

/// MCP method name constants.
pub mod methods;

/// MCP protocol version this implementation targets.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub use initialization::{
    ClientCapabilities, Implementation, InitializeParams, InitializeResult, ServerCapabilities,
    ToolsCapability,
};
pub use jsonrpc::{
    ErrorCode, JSONRPC_VERSION, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId,
};
pub use tools::{
    CallToolParams, CallToolResult, Content, ListToolsParams, ListToolsResult, PropertySchema,
    Tool, ToolInputSchema,
};
