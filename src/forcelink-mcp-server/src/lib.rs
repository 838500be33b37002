//! Forcelink MCP Server - Salesforce tools over the Model Context Protocol.
//!
//! A tools-only MCP server speaking line-delimited JSON-RPC 2.0 on stdio.
//! The Salesforce tool set covers interactive login, OAuth callback
//! handling, logout, SOQL queries, and SOSL search.

mod handlers;
mod salesforce;
mod server;

pub use handlers::ToolHandler;
pub use salesforce::SalesforceTools;
pub use server::{McpServer, ServerState};
