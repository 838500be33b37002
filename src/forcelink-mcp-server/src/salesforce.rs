//! Salesforce tool handlers.
//!
//! Five tools wrap one shared [`AuthOrchestrator`]. Tool outcomes are
//! reported as a JSON payload with a `success` flag rather than protocol
//! errors, so callers always get a structured result they can show.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{error, warn};

use forcelink_login::AuthOrchestrator;
use forcelink_mcp_types::{CallToolResult, PropertySchema, Tool, ToolInputSchema};

use crate::handlers::ToolHandler;

type SharedOrchestrator = Arc<Mutex<AuthOrchestrator>>;

/// The Salesforce tool set.
pub struct SalesforceTools {
    orchestrator: SharedOrchestrator,
}

impl SalesforceTools {
    pub fn new(orchestrator: AuthOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
        }
    }

    /// Handlers for every tool, sharing the orchestrator.
    pub fn handlers(&self) -> Vec<Arc<dyn ToolHandler>> {
        vec![
            Arc::new(LoginTool {
                orchestrator: self.orchestrator.clone(),
            }),
            Arc::new(HandleOAuthTool {
                orchestrator: self.orchestrator.clone(),
            }),
            Arc::new(LogoutTool {
                orchestrator: self.orchestrator.clone(),
            }),
            Arc::new(QueryTool {
                orchestrator: self.orchestrator.clone(),
            }),
            Arc::new(SearchTool {
                orchestrator: self.orchestrator.clone(),
            }),
        ]
    }
}

fn payload(value: Value) -> CallToolResult {
    CallToolResult::text(value.to_string())
}

fn failure(error: impl std::fmt::Display) -> CallToolResult {
    payload(json!({ "success": false, "error": error.to_string() }))
}

fn not_authenticated() -> CallToolResult {
    payload(json!({
        "success": false,
        "error": "Not authenticated. Please login first using salesforce_login"
    }))
}

fn string_arg(arguments: &Value, key: &str) -> Option<String> {
    arguments.get(key).and_then(Value::as_str).map(str::to_string)
}

/// `salesforce_login`: run the interactive browser login.
struct LoginTool {
    orchestrator: SharedOrchestrator,
}

#[async_trait::async_trait]
impl ToolHandler for LoginTool {
    fn tool(&self) -> Tool {
        Tool::new(
            "salesforce_login",
            "Login to Salesforce through the browser. Opens an environment \
             selector unless an environment is given.",
        )
        .with_schema(ToolInputSchema::object().property(
            "environment",
            PropertySchema::string()
                .description("Target Salesforce environment")
                .enum_values(vec!["sandbox", "production"]),
        ))
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let environment = string_arg(&arguments, "environment");
        let mut orchestrator = self.orchestrator.lock().await;
        match orchestrator.start_login_flow(environment.as_deref()).await {
            Ok(success) => Ok(payload(json!({
                "success": true,
                "message": "Successfully authenticated with Salesforce",
                "instance_url": success.instance_url,
            }))),
            Err(e) => {
                error!(error = %e, "Login failed");
                Ok(failure(e))
            }
        }
    }
}

/// `salesforce_handle_oauth`: consume a callback URL captured out of band.
struct HandleOAuthTool {
    orchestrator: SharedOrchestrator,
}

#[async_trait::async_trait]
impl ToolHandler for HandleOAuthTool {
    fn tool(&self) -> Tool {
        Tool::new(
            "salesforce_handle_oauth",
            "Complete a pending login from a full OAuth callback URL, \
             including the token fragment.",
        )
        .with_schema(
            ToolInputSchema::object()
                .property(
                    "callback_url",
                    PropertySchema::string().description("The full OAuth callback URL"),
                )
                .required(vec!["callback_url"]),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let Some(callback_url) = string_arg(&arguments, "callback_url") else {
            return Ok(failure("callback_url is required"));
        };
        let mut orchestrator = self.orchestrator.lock().await;
        match orchestrator.handle_oauth_callback(&callback_url) {
            Ok(success) => Ok(payload(json!({
                "success": true,
                "message": "Successfully authenticated with Salesforce",
                "instance_url": success.instance_url,
            }))),
            Err(e) => {
                error!(error = %e, "OAuth callback failed");
                Ok(failure(e))
            }
        }
    }
}

/// `salesforce_logout`: drop the current session.
struct LogoutTool {
    orchestrator: SharedOrchestrator,
}

#[async_trait::async_trait]
impl ToolHandler for LogoutTool {
    fn tool(&self) -> Tool {
        Tool::new("salesforce_logout", "Logout from Salesforce.")
    }

    async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
        self.orchestrator.lock().await.clear_session();
        Ok(payload(json!({
            "success": true,
            "message": "Successfully logged out"
        })))
    }
}

/// `salesforce_query`: run a read-only SOQL query.
struct QueryTool {
    orchestrator: SharedOrchestrator,
}

#[async_trait::async_trait]
impl ToolHandler for QueryTool {
    fn tool(&self) -> Tool {
        Tool::new(
            "salesforce_query",
            "Execute a read-only SOQL query. Plain SELECTs without a LIMIT \
             are capped at 200 rows.",
        )
        .with_schema(
            ToolInputSchema::object()
                .property(
                    "soql",
                    PropertySchema::string().description("The SOQL query to execute"),
                )
                .required(vec!["soql"]),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let Some(soql) = string_arg(&arguments, "soql") else {
            return Ok(failure("soql is required"));
        };
        let mut orchestrator = self.orchestrator.lock().await;
        let Some(client) = orchestrator.client().cloned() else {
            return Ok(not_authenticated());
        };
        match client.query(&soql).await {
            Ok(results) => Ok(payload(json!({ "success": true, "results": results }))),
            Err(e) if e.is_session_expired() => {
                warn!("Session expired, clearing session");
                orchestrator.clear_session();
                Ok(failure(e))
            }
            Err(e) => Ok(failure(e)),
        }
    }
}

/// `salesforce_search`: run a SOSL search.
struct SearchTool {
    orchestrator: SharedOrchestrator,
}

#[async_trait::async_trait]
impl ToolHandler for SearchTool {
    fn tool(&self) -> Tool {
        Tool::new("salesforce_search", "Execute a SOSL search.").with_schema(
            ToolInputSchema::object()
                .property(
                    "search_term",
                    PropertySchema::string()
                        .description("SOSL search, e.g. FIND {Acme} IN NAME FIELDS"),
                )
                .required(vec!["search_term"]),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let Some(search_term) = string_arg(&arguments, "search_term") else {
            return Ok(failure("search_term is required"));
        };
        let mut orchestrator = self.orchestrator.lock().await;
        let Some(client) = orchestrator.client().cloned() else {
            return Ok(not_authenticated());
        };
        match client.search(&search_term).await {
            Ok(results) => Ok(payload(json!({ "success": true, "results": results }))),
            Err(e) if e.is_session_expired() => {
                warn!("Session expired, clearing session");
                orchestrator.clear_session();
                Ok(failure(e))
            }
            Err(e) => Ok(failure(e)),
        }
    }
}
