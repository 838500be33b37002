//! Forcelink - Salesforce MCP server entry point.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use forcelink_login::{AuthOrchestrator, KeyringSecretStore, RestSessionFactory, SystemBrowser};
use forcelink_mcp_server::{McpServer, SalesforceTools};
use forcelink_mcp_types::{Implementation, ServerCapabilities};

/// Read-only Salesforce MCP server with browser-based login.
#[derive(Parser)]
#[command(name = "forcelink")]
#[command(about = "Read-only Salesforce MCP server with browser-based login")]
#[command(version)]
struct Args {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", env = "FORCELINK_LOG")]
    log_level: String,
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the MCP protocol, so logs go to stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let orchestrator = AuthOrchestrator::new(
        Arc::new(KeyringSecretStore::new()),
        Arc::new(SystemBrowser::new()),
        Arc::new(RestSessionFactory),
    );

    let server = Arc::new(
        McpServer::new(
            Implementation::new("forcelink", env!("CARGO_PKG_VERSION")),
            ServerCapabilities::default().with_tools(),
        )
        .with_instructions(
            "Read-only Salesforce access. Call salesforce_login before querying.",
        ),
    );
    server
        .register_tools(SalesforceTools::new(orchestrator).handlers())
        .await;

    server.run_stdio().await
}
