//! MSSQL MCP Server (stdio transport)
//!
//! Database configuration comes from the MSSQL_* environment variables.
//! Logs go to stderr; stdout carries the MCP protocol.

use anyhow::Result;
use mssql_mcp::{init_tracing, MssqlMcpServer};
use rmcp::ServiceExt;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("mssql_mcp=info")?;

    tracing::info!("Starting MSSQL MCP server (stdio)");

    let server = MssqlMcpServer::new();
    let service = server.serve(rmcp::transport::stdio()).await?;

    tracing::info!("Server running, waiting for requests...");

    service.waiting().await?;

    tracing::info!("Server shutting down");
    Ok(())
}
