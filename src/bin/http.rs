//! MSSQL MCP HTTP API server
//!
//! Serves the same four operations as the stdio transport over plain HTTP.
//! Port comes from `PORT` (default 3000); database configuration from the
//! MSSQL_* environment variables.

use anyhow::Result;
use mssql_mcp::{init_tracing, web};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("mssql_mcp=info")?;

    let port = std::env::var("PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(3000);

    web::serve(web::AppState::from_env(), port).await
}
