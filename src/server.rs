//! MCP server implementation
//!
//! Exposes the query-mediation handlers as MCP tools and the database's base
//! tables as `mssql://` resources. Tool bodies stay thin; the decision logic
//! lives in the handlers module.

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::AnnotateAble,
    model::{
        CallToolResult, Content, ListResourcesResult, PaginatedRequestParam, RawResource,
        ReadResourceRequestParam, ReadResourceResult, ResourceContents, ServerCapabilities,
        ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};

use crate::config::DbRegistry;
use crate::driver::{Driver, TiberiusDriver};
use crate::handlers;
use crate::normalize::{self, FormatMode};
use crate::params::{ExecuteSqlParams, TableSchemaParams};
use crate::safety::StatementGuard;
use crate::types::{DbError, ResponseEnvelope};

/// MSSQL MCP server with multi-database support.
#[derive(Clone)]
pub struct MssqlMcpServer {
    registry: Arc<DbRegistry>,
    driver: Arc<dyn Driver>,
    guard: Arc<StatementGuard>,
    tool_router: ToolRouter<Self>,
}

impl MssqlMcpServer {
    /// Create a server connected to the databases named in the environment.
    pub fn new() -> Self {
        Self::with_parts(DbRegistry::from_env(), Arc::new(TiberiusDriver))
    }

    /// Create a server over an explicit registry and driver.
    pub fn with_parts(registry: DbRegistry, driver: Arc<dyn Driver>) -> Self {
        Self {
            registry: Arc::new(registry),
            driver,
            guard: Arc::new(StatementGuard::new()),
            tool_router: Self::tool_router(),
        }
    }
}

impl Default for MssqlMcpServer {
    fn default() -> Self {
        Self::new()
    }
}

fn envelope_to_result(envelope: ResponseEnvelope) -> CallToolResult {
    let content = vec![Content::text(envelope.payload)];
    if envelope.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

fn db_error_to_mcp(err: DbError) -> McpError {
    match &err {
        DbError::Validation(_) => McpError::invalid_params(err.to_string(), None),
        DbError::Config(_) => McpError::invalid_request(err.to_string(), None),
        DbError::Database(_) | DbError::TableNotFound(_) => {
            McpError::internal_error(err.to_string(), None)
        }
    }
}

#[tool_router]
impl MssqlMcpServer {
    #[tool(
        description = "Execute an SQL query on the SQL Server (multi-database support). SELECT statements run inside a read-committed transaction; mutating statements report their affected-row count."
    )]
    async fn execute_sql(
        &self,
        Parameters(params): Parameters<ExecuteSqlParams>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = handlers::execute_sql(
            &self.registry,
            self.driver.as_ref(),
            &self.guard,
            &params.query,
            params.db_key.as_deref(),
        )
        .await;
        Ok(envelope_to_result(normalize::envelope(
            &outcome,
            FormatMode::Structured,
        )))
    }

    #[tool(description = "Retrieve the schema of a specified table (multi-database support)")]
    async fn get_table_schema(
        &self,
        Parameters(params): Parameters<TableSchemaParams>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = handlers::get_table_schema(
            &self.registry,
            self.driver.as_ref(),
            &params.table,
            params.db_key.as_deref(),
        )
        .await;
        Ok(envelope_to_result(normalize::envelope(
            &outcome,
            FormatMode::Structured,
        )))
    }

    #[tool(description = "List all configured databases in the application")]
    async fn list_databases(&self) -> Result<CallToolResult, McpError> {
        let listing = handlers::list_databases(&self.registry);
        let json = serde_json::to_string_pretty(&listing)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

#[tool_handler]
impl ServerHandler for MssqlMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "SQL Server MCP server with multi-database support. Use execute_sql to run \
                 queries, get_table_schema to inspect a table, and list_databases to see the \
                 configured connections. Base tables are also exposed as mssql:// resources."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            ..Default::default()
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources = handlers::list_table_resources(&self.registry, self.driver.as_ref(), None)
            .await
            .into_iter()
            .map(|table| {
                let mut raw = RawResource::new(table.uri.clone(), table.name.clone());
                raw.description = Some(table.description.clone());
                raw.mime_type = Some(table.mime_type.clone());
                raw.no_annotation()
            })
            .collect();

        Ok(ListResourcesResult {
            meta: None,
            resources,
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let data =
            handlers::read_table_resource(&self.registry, self.driver.as_ref(), &uri, None)
                .await
                .map_err(db_error_to_mcp)?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(data, uri)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_maps_onto_call_tool_result() {
        let ok = envelope_to_result(ResponseEnvelope {
            is_error: false,
            payload: "{}".to_string(),
        });
        assert!(!ok.is_error.unwrap_or(false));

        let err = envelope_to_result(ResponseEnvelope {
            is_error: true,
            payload: "{\"error\": \"boom\"}".to_string(),
        });
        assert!(err.is_error.unwrap_or(false));
    }

    #[test]
    fn validation_errors_map_to_invalid_params() {
        let err = db_error_to_mcp(DbError::Validation("bad uri".to_string()));
        assert!(err.message.contains("bad uri"));
    }
}
