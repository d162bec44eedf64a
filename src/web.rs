//! HTTP API
//!
//! A thin adapter over the same handlers the MCP transport uses. Failures
//! surface as non-2xx statuses with a JSON `{error}` body; envelope payloads
//! pass through verbatim.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::DbRegistry;
use crate::driver::{Driver, TiberiusDriver};
use crate::handlers;
use crate::normalize::{self, FormatMode};
use crate::params::{ExecuteSqlParams, TableSchemaParams};
use crate::safety::StatementGuard;
use crate::types::{DbError, ResponseEnvelope, TableResource};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<DbRegistry>,
    driver: Arc<dyn Driver>,
    guard: Arc<StatementGuard>,
}

impl AppState {
    pub fn new(registry: DbRegistry, driver: Arc<dyn Driver>) -> Self {
        Self {
            registry: Arc::new(registry),
            driver,
            guard: Arc::new(StatementGuard::new()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(DbRegistry::from_env(), Arc::new(TiberiusDriver))
    }
}

/// Start the HTTP server.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("MSSQL MCP HTTP server listening on http://localhost:{port}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/resources", get(list_resources))
        .route("/resource", get(read_resource))
        .route("/tools", get(list_tools))
        .route("/execute-sql", post(execute_sql))
        .route("/get-table-schema", post(get_table_schema))
        .route("/databases", get(list_databases))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl ErrorResponse {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    databases: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        databases: state.registry.len(),
    })
}

async fn list_resources(State(state): State<AppState>) -> Json<Vec<TableResource>> {
    Json(handlers::list_table_resources(&state.registry, state.driver.as_ref(), None).await)
}

#[derive(Debug, Deserialize)]
struct ResourceQuery {
    uri: Option<String>,
    #[serde(rename = "dbKey")]
    db_key: Option<String>,
}

async fn read_resource(
    State(state): State<AppState>,
    Query(params): Query<ResourceQuery>,
) -> Response {
    let Some(uri) = params.uri else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Parameter 'uri' is required")),
        )
            .into_response();
    };

    match handlers::read_table_resource(
        &state.registry,
        state.driver.as_ref(),
        &uri,
        params.db_key.as_deref(),
    )
    .await
    {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(uri = %uri, "read_resource: {e}");
            let status = match e {
                DbError::Validation(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(ErrorResponse::new(e.to_string()))).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct ToolDescriptor {
    name: &'static str,
    description: &'static str,
    #[serde(rename = "inputSchema")]
    input_schema: serde_json::Value,
}

fn schema_value<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

fn tool_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "execute_sql",
            description: "Execute an SQL query on the SQL Server (multi-database support)",
            input_schema: schema_value::<ExecuteSqlParams>(),
        },
        ToolDescriptor {
            name: "get_table_schema",
            description: "Retrieve the schema of a specified table (multi-database support)",
            input_schema: schema_value::<TableSchemaParams>(),
        },
        ToolDescriptor {
            name: "list_databases",
            description: "List all configured databases in the application",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        },
    ]
}

async fn list_tools() -> Json<Vec<ToolDescriptor>> {
    Json(tool_descriptors())
}

fn envelope_response(envelope: ResponseEnvelope) -> Response {
    let status = if envelope.is_error {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        envelope.payload,
    )
        .into_response()
}

async fn execute_sql(
    State(state): State<AppState>,
    Json(req): Json<ExecuteSqlParams>,
) -> Response {
    let outcome = handlers::execute_sql(
        &state.registry,
        state.driver.as_ref(),
        &state.guard,
        &req.query,
        req.db_key.as_deref(),
    )
    .await;
    envelope_response(normalize::envelope(&outcome, FormatMode::Structured))
}

async fn get_table_schema(
    State(state): State<AppState>,
    Json(req): Json<TableSchemaParams>,
) -> Response {
    let outcome = handlers::get_table_schema(
        &state.registry,
        state.driver.as_ref(),
        &req.table,
        req.db_key.as_deref(),
    )
    .await;
    envelope_response(normalize::envelope(&outcome, FormatMode::Structured))
}

async fn list_databases(State(state): State<AppState>) -> Json<crate::types::DatabaseListing> {
    Json(handlers::list_databases(&state.registry))
}
