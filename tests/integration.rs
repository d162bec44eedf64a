//! Integration tests for the MSSQL MCP server
//!
//! These run against a real SQL Server instance configured through the
//! standard environment variables:
//!
//! ```bash
//! export MSSQL_SERVER=localhost
//! export MSSQL_USER=sa
//! export MSSQL_PASSWORD=...
//! export MSSQL_DATABASE=master
//! export MSSQL_TRUST_SERVER_CERTIFICATE=true
//!
//! cargo test --test integration -- --ignored
//! ```
//!
//! They exercise the real Tiberius driver end to end and are read-only
//! except where noted.

use mssql_mcp::config::DbRegistry;
use mssql_mcp::driver::TiberiusDriver;
use mssql_mcp::handlers;
use mssql_mcp::normalize::{self, FormatMode};
use mssql_mcp::safety::StatementGuard;
use mssql_mcp::types::QueryOutcome;

fn env_configured() -> bool {
    ["MSSQL_USER", "MSSQL_PASSWORD", "MSSQL_DATABASE"]
        .iter()
        .all(|key| std::env::var(key).is_ok())
}

fn registry() -> DbRegistry {
    DbRegistry::from_env()
}

#[tokio::test]
#[ignore = "integration test - requires a live SQL Server"]
async fn select_round_trips_through_the_envelope() {
    assert!(env_configured(), "MSSQL_* environment is not configured");

    let outcome = handlers::execute_sql(
        &registry(),
        &TiberiusDriver,
        &StatementGuard::new(),
        "SELECT 1 AS answer",
        None,
    )
    .await;

    let envelope = normalize::envelope(&outcome, FormatMode::Structured);
    assert!(!envelope.is_error, "payload: {}", envelope.payload);

    let parsed: serde_json::Value = serde_json::from_str(&envelope.payload).unwrap();
    assert_eq!(parsed["rowCount"], 1);
    assert_eq!(parsed["recordset"][0]["answer"], 1);
}

#[tokio::test]
#[ignore = "integration test - requires a live SQL Server"]
async fn information_schema_query_lists_table_names() {
    assert!(env_configured(), "MSSQL_* environment is not configured");

    let outcome = handlers::execute_sql(
        &registry(),
        &TiberiusDriver,
        &StatementGuard::new(),
        "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES",
        None,
    )
    .await;

    let envelope = normalize::envelope(&outcome, FormatMode::Structured);
    assert!(!envelope.is_error, "payload: {}", envelope.payload);

    let parsed: serde_json::Value = serde_json::from_str(&envelope.payload).unwrap();
    assert!(parsed["tables"].is_array());
}

#[tokio::test]
#[ignore = "integration test - requires a live SQL Server"]
async fn drop_is_blocked_without_touching_the_server() {
    // Safe to run against any database: the statement never leaves the guard.
    let outcome = handlers::execute_sql(
        &registry(),
        &TiberiusDriver,
        &StatementGuard::new(),
        "DROP TABLE Users",
        None,
    )
    .await;

    match outcome {
        QueryOutcome::Failure { db, message } => {
            assert!(db.is_none());
            assert!(message.contains("unsafe"));
        }
        _ => panic!("DROP must not succeed"),
    }
}

#[tokio::test]
#[ignore = "integration test - requires a live SQL Server"]
async fn missing_table_schema_reports_not_found() {
    assert!(env_configured(), "MSSQL_* environment is not configured");

    let outcome = handlers::get_table_schema(
        &registry(),
        &TiberiusDriver,
        "table_that_does_not_exist_9f2c",
        None,
    )
    .await;

    let envelope = normalize::envelope(&outcome, FormatMode::Structured);
    assert!(envelope.is_error);
    assert!(envelope.payload.contains("table_that_does_not_exist_9f2c"));
}

#[tokio::test]
#[ignore = "integration test - requires a live SQL Server"]
async fn resources_list_and_read() {
    assert!(env_configured(), "MSSQL_* environment is not configured");

    let resources = handlers::list_table_resources(&registry(), &TiberiusDriver, None).await;
    let Some(first) = resources.first() else {
        // Empty databases are fine; nothing further to read.
        return;
    };

    let data = handlers::read_table_resource(&registry(), &TiberiusDriver, &first.uri, None)
        .await
        .unwrap();
    assert!(!data.is_empty(), "expected at least a header line");
}
