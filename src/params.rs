//! Parameter types for the MCP tools
//!
//! Wire names (`query`, `table`, `dbKey`) are part of the tool contract and
//! are shared by the HTTP request bodies.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteSqlParams {
    #[schemars(description = "The SQL query to execute")]
    pub query: String,

    #[schemars(
        description = "The database key to use (e.g., 'maindb', 'reportingdb'). Optional in single-database mode."
    )]
    #[serde(rename = "dbKey", default, skip_serializing_if = "Option::is_none")]
    pub db_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TableSchemaParams {
    #[schemars(description = "The name of the table")]
    pub table: String,

    #[schemars(
        description = "The database key to use (e.g., 'maindb', 'reportingdb'). Optional in single-database mode."
    )]
    #[serde(rename = "dbKey", default, skip_serializing_if = "Option::is_none")]
    pub db_key: Option<String>,
}
