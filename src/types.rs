//! Type definitions for the MSSQL MCP server

use serde::ser::Serializer;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Record Types
// ============================================================================

/// A single cell value decoded from the driver.
///
/// This is the only scalar representation the rest of the crate sees;
/// driver-native types (GUIDs, decimals, temporal values, binary) are
/// rendered into one of these variants at the driver boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// JSON representation; `Null` stays a JSON null, never an empty string.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Bool(b) => serde_json::Value::Bool(*b),
            CellValue::Int(i) => serde_json::Value::from(*i),
            CellValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Plain-text rendering used by the delimited output mode.
    /// `Null` renders as an empty field.
    pub fn render(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_unit(),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Int(i) => serializer.serialize_i64(*i),
            CellValue::Float(f) => serializer.serialize_f64(*f),
            CellValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// An ordered result set, decoupled from the driver's row representation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Rows as cell vectors, parallel to `columns`.
    pub rows: Vec<Vec<CellValue>>,
}

impl RecordSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

// ============================================================================
// Execution Outcomes
// ============================================================================

/// What a successful execution produced.
#[derive(Debug)]
pub enum QueryPayload {
    /// Name-only listing produced for the INFORMATION_SCHEMA.TABLES idiom.
    Tables(Vec<String>),
    /// Generic SELECT result.
    Records(RecordSet),
    /// Column metadata for one table.
    Schema { table: String, columns: RecordSet },
    /// Mutating statement acknowledgement.
    RowsAffected(u64),
}

/// Outcome of one mediated statement, tagged with the database it ran against.
///
/// `db` is absent on failures raised before a descriptor was resolved
/// (validation, safety rejection, unknown key).
#[derive(Debug)]
pub enum QueryOutcome {
    Success {
        db: String,
        payload: QueryPayload,
    },
    Failure {
        db: Option<String>,
        message: String,
    },
}

impl QueryOutcome {
    pub fn success(db: impl Into<String>, payload: QueryPayload) -> Self {
        QueryOutcome::Success {
            db: db.into(),
            payload,
        }
    }

    pub fn failure(db: Option<String>, message: impl Into<String>) -> Self {
        QueryOutcome::Failure {
            db,
            message: message.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, QueryOutcome::Failure { .. })
    }
}

/// The uniform wrapper returned across the trust boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub is_error: bool,
    /// JSON text in structured mode, a delimited-text block otherwise.
    pub payload: String,
}

// ============================================================================
// Listing Types
// ============================================================================

/// One table exposed as a readable resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResource {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

impl TableResource {
    pub fn for_table(table: &str) -> Self {
        Self {
            uri: format!("mssql://{table}/data"),
            name: format!("Table: {table}"),
            description: format!("Data in table: {table}"),
            mime_type: "text/plain".to_string(),
        }
    }
}

/// Configured databases with credentials masked.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseListing {
    pub available_databases: Vec<String>,
    pub configurations: std::collections::BTreeMap<String, crate::config::MaskedDescriptor>,
    pub count: usize,
    pub default_database: String,
}

// ============================================================================
// Errors
// ============================================================================

/// Error taxonomy for the query-mediation layer.
///
/// Callers receive these flattened into envelopes or protocol errors; the
/// variants exist so adapters can pick a status/code without parsing text.
#[derive(Debug, Error)]
pub enum DbError {
    /// Missing or invalid connection settings, or an unknown database key.
    #[error("{0}")]
    Config(String),
    /// Malformed input rejected before any statement reaches the database.
    #[error("{0}")]
    Validation(String),
    /// Driver, connection, or transaction failure. Carries the driver
    /// message verbatim.
    #[error("{0}")]
    Database(String),
    /// Catalog lookup matched no columns for the requested table.
    #[error("Table '{0}' not found or has no columns")]
    TableNotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_json_preserves_null_vs_empty_string() {
        assert_eq!(CellValue::Null.to_json(), serde_json::Value::Null);
        assert_eq!(
            CellValue::Text(String::new()).to_json(),
            serde_json::Value::String(String::new())
        );
    }

    #[test]
    fn cell_render_maps_null_to_empty_field() {
        assert_eq!(CellValue::Null.render(), "");
        assert_eq!(CellValue::Int(42).render(), "42");
        assert_eq!(CellValue::Bool(true).render(), "true");
    }

    #[test]
    fn table_resource_uri_shape() {
        let resource = TableResource::for_table("Orders");
        assert_eq!(resource.uri, "mssql://Orders/data");
        assert_eq!(resource.name, "Table: Orders");
        assert_eq!(resource.mime_type, "text/plain");
    }

    #[test]
    fn table_not_found_message_names_the_table() {
        let err = DbError::TableNotFound("Ghost".to_string());
        assert_eq!(err.to_string(), "Table 'Ghost' not found or has no columns");
    }
}
