//! Response normalization
//!
//! Converts a [`QueryOutcome`] into the envelope callers see, in one of two
//! encodings: a structured JSON body (tool calls) or a delimited-text block
//! (resource reads and legacy callers).

use serde::Serialize;

use crate::types::{CellValue, QueryOutcome, QueryPayload, RecordSet, ResponseEnvelope};

/// Message reported for successful mutating statements.
pub const MUTATION_MESSAGE: &str = "Query executed successfully";

/// Output encoding selected by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    /// JSON body with `db`/`rowCount`/payload keys.
    Structured,
    /// Comma-delimited text with a header line.
    Delimited,
}

/// Produce the envelope for one outcome.
pub fn envelope(outcome: &QueryOutcome, mode: FormatMode) -> ResponseEnvelope {
    match mode {
        FormatMode::Structured => structured(outcome),
        FormatMode::Delimited => delimited(outcome),
    }
}

// ============================================================================
// Structured mode
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordsBody<'a> {
    db: &'a str,
    row_count: usize,
    recordset: Vec<serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TablesBody<'a> {
    tables: &'a [String],
    db: &'a str,
    row_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SchemaBody<'a> {
    db: &'a str,
    table: &'a str,
    columns: Vec<serde_json::Value>,
    row_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MutationBody<'a> {
    message: &'static str,
    db: &'a str,
    rows_affected: u64,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<&'a str>,
}

fn structured(outcome: &QueryOutcome) -> ResponseEnvelope {
    match outcome {
        QueryOutcome::Success { db, payload } => {
            let body = match payload {
                QueryPayload::Records(records) => pretty(&RecordsBody {
                    db,
                    row_count: records.row_count(),
                    recordset: records_to_json(records),
                }),
                QueryPayload::Tables(tables) => pretty(&TablesBody {
                    tables,
                    db,
                    row_count: tables.len(),
                }),
                QueryPayload::Schema { table, columns } => pretty(&SchemaBody {
                    db,
                    table,
                    columns: records_to_json(columns),
                    row_count: columns.row_count(),
                }),
                QueryPayload::RowsAffected(count) => pretty(&MutationBody {
                    message: MUTATION_MESSAGE,
                    db,
                    rows_affected: *count,
                }),
            };
            ResponseEnvelope {
                is_error: false,
                payload: body,
            }
        }
        QueryOutcome::Failure { db, message } => ResponseEnvelope {
            is_error: true,
            payload: pretty(&ErrorBody {
                error: message,
                db: db.as_deref(),
            }),
        },
    }
}

/// Rows as JSON objects keyed by column name, null preserved.
fn records_to_json(records: &RecordSet) -> Vec<serde_json::Value> {
    records
        .rows
        .iter()
        .map(|row| {
            let object: serde_json::Map<String, serde_json::Value> = records
                .columns
                .iter()
                .zip(row)
                .map(|(column, cell)| (column.clone(), cell.to_json()))
                .collect();
            serde_json::Value::Object(object)
        })
        .collect()
}

fn pretty(body: &impl Serialize) -> String {
    serde_json::to_string_pretty(body)
        .unwrap_or_else(|e| format!(r#"{{"error": "failed to serialize response: {e}"}}"#))
}

// ============================================================================
// Delimited mode
// ============================================================================

fn delimited(outcome: &QueryOutcome) -> ResponseEnvelope {
    match outcome {
        QueryOutcome::Success { payload, .. } => {
            let text = match payload {
                QueryPayload::Records(records) => to_delimited_text(records),
                QueryPayload::Schema { columns, .. } => to_delimited_text(columns),
                QueryPayload::Tables(tables) => to_delimited_text(&RecordSet {
                    columns: vec!["TABLE_NAME".to_string()],
                    rows: tables
                        .iter()
                        .map(|table| vec![CellValue::Text(table.clone())])
                        .collect(),
                }),
                QueryPayload::RowsAffected(count) => to_delimited_text(&RecordSet {
                    columns: vec!["message".to_string(), "rowsAffected".to_string()],
                    rows: vec![vec![
                        CellValue::Text(MUTATION_MESSAGE.to_string()),
                        CellValue::Int(*count as i64),
                    ]],
                }),
            };
            ResponseEnvelope {
                is_error: false,
                payload: text,
            }
        }
        QueryOutcome::Failure { message, .. } => ResponseEnvelope {
            is_error: true,
            payload: message.clone(),
        },
    }
}

/// Header line of column names, then one line per row. Fields containing a
/// comma, double quote, or line break are quote-wrapped with inner quotes
/// doubled; nulls become empty fields.
pub fn to_delimited_text(records: &RecordSet) -> String {
    let mut lines = Vec::with_capacity(records.rows.len() + 1);
    lines.push(join_fields(records.columns.iter().map(String::as_str)));
    for row in &records.rows {
        let rendered: Vec<String> = row.iter().map(CellValue::render).collect();
        lines.push(join_fields(rendered.iter().map(String::as_str)));
    }
    lines.join("\n")
}

fn join_fields<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    fields.map(escape_field).collect::<Vec<_>>().join(",")
}

fn escape_field(value: &str) -> String {
    let needs_quoting = value
        .chars()
        .any(|c| matches!(c, ',' | '"' | '\n' | '\r'));
    if needs_quoting {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
