//! Query-mediation handlers
//!
//! Each handler resolves a descriptor, consults the statement guard where
//! raw SQL is involved, runs against a fresh connection, and returns an
//! outcome for the normalizer. Connections are released on every path;
//! errors never escape past this boundary.

use std::collections::BTreeMap;

use crate::config::DbRegistry;
use crate::driver::{Connection, Driver, IsolationLevel};
use crate::normalize;
use crate::safety::{StatementGuard, UNSAFE_QUERY_MESSAGE};
use crate::types::{
    CellValue, DatabaseListing, DbError, DbResult, QueryOutcome, QueryPayload, RecordSet,
    TableResource,
};

/// Catalog query behind the list-tables idiom.
pub const LIST_TABLES_QUERY: &str =
    "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE'";

/// Column metadata for one table; the name binds to `@P1`.
const SCHEMA_QUERY: &str = "SELECT COLUMN_NAME, DATA_TYPE, CHARACTER_MAXIMUM_LENGTH \
     FROM INFORMATION_SCHEMA.COLUMNS \
     WHERE TABLE_NAME = @P1 \
     ORDER BY ORDINAL_POSITION";

/// URI scheme under which tables are exposed as resources.
pub const RESOURCE_SCHEME: &str = "mssql://";

/// Row cap for resource reads.
pub const RESOURCE_ROW_LIMIT: usize = 100;

// ============================================================================
// execute_sql
// ============================================================================

/// Run an ad-hoc statement against the selected database.
///
/// SELECT statements run inside a READ COMMITTED transaction for a
/// consistent snapshot; mutating statements run directly on the connection
/// and report their affected-row count. Statements matching the deny list
/// are refused before any connection is opened.
pub async fn execute_sql(
    registry: &DbRegistry,
    driver: &dyn Driver,
    guard: &StatementGuard,
    query: &str,
    db_key: Option<&str>,
) -> QueryOutcome {
    if query.trim().is_empty() {
        return QueryOutcome::failure(None, "Query must not be empty");
    }

    let verdict = guard.classify(query);
    if !verdict.permitted {
        tracing::warn!(db_key = ?db_key, "blocked unsafe query");
        return QueryOutcome::failure(None, UNSAFE_QUERY_MESSAGE);
    }

    let descriptor = match registry.resolve(db_key) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            tracing::error!(db_key = ?db_key, "execute_sql: {e}");
            return QueryOutcome::failure(None, e.to_string());
        }
    };
    let db = descriptor.database.clone();

    let mut conn = match driver.connect(descriptor).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(db = %db, "execute_sql: connect failed: {e}");
            return QueryOutcome::failure(Some(db), e.to_string());
        }
    };

    let result = if verdict.read_only {
        select_in_transaction(conn.as_mut(), query).await
    } else {
        conn.execute(query).await.map(QueryPayload::RowsAffected)
    };
    conn.close().await;

    match result {
        Ok(payload) => QueryOutcome::success(db, payload),
        Err(e) => {
            tracing::error!(db = %db, "execute_sql: {e}");
            QueryOutcome::failure(Some(db), e.to_string())
        }
    }
}

async fn select_in_transaction(conn: &mut dyn Connection, query: &str) -> DbResult<QueryPayload> {
    conn.begin_transaction(IsolationLevel::ReadCommitted).await?;

    let records = match conn.query(query, &[]).await {
        Ok(records) => records,
        Err(e) => {
            rollback_logged(conn).await;
            return Err(e);
        }
    };

    if let Err(e) = conn.commit().await {
        rollback_logged(conn).await;
        return Err(e);
    }

    // Callers use this one catalog query as a "list tables" idiom and
    // expect name-only output.
    if query.to_uppercase().contains("INFORMATION_SCHEMA.TABLES") {
        Ok(QueryPayload::Tables(first_column(&records)))
    } else {
        Ok(QueryPayload::Records(records))
    }
}

/// Rollback errors are logged and never mask the error that triggered them.
async fn rollback_logged(conn: &mut dyn Connection) {
    if let Err(e) = conn.rollback().await {
        tracing::error!("rollback failed: {e}");
    }
}

fn first_column(records: &RecordSet) -> Vec<String> {
    records
        .rows
        .iter()
        .map(|row| row.first().map(CellValue::render).unwrap_or_default())
        .collect()
}

// ============================================================================
// get_table_schema
// ============================================================================

/// Read column metadata for one table.
///
/// The table name is the one untrusted input that feeds a query here, so it
/// binds as a parameter and is never interpolated into SQL text.
pub async fn get_table_schema(
    registry: &DbRegistry,
    driver: &dyn Driver,
    table: &str,
    db_key: Option<&str>,
) -> QueryOutcome {
    if table.trim().is_empty() {
        return QueryOutcome::failure(None, "Table name must not be empty");
    }

    let descriptor = match registry.resolve(db_key) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            tracing::error!(db_key = ?db_key, table = %table, "get_table_schema: {e}");
            return QueryOutcome::failure(None, e.to_string());
        }
    };
    let db = descriptor.database.clone();

    let mut conn = match driver.connect(descriptor).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(db = %db, table = %table, "get_table_schema: connect failed: {e}");
            return QueryOutcome::failure(Some(db), e.to_string());
        }
    };

    let result = schema_in_transaction(conn.as_mut(), table).await;
    conn.close().await;

    match result {
        Ok(columns) if columns.rows.is_empty() => {
            let e = DbError::TableNotFound(table.to_string());
            tracing::error!(db = %db, table = %table, "get_table_schema: {e}");
            QueryOutcome::failure(Some(db), e.to_string())
        }
        Ok(columns) => QueryOutcome::success(
            db,
            QueryPayload::Schema {
                table: table.to_string(),
                columns,
            },
        ),
        Err(e) => {
            tracing::error!(db = %db, table = %table, "get_table_schema: {e}");
            QueryOutcome::failure(Some(db), e.to_string())
        }
    }
}

async fn schema_in_transaction(conn: &mut dyn Connection, table: &str) -> DbResult<RecordSet> {
    conn.begin_transaction(IsolationLevel::ReadCommitted).await?;

    let records = match conn.query(SCHEMA_QUERY, &[table]).await {
        Ok(records) => records,
        Err(e) => {
            rollback_logged(conn).await;
            return Err(e);
        }
    };

    if let Err(e) = conn.commit().await {
        rollback_logged(conn).await;
        return Err(e);
    }

    Ok(records)
}

// ============================================================================
// Resources
// ============================================================================

/// List base tables as resources. Failures degrade to an empty listing so
/// resource discovery never hard-errors a session.
pub async fn list_table_resources(
    registry: &DbRegistry,
    driver: &dyn Driver,
    db_key: Option<&str>,
) -> Vec<TableResource> {
    match list_tables(registry, driver, db_key).await {
        Ok(tables) => tables
            .iter()
            .map(|table| TableResource::for_table(table))
            .collect(),
        Err(e) => {
            tracing::error!(db_key = ?db_key, "failed to list resources: {e}");
            Vec::new()
        }
    }
}

async fn list_tables(
    registry: &DbRegistry,
    driver: &dyn Driver,
    db_key: Option<&str>,
) -> DbResult<Vec<String>> {
    let descriptor = registry.resolve(db_key)?;
    let mut conn = driver.connect(descriptor).await?;
    let result = conn.query(LIST_TABLES_QUERY, &[]).await;
    conn.close().await;
    Ok(first_column(&result?))
}

/// Read the top rows of one table addressed as `mssql://<table>/data`,
/// as delimited text.
pub async fn read_table_resource(
    registry: &DbRegistry,
    driver: &dyn Driver,
    uri: &str,
    db_key: Option<&str>,
) -> DbResult<String> {
    let table = parse_table_uri(uri)?;
    let descriptor = registry.resolve(db_key)?;

    let mut conn = driver.connect(descriptor).await?;
    // Identifiers cannot be bound as parameters; the name is validated to a
    // plain identifier above and bracket-quoted here.
    let query = format!("SELECT TOP {RESOURCE_ROW_LIMIT} * FROM [{table}]");
    let result = conn.query(&query, &[]).await;
    conn.close().await;

    match result {
        Ok(records) => Ok(normalize::to_delimited_text(&records)),
        Err(e) => {
            tracing::error!(uri = %uri, "failed to read resource: {e}");
            Err(e)
        }
    }
}

fn parse_table_uri(uri: &str) -> DbResult<String> {
    let Some(rest) = uri.strip_prefix(RESOURCE_SCHEME) else {
        return Err(DbError::Validation(format!("Invalid URI scheme: {uri}")));
    };

    let table = rest.split('/').next().unwrap_or_default();
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#' | '@'));
    if !valid {
        return Err(DbError::Validation(format!(
            "Invalid table name in URI: {uri}"
        )));
    }

    Ok(table.to_string())
}

// ============================================================================
// list_databases
// ============================================================================

/// Enumerate configured databases with credentials masked.
pub fn list_databases(registry: &DbRegistry) -> DatabaseListing {
    let configurations: BTreeMap<_, _> = registry
        .iter()
        .map(|(key, descriptor)| (key.to_string(), descriptor.masked()))
        .collect();

    DatabaseListing {
        available_databases: registry.keys().map(str::to_string).collect(),
        configurations,
        count: registry.len(),
        default_database: registry.default_key().to_string(),
    }
}
