//! Column metadata resolution
//!
//! Resolves the ordered (name, declared type) schema of a table once per
//! append session, before any row is coerced. The snapshot is immutable for
//! the life of the session.

use duckdb::Connection;
use tracing::debug;

use crate::error::DuckGateError;

/// One column of the target table, ordered by ordinal position
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    pub name: String,
    /// Declared type as reported by the catalog, e.g. "BIGINT", "DATE",
    /// "TIMESTAMP WITH TIME ZONE"
    pub declared_type: String,
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Fetch the ordered column metadata for a fully-qualified table.
pub fn resolve_column_metadata(
    conn: &Connection,
    database: &str,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnMetadata>, DuckGateError> {
    let query = format!(
        "SELECT column_name, data_type
         FROM information_schema.columns
         WHERE table_catalog = '{}' AND table_schema = '{}' AND table_name = '{}'
         ORDER BY ordinal_position",
        escape_literal(database),
        escape_literal(schema),
        escape_literal(table)
    );

    let mut stmt = conn.prepare(&query)?;
    let mut rows = stmt.query([])?;

    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(ColumnMetadata {
            name: row.get(0)?,
            declared_type: row.get(1)?,
        });
    }

    debug!(
        "resolved {} columns for {}.{}.{}",
        columns.len(),
        database,
        schema,
        table
    );

    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_named_db(dir: &TempDir, name: &str) -> Connection {
        Connection::open(dir.path().join(format!("{name}.db"))).unwrap()
    }

    #[test]
    fn test_resolves_ordered_columns() {
        let dir = TempDir::new().unwrap();
        let conn = open_named_db(&dir, "orders");
        conn.execute_batch(
            "CREATE TABLE events (id BIGINT, label VARCHAR, happened_on DATE, \"at\" TIMESTAMP)",
        )
        .unwrap();

        let columns = resolve_column_metadata(&conn, "orders", "main", "events").unwrap();

        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[0].declared_type, "BIGINT");
        assert_eq!(columns[2].name, "happened_on");
        assert_eq!(columns[2].declared_type, "DATE");
        assert_eq!(columns[3].declared_type, "TIMESTAMP");
    }

    #[test]
    fn test_unknown_table_resolves_empty() {
        let dir = TempDir::new().unwrap();
        let conn = open_named_db(&dir, "orders");

        let columns = resolve_column_metadata(&conn, "orders", "main", "missing").unwrap();
        assert!(columns.is_empty());
    }

    #[test]
    fn test_quoted_identifiers_are_escaped() {
        let dir = TempDir::new().unwrap();
        let conn = open_named_db(&dir, "orders");

        // Must not be an injection vector; just resolves nothing.
        let columns =
            resolve_column_metadata(&conn, "orders", "main", "x' OR '1'='1").unwrap();
        assert!(columns.is_empty());
    }
}
