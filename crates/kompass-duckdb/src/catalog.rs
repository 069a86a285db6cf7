//! Catalog introspection over `information_schema` and the DuckDB table
//! functions. Everything here runs inside an already-held connection lock.

use std::collections::HashSet;

use duckdb::Connection;
use kompass_core::error::QueryError;
use kompass_core::table::{ColumnInfo, TableRef};

use crate::backend::storage;
use crate::ident::{safe_ident, SafeIdent};

/// List base tables in the browsable schemas, ordered by name per schema.
pub(crate) fn list_tables(
    conn: &Connection,
    allow_list: &[String],
) -> Result<Vec<TableRef>, QueryError> {
    let mut out = Vec::new();
    for raw in allow_list {
        let schema = safe_ident(raw)?;
        let mut stmt = conn
            .prepare(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = ?1 AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map(duckdb::params![schema.as_str()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(storage)?;
        for name in rows {
            out.push(TableRef::new(schema.as_str(), &name.map_err(storage)?));
        }
    }
    Ok(out)
}

/// Introspect a table's column descriptors in ordinal order.
///
/// An empty result means the table does not exist in that schema; that is
/// reported the same way as a disallowed schema so probing requests cannot
/// tell the two apart.
pub(crate) fn table_columns(
    conn: &Connection,
    schema: &SafeIdent,
    table: &SafeIdent,
) -> Result<Vec<ColumnInfo>, QueryError> {
    let pk_columns: HashSet<String> = {
        let mut stmt = conn
            .prepare(
                "SELECT unnest(constraint_column_names) FROM duckdb_constraints() \
                 WHERE schema_name = ?1 AND table_name = ?2 \
                 AND constraint_type = 'PRIMARY KEY'",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map(duckdb::params![schema.as_str(), table.as_str()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(storage)?;
        let mut set = HashSet::new();
        for name in rows {
            set.insert(name.map_err(storage)?);
        }
        set
    };

    let mut stmt = conn
        .prepare(
            "SELECT column_name, data_type, is_nullable, ordinal_position \
             FROM information_schema.columns \
             WHERE table_schema = ?1 AND table_name = ?2 \
             ORDER BY ordinal_position",
        )
        .map_err(storage)?;
    let rows = stmt
        .query_map(duckdb::params![schema.as_str(), table.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })
        .map_err(storage)?;

    let mut columns = Vec::new();
    for row in rows {
        let (name, data_type, is_nullable, position) = row.map_err(storage)?;
        let is_primary_key = pk_columns.contains(&name);
        columns.push(ColumnInfo {
            name,
            data_type,
            nullable: is_nullable == "YES",
            position,
            is_primary_key,
        });
    }

    if columns.is_empty() {
        return Err(QueryError::TableNotAllowed(format!(
            "{}.{}",
            schema.as_str(),
            table.as_str()
        )));
    }
    Ok(columns)
}

/// Planner estimate of a table's row count, without scanning it.
pub(crate) fn estimated_size(
    conn: &Connection,
    schema: &SafeIdent,
    table: &SafeIdent,
) -> Result<i64, QueryError> {
    let mut stmt = conn
        .prepare(
            "SELECT estimated_size FROM duckdb_tables() \
             WHERE schema_name = ?1 AND table_name = ?2",
        )
        .map_err(storage)?;
    let mut rows = stmt
        .query_map(duckdb::params![schema.as_str(), table.as_str()], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(storage)?;
    match rows.next() {
        Some(size) => size.map_err(storage),
        None => Ok(0),
    }
}
