//! Filter compiler: structured filter descriptors → a parameterized WHERE
//! clause. Column names are resolved against the introspected descriptor set
//! and pass the identifier sanitizer; values only ever become `?N` bindings.

use kompass_core::error::QueryError;
use kompass_core::table::{ColumnInfo, FilterSpec, Operator};

use crate::ident::{safe_ident, SafeIdent};

/// Compiled WHERE clause plus its positional parameters.
///
/// `where_sql` is empty for an empty filter list, otherwise a full
/// `WHERE c1 AND c2 ...` fragment. Parameters are numbered from `?1` in
/// clause order, so the same vector can back both the page query and the
/// count query.
#[derive(Debug, Clone, Default)]
pub struct FilterSql {
    pub where_sql: String,
    pub params: Vec<String>,
}

/// Resolve a referenced column against the introspected set.
pub(crate) fn resolve_column<'a>(
    columns: &'a [ColumnInfo],
    name: &str,
) -> Result<(&'a ColumnInfo, SafeIdent), QueryError> {
    let col = columns
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| QueryError::UnknownColumn(name.to_string()))?;
    let ident = safe_ident(&col.name)?;
    Ok((col, ident))
}

/// Like [`resolve_column`], but additionally require a JSON-typed column.
/// Only those are eligible for path-based filtering and sorting.
pub(crate) fn resolve_json_column(
    columns: &[ColumnInfo],
    name: &str,
) -> Result<SafeIdent, QueryError> {
    let (col, ident) = resolve_column(columns, name)?;
    if !col.is_json() {
        return Err(QueryError::UnknownColumn(format!(
            "{name} is not a JSON column"
        )));
    }
    Ok(ident)
}

/// Validate path segments and render the DuckDB JSON path literal `'$.a.b'`.
///
/// Segments carry plain object keys only; anything that could alter the path
/// syntax (quotes, dots, brackets, wildcards) is rejected, so the literal can
/// be embedded directly while values stay parameterized.
pub(crate) fn json_path_literal(segments: &[String]) -> Result<String, QueryError> {
    if segments.is_empty() {
        return Err(QueryError::InvalidIdentifier("empty JSON path".to_string()));
    }
    for seg in segments {
        let ok = !seg.is_empty()
            && seg.len() <= 63
            && seg
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !ok {
            return Err(QueryError::InvalidIdentifier(format!(
                "JSON path segment {seg:?}"
            )));
        }
    }
    Ok(format!("$.{}", segments.join(".")))
}

/// Render the extraction expression for a JSON path.
///
/// Text mode compares the extracted value as VARCHAR; typed mode compares
/// numerically via TRY_CAST so non-numeric values become NULL instead of
/// erroring mid-scan.
pub(crate) fn json_extract_expr(base: &SafeIdent, path_literal: &str, text: bool) -> String {
    if text {
        format!("json_extract_string({}, '{}')", base.quoted(), path_literal)
    } else {
        format!(
            "TRY_CAST(json_extract_string({}, '{}') AS DOUBLE)",
            base.quoted(),
            path_literal
        )
    }
}

/// Compile an ordered filter list against a table's introspected columns.
///
/// Fails before emitting any SQL: a single bad descriptor aborts the whole
/// request rather than silently dropping the clause.
pub fn compile_filters(
    columns: &[ColumnInfo],
    filters: &[FilterSpec],
) -> Result<FilterSql, QueryError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<String> = Vec::new();
    let mut param_idx = 1;

    for spec in filters {
        match spec {
            FilterSpec::Plain(f) => {
                let (_, ident) = resolve_column(columns, &f.col)?;
                let op = Operator::parse(&f.op)?;
                clauses.push(format!("{} {} ?{}", ident.quoted(), op.sql(), param_idx));
                params.push(f.val.clone());
                param_idx += 1;
            }
            FilterSpec::Json(f) => {
                let ident = resolve_json_column(columns, &f.json_base)?;
                let op = Operator::parse(&f.op)?;
                let path = json_path_literal(&f.json_path)?;
                // LIKE/ILIKE are inherently textual; honor them in text mode
                // even when the descriptor asked for typed extraction.
                let text = f.text || matches!(op, Operator::Like | Operator::ILike);
                let expr = json_extract_expr(&ident, &path, text);
                if text {
                    clauses.push(format!("{} {} ?{}", expr, op.sql(), param_idx));
                } else {
                    clauses.push(format!(
                        "{} {} TRY_CAST(?{} AS DOUBLE)",
                        expr,
                        op.sql(),
                        param_idx
                    ));
                }
                params.push(f.val.clone());
                param_idx += 1;
            }
        }
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    Ok(FilterSql { where_sql, params })
}
