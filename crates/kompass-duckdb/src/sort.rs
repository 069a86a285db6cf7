//! Sort compiler: a sort descriptor → a validated ORDER BY fragment.

use kompass_core::error::QueryError;
use kompass_core::table::{ColumnInfo, SortSpec};

use crate::filter::{json_extract_expr, json_path_literal, resolve_column, resolve_json_column};
use crate::ident::safe_ident;

fn parse_direction(raw: &str) -> Result<&'static str, QueryError> {
    match raw.to_ascii_lowercase().as_str() {
        "asc" => Ok("ASC"),
        "desc" => Ok("DESC"),
        _ => Err(QueryError::InvalidSortDirection(raw.to_string())),
    }
}

/// Compile a sort descriptor against a table's introspected columns.
///
/// Precedence: explicit column sort, then JSON path sort, then the stable
/// fallback (primary key column, else first column by ordinal position,
/// ascending). The fallback keeps pagination deterministic even when the
/// caller sends no sort at all.
pub fn compile_sort(columns: &[ColumnInfo], sort: &SortSpec) -> Result<String, QueryError> {
    let dir = parse_direction(&sort.sort_dir)?;

    if let Some(by) = sort.sort_by.as_deref().filter(|s| !s.is_empty()) {
        let (_, ident) = resolve_column(columns, by)?;
        return Ok(format!("ORDER BY {} {}", ident.quoted(), dir));
    }

    if let Some(base) = sort.sort_json_base.as_deref().filter(|s| !s.is_empty()) {
        let ident = resolve_json_column(columns, base)?;
        let segments: Vec<String> = sort
            .sort_json_path
            .as_deref()
            .unwrap_or("")
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            // A base without a path degenerates to sorting the column itself.
            return Ok(format!("ORDER BY {} {}", ident.quoted(), dir));
        }
        let path = json_path_literal(&segments)?;
        let expr = json_extract_expr(&ident, &path, sort.sort_json_text);
        return Ok(format!("ORDER BY {expr} {dir}"));
    }

    let fallback = columns
        .iter()
        .find(|c| c.is_primary_key)
        .or_else(|| columns.iter().min_by_key(|c| c.position));
    match fallback {
        Some(col) => {
            let ident = safe_ident(&col.name)?;
            Ok(format!("ORDER BY {} ASC", ident.quoted()))
        }
        None => Ok(String::new()),
    }
}
