//! Read-only gate for the admin SQL console.
//!
//! The gate never tries to fully parse SQL. It blanks out string literals,
//! quoted identifiers, and comments, then applies three cheap rules to the
//! remaining skeleton: single statement only, must start with SELECT or WITH,
//! and no write/DDL/session keyword anywhere. Anything ambiguous is rejected;
//! a false reject costs one retyped query, a false accept costs the database.

use duckdb::types::Value;
use duckdb::Connection;
use kompass_core::error::QueryError;
use kompass_core::table::QueryOutput;

use crate::backend::storage;
use crate::reader::decode_value;

const DENIED_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "merge", "create", "alter", "drop", "truncate", "grant",
    "revoke", "copy", "export", "import", "attach", "detach", "install", "load", "call",
    "pragma", "set", "reset", "vacuum", "checkpoint", "begin", "commit", "rollback", "abort",
    "transaction", "prepare", "execute", "deallocate", "use",
];

/// Replace the contents of string literals, quoted identifiers, and comments
/// with spaces, preserving character positions. Keyword scanning then cannot
/// be fooled by `SELECT 'drop table x'` and friends.
fn skeleton(sql: &str) -> Result<String, QueryError> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            quote @ ('\'' | '"') => {
                out.push(quote);
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == quote {
                        // Doubled quotes escape themselves.
                        if i + 1 < chars.len() && chars[i + 1] == quote {
                            out.push_str("  ");
                            i += 2;
                            continue;
                        }
                        out.push(quote);
                        i += 1;
                        closed = true;
                        break;
                    }
                    out.push(' ');
                    i += 1;
                }
                if !closed {
                    return Err(QueryError::QueryRejected(
                        "unterminated quoted section".to_string(),
                    ));
                }
            }
            '-' if i + 1 < chars.len() && chars[i + 1] == '-' => {
                while i < chars.len() && chars[i] != '\n' {
                    out.push(' ');
                    i += 1;
                }
            }
            '/' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                out.push_str("  ");
                i += 2;
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == '*' && i + 1 < chars.len() && chars[i + 1] == '/' {
                        out.push_str("  ");
                        i += 2;
                        closed = true;
                        break;
                    }
                    out.push(if chars[i] == '\n' { '\n' } else { ' ' });
                    i += 1;
                }
                if !closed {
                    return Err(QueryError::QueryRejected(
                        "unterminated block comment".to_string(),
                    ));
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn words(skel: &str) -> impl Iterator<Item = String> + '_ {
    skel.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Validate that `sql` is a single read-only statement. Returns the statement
/// body with any trailing semicolon stripped, ready for wrapping.
pub(crate) fn validate_read_only(sql: &str) -> Result<String, QueryError> {
    let skel = skeleton(sql)?;
    let skel_chars: Vec<char> = skel.chars().collect();
    let orig_chars: Vec<char> = sql.chars().collect();

    // A semicolon may only be followed by blanks (which is where comments
    // ended up). Anything else means a second statement.
    let body_len = match skel_chars.iter().position(|&c| c == ';') {
        Some(p) => {
            if skel_chars[p + 1..].iter().any(|c| !c.is_whitespace()) {
                return Err(QueryError::QueryRejected(
                    "multiple statements are not allowed".to_string(),
                ));
            }
            p
        }
        None => skel_chars.len(),
    };

    let skel_body: String = skel_chars[..body_len].iter().collect();
    let body: String = orig_chars[..body_len].iter().collect();
    let body = body.trim().to_string();
    if body.is_empty() {
        return Err(QueryError::QueryRejected("empty query".to_string()));
    }

    match words(&skel_body).next().as_deref() {
        Some("select") | Some("with") => {}
        _ => {
            return Err(QueryError::QueryRejected(
                "only SELECT queries are allowed".to_string(),
            ));
        }
    }

    for word in words(&skel_body) {
        if DENIED_KEYWORDS.contains(&word.as_str()) {
            return Err(QueryError::QueryRejected(format!(
                "keyword {word} is not allowed"
            )));
        }
    }

    Ok(body)
}

/// Run a validated read-only query with a hard row cap.
///
/// The body is wrapped in a subselect so the cap applies even when the query
/// carries its own LIMIT; the wrapping newlines keep a trailing line comment
/// from eating the closing parenthesis. One row beyond the cap is requested
/// to distinguish a full page from a truncated one.
pub(crate) fn run_query(
    conn: &Connection,
    sql: &str,
    cap: usize,
) -> Result<QueryOutput, QueryError> {
    let body = validate_read_only(sql)?;
    let wrapped = format!("SELECT * FROM (\n{body}\n) AS q LIMIT {}", cap + 1);

    // Parse and bind errors on a healthy connection are the caller's SQL.
    let mut stmt = conn
        .prepare(&wrapped)
        .map_err(|e| QueryError::QueryRejected(e.to_string()))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| QueryError::QueryRejected(e.to_string()))?;

    let columns: Vec<String> = rows
        .as_ref()
        .map(|s| s.column_names())
        .unwrap_or_default();

    let mut out_rows: Vec<serde_json::Value> = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next().map_err(storage)? {
        if out_rows.len() == cap {
            truncated = true;
            break;
        }
        let mut obj = serde_json::Map::new();
        for (i, name) in columns.iter().enumerate() {
            let value = row.get::<_, Value>(i).map_err(storage)?;
            obj.insert(name.clone(), decode_value(value, false));
        }
        out_rows.push(serde_json::Value::Object(obj));
    }

    Ok(QueryOutput {
        columns,
        rows: out_rows,
        truncated,
    })
}
