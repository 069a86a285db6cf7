//! Identifier sanitizer: the only gate through which schema, table, and
//! column names may reach SQL text.
//!
//! Values never travel this path; they are always bound parameters. The split
//! is what keeps the dynamic browser queries injection-free: identifiers are
//! pattern-checked and quoted, everything else is a `?`.

use kompass_core::error::QueryError;
use kompass_core::table::TableRef;

/// Relational identifier length limit.
const MAX_IDENT_LEN: usize = 63;

/// An identifier that has passed [`safe_ident`]. Constructible only through
/// the sanitizer, so holding one is proof the string is safe to interpolate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeIdent(String);

impl SafeIdent {
    /// The raw identifier, e.g. for binding as a catalog-query parameter.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for interpolation into SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl std::fmt::Display for SafeIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate one identifier: `^[A-Za-z_][A-Za-z0-9_]*$`, at most 63 chars.
pub fn safe_ident(raw: &str) -> Result<SafeIdent, QueryError> {
    if raw.is_empty() || raw.len() > MAX_IDENT_LEN {
        return Err(QueryError::InvalidIdentifier(raw.to_string()));
    }
    let mut chars = raw.chars();
    let ok_first = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !ok_first || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(QueryError::InvalidIdentifier(raw.to_string()));
    }
    Ok(SafeIdent(raw.to_string()))
}

/// Validate a schema name and check it against the allow-list. Schemas
/// outside the list (system catalogs included) are not browsable.
pub fn allowed_schema(raw: &str, allow_list: &[String]) -> Result<SafeIdent, QueryError> {
    let ident = safe_ident(raw)?;
    if !allow_list.iter().any(|s| s == ident.as_str()) {
        return Err(QueryError::TableNotAllowed(format!(
            "schema {} is not browsable",
            ident.as_str()
        )));
    }
    Ok(ident)
}

/// Validate both halves of a table reference in one step.
pub fn safe_table(table: &TableRef, allow_list: &[String]) -> Result<(SafeIdent, SafeIdent), QueryError> {
    let schema = allowed_schema(&table.schema, allow_list)?;
    let name = safe_ident(&table.name)?;
    Ok((schema, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow() -> Vec<String> {
        vec!["public".to_string()]
    }

    #[test]
    fn accepts_plain_identifiers() {
        for raw in ["services", "updated_at", "_private", "Col9", "a"] {
            let ident = safe_ident(raw).expect("valid identifier");
            assert_eq!(ident.as_str(), raw);
        }
    }

    #[test]
    fn quoted_form_wraps_in_double_quotes() {
        let ident = safe_ident("updated_at").expect("valid identifier");
        assert_eq!(ident.quoted(), "\"updated_at\"");
    }

    #[test]
    fn rejects_injection_shaped_input() {
        for raw in [
            "",
            "1col",
            "col name",
            "col-name",
            "col\"name",
            "col;drop table x",
            "col'--",
            "sch.tbl",
            "tab\tname",
            "naïve",
        ] {
            assert!(
                matches!(safe_ident(raw), Err(QueryError::InvalidIdentifier(_))),
                "{raw:?} must be rejected"
            );
        }
    }

    #[test]
    fn rejects_overlong_identifiers() {
        let raw = "a".repeat(64);
        assert!(matches!(
            safe_ident(&raw),
            Err(QueryError::InvalidIdentifier(_))
        ));
        assert!(safe_ident(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn schema_allow_list_is_enforced() {
        assert!(allowed_schema("public", &allow()).is_ok());
        for raw in ["information_schema", "main", "pg_catalog"] {
            assert!(
                matches!(
                    allowed_schema(raw, &allow()),
                    Err(QueryError::TableNotAllowed(_))
                ),
                "{raw} must not be browsable"
            );
        }
        // Bad pattern still fails as an identifier, not as a membership miss.
        assert!(matches!(
            allowed_schema("pub lic", &allow()),
            Err(QueryError::InvalidIdentifier(_))
        ));
    }
}
