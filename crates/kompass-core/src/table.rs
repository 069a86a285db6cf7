use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Interactive page size ceiling for the table browser.
pub const MAX_PAGE_LIMIT: i64 = 200;

/// Absolute row ceiling for CSV/JSON exports, regardless of the requested cap.
pub const EXPORT_HARD_CAP: i64 = 10_000;

/// Row ceiling for the read-only query endpoint.
pub const QUERY_ROW_CAP: usize = 200;

/// A browsable relation. Both parts must pass the identifier sanitizer
/// before they ever reach SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// One introspected column of a browsable table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub position: i64,
    pub is_primary_key: bool,
}

impl ColumnInfo {
    /// JSON-typed columns are the only ones eligible for path filtering and sorting.
    pub fn is_json(&self) -> bool {
        self.data_type.to_ascii_lowercase().contains("json")
    }
}

/// The fixed comparison operator set for filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
    ILike,
}

impl Operator {
    /// Parse a wire token. Anything outside the fixed set is `UnsupportedOperator`;
    /// the word operators are matched case-insensitively.
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        match raw {
            "=" => return Ok(Self::Eq),
            "<>" => return Ok(Self::Ne),
            "<" => return Ok(Self::Lt),
            ">" => return Ok(Self::Gt),
            "<=" => return Ok(Self::Le),
            ">=" => return Ok(Self::Ge),
            _ => {}
        }
        if raw.eq_ignore_ascii_case("like") {
            Ok(Self::Like)
        } else if raw.eq_ignore_ascii_case("ilike") {
            Ok(Self::ILike)
        } else {
            Err(QueryError::UnsupportedOperator(raw.to_string()))
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
        }
    }
}

/// A user-supplied filter condition: plain column, or a path inside a JSON
/// column. Arrives as a JSON-encoded array on the wire, so only the variants'
/// field sets distinguish them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    Json(JsonFilter),
    Plain(PlainFilter),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlainFilter {
    pub col: String,
    pub op: String,
    pub val: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonFilter {
    pub json_base: String,
    pub json_path: Vec<String>,
    /// Text extraction compares the path value as a string (serves LIKE and
    /// ILIKE); typed extraction compares numerically.
    #[serde(default)]
    pub text: bool,
    pub op: String,
    pub val: String,
}

/// Requested row ordering. Plain `sort_by` wins over the JSON sort when both
/// are present; with neither the reader falls back to a deterministic order.
#[derive(Debug, Clone)]
pub struct SortSpec {
    pub sort_by: Option<String>,
    pub sort_dir: String,
    pub sort_json_base: Option<String>,
    /// Dot-separated path into `sort_json_base`, e.g. "meta.priority".
    pub sort_json_path: Option<String>,
    pub sort_json_text: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            sort_by: None,
            sort_dir: "asc".to_string(),
            sort_json_base: None,
            sort_json_path: None,
            sort_json_text: false,
        }
    }
}

/// One bounded page request against a browsable table.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub limit: i64,
    pub offset: i64,
    pub filters: Vec<FilterSpec>,
    pub sort: SortSpec,
}

/// One page of rows. `total` serializes as null when counting was skipped for
/// cost; the UI then pages on row count alone.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Value>,
    pub limit: i64,
    pub offset: i64,
    pub total: Option<i64>,
}

/// Result of an accepted read-only query. `truncated` is set when the row cap
/// cut the result short.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Value>,
    pub truncated: bool,
}

/// Storage health snapshot for the admin dashboard. `version` is the engine's
/// own version string.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStatus {
    pub version: String,
    pub services_count: i64,
    pub services_last_updated: Option<String>,
}
