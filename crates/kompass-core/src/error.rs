use thiserror::Error;

/// Errors produced by the dynamic query layer.
///
/// Every variant except `StorageUnavailable` is a caller mistake: the admin
/// sent a filter, sort, identifier, or SQL string the layer refuses to turn
/// into a query. Those carry a descriptive message so the operator can fix
/// their input. `StorageUnavailable` covers infrastructure failures; its
/// detail goes to the log, never to the response body.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("table not allowed: {0}")]
    TableNotAllowed(String),

    #[error("unknown column: {0:?}")]
    UnknownColumn(String),

    #[error("unsupported operator: {0:?}")]
    UnsupportedOperator(String),

    #[error("invalid sort direction: {0:?} (expected asc or desc)")]
    InvalidSortDirection(String),

    #[error("invalid page size: {0}")]
    InvalidPageSize(String),

    #[error("query rejected: {0}")]
    QueryRejected(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl QueryError {
    /// Stable machine-readable code for HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::TableNotAllowed(_) => "table_not_allowed",
            Self::UnknownColumn(_) => "unknown_column",
            Self::UnsupportedOperator(_) => "unsupported_operator",
            Self::InvalidSortDirection(_) => "invalid_sort_direction",
            Self::InvalidPageSize(_) => "invalid_page_size",
            Self::QueryRejected(_) => "query_rejected",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    /// True for input errors the caller can correct (mapped to 4xx).
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, Self::StorageUnavailable(_))
    }
}
