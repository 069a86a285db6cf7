use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use kompass_core::table::{
    DbStatus, FilterSpec, PageRequest, PageResult, QueryOutput, SortSpec, TableRef,
    EXPORT_HARD_CAP, MAX_PAGE_LIMIT,
};

use crate::{error::AppError, state::AppState};

/// `GET /api/admin/db/status`: engine version plus a content freshness
/// snapshot for the dashboard header.
#[tracing::instrument(skip(state))]
pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<DbStatus>, AppError> {
    let status = state.db.db_status().await.map_err(AppError::Internal)?;
    Ok(Json(status))
}

/// `GET /api/admin/db/tables`: base tables in the browsable schemas.
#[tracing::instrument(skip(state))]
pub async fn tables(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tables = state.db.list_tables(&state.config.schema_allow_list).await?;
    Ok(Json(json!({ "tables": tables })))
}

#[derive(Debug, Deserialize)]
pub struct TableQuery {
    pub schema: String,
    pub table: String,
}

/// `GET /api/admin/db/table-schema`: column descriptors for one table, in
/// ordinal order. The UI uses these to validate filters client-side and to
/// offer JSON path filtering on JSON-typed columns.
#[tracing::instrument(skip(state))]
pub async fn table_schema(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TableQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let table = TableRef::new(&q.schema, &q.table);
    let columns = state
        .db
        .table_columns(&table, &state.config.schema_allow_list)
        .await?;
    Ok(Json(json!({ "columns": columns })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowsQuery {
    pub schema: String,
    pub table: String,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub sort_json_base: Option<String>,
    pub sort_json_path: Option<String>,
    pub sort_json_text: Option<bool>,
    /// JSON-encoded array of filter objects.
    pub filters: Option<String>,
}

/// `GET /api/admin/db/table-rows`: one filtered, sorted page.
///
/// `limit` is clamped into `[1, 200]` here so browser callers cannot trip the
/// reader's own range check; direct library callers still get
/// `InvalidPageSize` from the reader.
#[tracing::instrument(skip(state))]
pub async fn table_rows(
    State(state): State<Arc<AppState>>,
    Query(q): Query<RowsQuery>,
) -> Result<Json<PageResult>, AppError> {
    let req = PageRequest {
        limit: q.limit.unwrap_or(50).clamp(1, MAX_PAGE_LIMIT),
        offset: q.offset.unwrap_or(0).max(0),
        filters: parse_filters(q.filters.as_deref())?,
        sort: sort_spec(
            &q.sort_by,
            &q.sort_dir,
            &q.sort_json_base,
            &q.sort_json_path,
            q.sort_json_text,
        ),
    };
    let table = TableRef::new(&q.schema, &q.table);
    let page = state
        .db
        .read_page(
            &table,
            &req,
            &state.config.schema_allow_list,
            state.config.count_threshold,
        )
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct SqlBody {
    pub sql: String,
}

/// `POST /api/admin/db/query`: run one read-only statement through the gate.
///
/// Rejections come back as 400 with the human-readable reason; accepted
/// queries are capped at 200 rows and flag `truncated` when the cap bit.
#[tracing::instrument(skip(state, body))]
pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SqlBody>,
) -> Result<Json<QueryOutput>, AppError> {
    let output = state.db.run_query(&body.sql).await?;
    Ok(Json(output))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    pub schema: String,
    pub table: String,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub sort_json_base: Option<String>,
    pub sort_json_path: Option<String>,
    pub sort_json_text: Option<bool>,
    pub filters: Option<String>,
    /// Requested row cap; clamped to the 10 000 hard cap.
    pub cap: Option<i64>,
}

/// `GET /api/admin/db/export-csv`: download the filtered table as CSV.
///
/// Caller mistakes (bad filters, unknown columns) are 4xx. A storage failure
/// instead degrades to an empty file flagged with `X-Export-Error: storage`,
/// so a wedged database never breaks the download flow mid-click.
#[tracing::instrument(skip(state))]
pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let (page, storage_failed) = run_export(&state, &q).await?;
    let filename = format!("{}-{}.csv", q.table, Utc::now().format("%Y%m%d"));
    let body = build_csv(&page).map_err(AppError::Internal)?;
    build_export_response(
        &filename,
        "text/csv; charset=utf-8",
        Bytes::from(body),
        storage_failed,
    )
}

/// `GET /api/admin/db/export-json`: the same rows as a pretty-printed JSON
/// array of row objects.
#[tracing::instrument(skip(state))]
pub async fn export_json(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let (page, storage_failed) = run_export(&state, &q).await?;
    let filename = format!("{}-{}.json", q.table, Utc::now().format("%Y%m%d"));
    let body = serde_json::to_vec_pretty(&page.rows)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("json export failed: {e}")))?;
    build_export_response(
        &filename,
        "application/json",
        Bytes::from(body),
        storage_failed,
    )
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_filters(raw: Option<&str>) -> Result<Vec<FilterSpec>, AppError> {
    match raw {
        Some(text) if !text.is_empty() => serde_json::from_str(text)
            .map_err(|e| AppError::BadRequest(format!("invalid filters parameter: {e}"))),
        _ => Ok(Vec::new()),
    }
}

fn sort_spec(
    sort_by: &Option<String>,
    sort_dir: &Option<String>,
    json_base: &Option<String>,
    json_path: &Option<String>,
    json_text: Option<bool>,
) -> SortSpec {
    SortSpec {
        sort_by: sort_by.clone(),
        sort_dir: sort_dir.clone().unwrap_or_else(|| "asc".to_string()),
        sort_json_base: json_base.clone(),
        sort_json_path: json_path.clone(),
        sort_json_text: json_text.unwrap_or(false),
    }
}

/// Run the export read. Returns the page plus a flag marking the degraded
/// empty-file path taken on storage failure.
async fn run_export(
    state: &AppState,
    q: &ExportQuery,
) -> Result<(PageResult, bool), AppError> {
    let cap = q.cap.unwrap_or(EXPORT_HARD_CAP).clamp(1, EXPORT_HARD_CAP);
    let req = PageRequest {
        limit: cap,
        offset: 0,
        filters: parse_filters(q.filters.as_deref())?,
        sort: sort_spec(
            &q.sort_by,
            &q.sort_dir,
            &q.sort_json_base,
            &q.sort_json_path,
            q.sort_json_text,
        ),
    };
    let table = TableRef::new(&q.schema, &q.table);
    match state
        .db
        .export_page(&table, &req, &state.config.schema_allow_list)
        .await
    {
        Ok(page) => Ok((page, false)),
        Err(e) if !e.is_caller_error() => {
            tracing::error!(table = %table, error = %e, "Export query failed, sending empty file");
            let empty = PageResult {
                columns: Vec::new(),
                rows: Vec::new(),
                limit: cap,
                offset: 0,
                total: None,
            };
            Ok((empty, true))
        }
        Err(e) => Err(e.into()),
    }
}

/// Sanitize a CSV field value against formula injection.
///
/// Spreadsheet apps (Excel, Google Sheets, LibreOffice) interpret values that
/// begin with `=`, `+`, `-`, `@`, TAB, or CR as formula expressions. Prepending
/// a single quote (`'`) causes them to treat the value as a literal string.
fn sanitize_csv_field(val: &str) -> std::borrow::Cow<'_, str> {
    if val.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        std::borrow::Cow::Owned(format!("'{val}"))
    } else {
        std::borrow::Cow::Borrowed(val)
    }
}

/// Stringify one row cell for CSV. Nulls become empty fields, strings pass
/// through, everything else (numbers, booleans, nested JSON) keeps its JSON
/// text form.
fn cell_text(cell: &serde_json::Value) -> String {
    match cell {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn build_csv(page: &PageResult) -> anyhow::Result<Vec<u8>> {
    let mut wtr =
        csv::Writer::from_writer(Vec::with_capacity(page.rows.len().saturating_mul(128)));

    wtr.write_record(&page.columns)
        .map_err(|e| anyhow::anyhow!("csv write_record failed: {e}"))?;

    for row in &page.rows {
        let record: Vec<String> = page
            .columns
            .iter()
            .map(|col| {
                let text = cell_text(row.get(col).unwrap_or(&serde_json::Value::Null));
                sanitize_csv_field(&text).into_owned()
            })
            .collect();
        wtr.write_record(&record)
            .map_err(|e| anyhow::anyhow!("csv write_record failed: {e}"))?;
    }

    wtr.into_inner()
        .map_err(|e| anyhow::anyhow!("csv flush failed: {e}"))
}

fn build_export_response(
    filename: &str,
    content_type: &str,
    body: Bytes,
    storage_failed: bool,
) -> Result<Response, AppError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        );
    if storage_failed {
        builder = builder.header("x-export-error", "storage");
    }
    builder
        .body(Body::from(body))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("response build failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_fields_with_formula_prefixes_get_quoted() {
        assert_eq!(sanitize_csv_field("=SUM(A1)"), "'=SUM(A1)");
        assert_eq!(sanitize_csv_field("+49 170 000"), "'+49 170 000");
        assert_eq!(sanitize_csv_field("-1"), "'-1");
        assert_eq!(sanitize_csv_field("@handle"), "'@handle");
        assert_eq!(sanitize_csv_field("\tindent"), "'\tindent");
        assert_eq!(sanitize_csv_field("plain"), "plain");
        assert_eq!(sanitize_csv_field(""), "");
    }

    #[test]
    fn cell_text_keeps_json_shapes() {
        assert_eq!(cell_text(&serde_json::Value::Null), "");
        assert_eq!(cell_text(&serde_json::json!("text")), "text");
        assert_eq!(cell_text(&serde_json::json!(42)), "42");
        assert_eq!(cell_text(&serde_json::json!(true)), "true");
        assert_eq!(
            cell_text(&serde_json::json!({"level": "ad"})),
            r#"{"level":"ad"}"#
        );
    }

    #[test]
    fn csv_rows_follow_column_order_and_escape_quotes() {
        let page = PageResult {
            columns: vec!["id".to_string(), "title".to_string()],
            rows: vec![serde_json::json!({
                "title": "Say \"hello\"",
                "id": "s1"
            })],
            limit: 10,
            offset: 0,
            total: Some(1),
        };
        let bytes = build_csv(&page).expect("csv");
        let text = String::from_utf8(bytes).expect("utf8");
        assert_eq!(text, "id,title\ns1,\"Say \"\"hello\"\"\"\n");
    }

    #[test]
    fn export_responses_flag_storage_failures() {
        let ok = build_export_response(
            "services.csv",
            "text/csv; charset=utf-8",
            Bytes::from_static(b"id\n"),
            false,
        )
        .expect("response");
        assert!(ok.headers().get("x-export-error").is_none());

        let failed =
            build_export_response("services.csv", "text/csv; charset=utf-8", Bytes::new(), true)
                .expect("response");
        assert_eq!(
            failed
                .headers()
                .get("x-export-error")
                .and_then(|v| v.to_str().ok()),
            Some("storage")
        );
    }
}
