//! Generic table page reader: introspect, compile filters and sort, run one
//! bounded SELECT, and decode whatever DuckDB hands back into JSON rows.

use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, Value};
use duckdb::Connection;
use kompass_core::error::QueryError;
use kompass_core::table::{PageRequest, PageResult};

use crate::backend::storage;
use crate::catalog;
use crate::filter::compile_filters;
use crate::ident::{safe_ident, SafeIdent};
use crate::sort::compile_sort;

/// Read one page of a browsable table.
///
/// `limit` and `offset` are validated before any SQL is built and are
/// interpolated as plain integers; every filter value travels as a `?N`
/// binding. The total row count is only computed when `with_total` is set and
/// the planner's size estimate is at or below `count_threshold`, so large
/// tables never pay for a full count scan per page.
pub(crate) fn read_page(
    conn: &Connection,
    schema: &SafeIdent,
    table: &SafeIdent,
    req: &PageRequest,
    max_limit: i64,
    count_threshold: i64,
    with_total: bool,
) -> Result<PageResult, QueryError> {
    if req.limit < 1 || req.limit > max_limit {
        return Err(QueryError::InvalidPageSize(format!(
            "limit must be between 1 and {max_limit}"
        )));
    }
    if req.offset < 0 {
        return Err(QueryError::InvalidPageSize(
            "offset must be non-negative".to_string(),
        ));
    }

    let columns = catalog::table_columns(conn, schema, table)?;
    let filter = compile_filters(&columns, &req.filters)?;
    let order_by = compile_sort(&columns, &req.sort)?;

    let select_list = columns
        .iter()
        .map(|c| safe_ident(&c.name).map(|id| id.quoted()))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");

    let mut sql = format!(
        "SELECT {select_list} FROM {}.{}",
        schema.quoted(),
        table.quoted()
    );
    if !filter.where_sql.is_empty() {
        sql.push(' ');
        sql.push_str(&filter.where_sql);
    }
    if !order_by.is_empty() {
        sql.push(' ');
        sql.push_str(&order_by);
    }
    sql.push_str(&format!(" LIMIT {} OFFSET {}", req.limit, req.offset));

    let param_refs: Vec<&dyn duckdb::types::ToSql> = filter
        .params
        .iter()
        .map(|p| p as &dyn duckdb::types::ToSql)
        .collect();

    let json_cols: Vec<bool> = columns.iter().map(|c| c.is_json()).collect();
    let n_cols = columns.len();

    let mut stmt = conn.prepare(&sql).map_err(storage)?;
    let raw_rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            let mut vals = Vec::with_capacity(n_cols);
            for i in 0..n_cols {
                vals.push(row.get::<_, Value>(i)?);
            }
            Ok(vals)
        })
        .map_err(storage)?;

    let mut rows = Vec::new();
    for raw in raw_rows {
        let vals = raw.map_err(storage)?;
        let mut obj = serde_json::Map::new();
        for (i, val) in vals.into_iter().enumerate() {
            obj.insert(columns[i].name.clone(), decode_value(val, json_cols[i]));
        }
        rows.push(serde_json::Value::Object(obj));
    }

    let total = if with_total && catalog::estimated_size(conn, schema, table)? <= count_threshold {
        let count_sql = format!(
            "SELECT count(*) FROM {}.{} {}",
            schema.quoted(),
            table.quoted(),
            filter.where_sql
        );
        let n = conn
            .query_row(&count_sql, param_refs.as_slice(), |row| {
                row.get::<_, i64>(0)
            })
            .map_err(storage)?;
        Some(n)
    } else {
        None
    };

    Ok(PageResult {
        columns: columns.into_iter().map(|c| c.name).collect(),
        rows,
        limit: req.limit,
        offset: req.offset,
        total,
    })
}

fn unit_to_micros(unit: &TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

fn format_timestamp(unit: &TimeUnit, raw: i64) -> String {
    let us = unit_to_micros(unit, raw);
    let secs = us.div_euclid(1_000_000);
    let micros = us.rem_euclid(1_000_000);
    match DateTime::from_timestamp(secs, (micros * 1_000) as u32) {
        Some(ts) if micros == 0 => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        None => us.to_string(),
    }
}

fn format_date32(days: i32) -> String {
    // 1970-01-01 is day 719163 of the common era.
    match NaiveDate::from_num_days_from_ce_opt(days.saturating_add(719_163)) {
        Some(d) => d.format("%Y-%m-%d").to_string(),
        None => days.to_string(),
    }
}

fn format_time64(unit: &TimeUnit, raw: i64) -> String {
    let us = unit_to_micros(unit, raw);
    let secs = us.div_euclid(1_000_000);
    let micros = us.rem_euclid(1_000_000);
    let time = u32::try_from(secs)
        .ok()
        .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, (micros * 1_000) as u32));
    match time {
        Some(t) if micros == 0 => t.format("%H:%M:%S").to_string(),
        Some(t) => t.format("%H:%M:%S%.6f").to_string(),
        None => us.to_string(),
    }
}

/// Decode a DuckDB cell into JSON.
///
/// `json_typed` marks cells coming from JSON-typed columns, whose text is
/// parsed back into structured JSON (falling back to the raw string when it
/// does not parse). Arbitrary SELECTs can surface any engine type, so every
/// variant needs a rendering, however plain.
pub(crate) fn decode_value(value: Value, json_typed: bool) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(b),
        Value::TinyInt(v) => serde_json::Value::from(v),
        Value::SmallInt(v) => serde_json::Value::from(v),
        Value::Int(v) => serde_json::Value::from(v),
        Value::BigInt(v) => serde_json::Value::from(v),
        Value::HugeInt(v) => match i64::try_from(v) {
            Ok(n) => serde_json::Value::from(n),
            Err(_) => serde_json::Value::String(v.to_string()),
        },
        Value::UTinyInt(v) => serde_json::Value::from(v),
        Value::USmallInt(v) => serde_json::Value::from(v),
        Value::UInt(v) => serde_json::Value::from(v),
        Value::UBigInt(v) => serde_json::Value::from(v),
        Value::Float(v) => serde_json::Value::from(v),
        Value::Double(v) => serde_json::Value::from(v),
        Value::Decimal(d) => match d.to_string().parse::<f64>() {
            Ok(f) => serde_json::Value::from(f),
            Err(_) => serde_json::Value::String(d.to_string()),
        },
        Value::Timestamp(unit, raw) => serde_json::Value::String(format_timestamp(&unit, raw)),
        Value::Text(s) => {
            if json_typed {
                match serde_json::from_str(&s) {
                    Ok(parsed) => parsed,
                    Err(_) => serde_json::Value::String(s),
                }
            } else {
                serde_json::Value::String(s)
            }
        }
        Value::Blob(bytes) => serde_json::Value::String(hex::encode(bytes)),
        Value::Date32(days) => serde_json::Value::String(format_date32(days)),
        Value::Time64(unit, raw) => serde_json::Value::String(format_time64(&unit, raw)),
        Value::Interval {
            months,
            days,
            nanos,
        } => serde_json::Value::String(format!("{months} mons {days} days {nanos} ns")),
        Value::List(items) | Value::Array(items) => serde_json::Value::Array(
            items
                .into_iter()
                .map(|v| decode_value(v, false))
                .collect(),
        ),
        Value::Enum(s) => serde_json::Value::String(s),
        Value::Struct(fields) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in fields.keys().zip(fields.values()) {
                obj.insert(k.clone(), decode_value(v.clone(), false));
            }
            serde_json::Value::Object(obj)
        }
        Value::Map(entries) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in entries.keys().zip(entries.values()) {
                let key = match decode_value(k.clone(), false) {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                obj.insert(key, decode_value(v.clone(), false));
            }
            serde_json::Value::Object(obj)
        }
        // Unions and anything the engine grows later render as debug text
        // rather than failing the whole page.
        other => serde_json::Value::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::safe_ident;
    use crate::schema;
    use kompass_core::table::{FilterSpec, PlainFilter, SortSpec, MAX_PAGE_LIMIT};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(schema::MIGRATIONS_TABLE_SQL).unwrap();
        conn.execute_batch(&schema::init_sql("256MB")).unwrap();
        conn.execute_batch(
            "INSERT INTO public.services (id, title, slug, category, tags, position, published) VALUES \
             ('s1', 'KI-Strategie', 'ki-strategie', 'Beratung', '{\"level\": \"advanced\", \"depth\": 3}', 1, true), \
             ('s2', 'Plattform-Entwicklung', 'plattform-entwicklung', 'Entwicklung', '{\"level\": \"core\", \"depth\": 1}', 2, true), \
             ('s3', 'Architektur-Review', 'architektur-review', 'Beratung', NULL, 3, false)",
        )
        .unwrap();
        conn
    }

    fn idents() -> (SafeIdent, SafeIdent) {
        (safe_ident("public").unwrap(), safe_ident("services").unwrap())
    }

    #[test]
    fn rejects_out_of_range_limit_and_offset() {
        let conn = test_conn();
        let (schema, table) = idents();
        for req in [
            PageRequest {
                limit: 0,
                ..PageRequest::default()
            },
            PageRequest {
                limit: MAX_PAGE_LIMIT + 1,
                ..PageRequest::default()
            },
            PageRequest {
                offset: -1,
                ..PageRequest::default()
            },
        ] {
            let err = read_page(&conn, &schema, &table, &req, MAX_PAGE_LIMIT, 1_000, true)
                .expect_err("must fail");
            assert!(matches!(err, QueryError::InvalidPageSize(_)));
        }
    }

    #[test]
    fn filtered_sorted_page_with_total_and_json_decode() {
        let conn = test_conn();
        let (schema, table) = idents();
        let req = PageRequest {
            limit: 10,
            offset: 0,
            filters: vec![FilterSpec::Plain(PlainFilter {
                col: "category".to_string(),
                op: "=".to_string(),
                val: "Beratung".to_string(),
            })],
            sort: SortSpec {
                sort_by: Some("position".to_string()),
                sort_dir: "desc".to_string(),
                ..SortSpec::default()
            },
        };
        let page = read_page(&conn, &schema, &table, &req, MAX_PAGE_LIMIT, 1_000, true).unwrap();

        assert_eq!(page.total, Some(2));
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0]["id"], "s3");
        assert_eq!(page.rows[1]["id"], "s1");
        // JSON-typed columns come back structured, not as strings.
        assert_eq!(page.rows[1]["tags"]["level"], "advanced");
        assert_eq!(page.rows[0]["tags"], serde_json::Value::Null);
        assert!(page.columns.contains(&"updated_at".to_string()));
    }

    #[test]
    fn total_is_omitted_above_count_threshold() {
        let conn = test_conn();
        let (schema, table) = idents();
        let req = PageRequest {
            limit: 10,
            ..PageRequest::default()
        };
        let page = read_page(&conn, &schema, &table, &req, MAX_PAGE_LIMIT, 0, true).unwrap();
        assert_eq!(page.total, None);
        assert_eq!(page.rows.len(), 3);
    }

    #[test]
    fn offset_past_end_yields_empty_page() {
        let conn = test_conn();
        let (schema, table) = idents();
        let req = PageRequest {
            limit: 10,
            offset: 50,
            ..PageRequest::default()
        };
        let page = read_page(&conn, &schema, &table, &req, MAX_PAGE_LIMIT, 1_000, true).unwrap();
        assert!(page.rows.is_empty());
        assert_eq!(page.total, Some(3));
    }

    #[test]
    fn decode_covers_common_scalars() {
        assert_eq!(decode_value(Value::Null, false), serde_json::Value::Null);
        assert_eq!(decode_value(Value::Boolean(true), false), true);
        assert_eq!(decode_value(Value::BigInt(42), false), 42);
        assert_eq!(
            decode_value(Value::HugeInt(i128::from(i64::MAX) + 1), false),
            serde_json::Value::String("9223372036854775808".to_string())
        );
        assert_eq!(
            decode_value(Value::Text("plain".to_string()), false),
            "plain"
        );
        assert_eq!(
            decode_value(Value::Text("{\"a\": 1}".to_string()), true)["a"],
            1
        );
        assert_eq!(
            decode_value(Value::Text("not json".to_string()), true),
            "not json"
        );
        assert_eq!(
            decode_value(Value::Blob(vec![0xde, 0xad]), false),
            "dead"
        );
        assert_eq!(
            decode_value(Value::Timestamp(TimeUnit::Microsecond, 0), false),
            "1970-01-01 00:00:00"
        );
        assert_eq!(decode_value(Value::Date32(0), false), "1970-01-01");
        assert_eq!(
            decode_value(
                Value::List(vec![Value::Int(1), Value::Int(2)]),
                false
            ),
            serde_json::json!([1, 2])
        );
    }
}
