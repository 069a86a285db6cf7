use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use kompass_core::analytics::{
    AnalyticsTimeSeries, EventFilter, TimeBucket, WebVitals, EVENT_FORM_SUBMIT,
    EVENT_OUTBOUND_CLICK, EVENT_PAGE_VIEW, EVENT_WEB_VITALS,
};

use crate::DuckDbBackend;

/// Auto-granularity: ≤2 days → hour, ≤60 → day, ≤365 → week, else month.
pub fn auto_granularity(from: &DateTime<Utc>, to: &DateTime<Utc>) -> String {
    let days = (*to - *from).num_days();
    if days <= 2 {
        "hour".to_string()
    } else if days <= 60 {
        "day".to_string()
    } else if days <= 365 {
        "week".to_string()
    } else {
        "month".to_string()
    }
}

/// Bucketed event counts plus web vitals averages for a filtered range.
///
/// Missing buckets are zero-filled so charts render a continuous axis. The
/// SQL bucket expression and the Rust bucket generator must produce the same
/// key strings; the zero-fill joins them with an exact lookup.
pub async fn timeseries_inner(
    db: &DuckDbBackend,
    filter: &EventFilter,
    granularity: Option<&str>,
) -> Result<AnalyticsTimeSeries> {
    let now = Utc::now();
    let from = filter.from.unwrap_or(now - Duration::days(30));
    let to = filter.to.unwrap_or(now);

    let gran = match granularity {
        Some("hour") => "hour".to_string(),
        Some("day") => "day".to_string(),
        Some("week") => "week".to_string(),
        Some("month") => "month".to_string(),
        _ => auto_granularity(&from, &to),
    };

    let bucket_expr = match gran.as_str() {
        "hour" => "strftime(created_at, '%Y-%m-%d %H:00:00')",
        "week" => "strftime(date_trunc('week', created_at), '%Y-%m-%d')",
        "month" => "strftime(created_at, '%Y-%m')",
        _ => "strftime(created_at, '%Y-%m-%d')",
    };

    let resolved = EventFilter {
        name: filter.name.clone(),
        q: filter.q.clone(),
        from: Some(from),
        to: Some(to),
    };
    let mut filter_sql = String::new();
    let mut params: Vec<String> = Vec::new();
    let mut param_idx = 1;
    super::append_event_filter(&resolved, &mut filter_sql, &mut params, &mut param_idx);
    let param_refs: Vec<&dyn duckdb::types::ToSql> = params
        .iter()
        .map(|p| p as &dyn duckdb::types::ToSql)
        .collect();

    let conn = db.conn.lock().await;

    let sql = format!(
        r#"
        SELECT
            {bucket_expr} AS bucket,
            COUNT(*) AS total,
            COUNT(DISTINCT session_id) AS unique_sessions,
            COUNT(*) FILTER (WHERE name = '{EVENT_PAGE_VIEW}') AS page_views,
            COUNT(*) FILTER (WHERE name = '{EVENT_OUTBOUND_CLICK}') AS outbound_clicks,
            COUNT(*) FILTER (WHERE name = '{EVENT_FORM_SUBMIT}') AS form_submits
        FROM public.events
        WHERE 1=1{filter_sql}
        GROUP BY bucket
        ORDER BY bucket
        "#
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, i64>(5)?,
        ))
    })?;

    let mut data_map: HashMap<String, (i64, i64, i64, i64, i64)> = HashMap::new();
    for row in rows {
        let (bucket, total, sessions, pv, oc, fs) = row?;
        data_map.insert(bucket, (total, sessions, pv, oc, fs));
    }

    let vitals_sql = format!(
        r#"
        SELECT
            AVG(TRY_CAST(json_extract_string(props, '$.LCP') AS DOUBLE)),
            AVG(TRY_CAST(json_extract_string(props, '$.CLS') AS DOUBLE)),
            AVG(TRY_CAST(json_extract_string(props, '$.FID') AS DOUBLE)),
            COUNT(*)
        FROM public.events
        WHERE name = '{EVENT_WEB_VITALS}'{filter_sql}
        "#
    );
    let web_vitals = conn
        .prepare(&vitals_sql)?
        .query_row(param_refs.as_slice(), |row| {
            Ok(WebVitals {
                lcp: row.get::<_, Option<f64>>(0)?,
                cls: row.get::<_, Option<f64>>(1)?,
                fid: row.get::<_, Option<f64>>(2)?,
                count: row.get::<_, i64>(3)?,
            })
        })?;

    let items: Vec<TimeBucket> = generate_buckets(&from, &to, &gran)
        .into_iter()
        .map(|ts| {
            let (total, unique_sessions, page_views, outbound_clicks, form_submits) =
                data_map.get(&ts).copied().unwrap_or((0, 0, 0, 0, 0));
            TimeBucket {
                ts,
                total,
                unique_sessions,
                page_views,
                outbound_clicks,
                form_submits,
            }
        })
        .collect();

    Ok(AnalyticsTimeSeries {
        interval: gran,
        items,
        web_vitals,
    })
}

impl DuckDbBackend {
    pub async fn timeseries(
        &self,
        filter: &EventFilter,
        granularity: Option<&str>,
    ) -> Result<AnalyticsTimeSeries> {
        timeseries_inner(self, filter, granularity).await
    }
}

/// Generate every bucket key for `[from, to)` in the given granularity,
/// formatted exactly like the SQL bucket expression formats them.
fn generate_buckets(from: &DateTime<Utc>, to: &DateTime<Utc>, gran: &str) -> Vec<String> {
    let mut buckets = Vec::new();
    if to <= from {
        return buckets;
    }
    let last_day = (*to - Duration::microseconds(1)).date_naive();
    match gran {
        "hour" => {
            let mut current = from
                .date_naive()
                .and_hms_opt(from.hour(), 0, 0)
                .unwrap_or_default()
                .and_utc();
            while current < *to {
                buckets.push(current.format("%Y-%m-%d %H:00:00").to_string());
                current += Duration::hours(1);
            }
        }
        "week" => {
            let from_day = from.date_naive();
            let mut current =
                from_day - Duration::days(i64::from(from_day.weekday().num_days_from_monday()));
            while current <= last_day {
                buckets.push(current.format("%Y-%m-%d").to_string());
                current += Duration::days(7);
            }
        }
        "month" => {
            let mut year = from.year();
            let mut month = from.month();
            let end_year = last_day.year();
            let end_month = last_day.month();
            loop {
                buckets.push(format!("{year:04}-{month:02}"));
                if year > end_year || (year == end_year && month >= end_month) {
                    break;
                }
                month += 1;
                if month > 12 {
                    month = 1;
                    year += 1;
                }
            }
        }
        _ => {
            // day
            let mut current = from.date_naive();
            while current <= last_day {
                buckets.push(current.format("%Y-%m-%d").to_string());
                current += Duration::days(1);
            }
        }
    }
    buckets
}
