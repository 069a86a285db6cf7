use anyhow::Result;
use chrono::DateTime;

use kompass_core::analytics::{EventFilter, EventPage};
use kompass_core::event::AnalyticsEvent;
use kompass_core::table::MAX_PAGE_LIMIT;

use crate::DuckDbBackend;

use super::append_event_filter;

struct RawEventRow {
    id: String,
    name: String,
    props: Option<String>,
    path: Option<String>,
    referrer: Option<String>,
    user_agent: Option<String>,
    session_id: String,
    ip: Option<String>,
    country_code: Option<String>,
    country_name: Option<String>,
    org: Option<String>,
    asn: Option<i64>,
    hostname: Option<String>,
    created_us: i64,
}

/// Paged event log, newest first. Ties on `created_at` break on `id` so a
/// page walk never skips or repeats rows.
pub async fn list_events_inner(
    db: &DuckDbBackend,
    filter: &EventFilter,
    page: i64,
    limit: i64,
) -> Result<EventPage> {
    let page = page.max(1);
    let limit = limit.clamp(1, MAX_PAGE_LIMIT);
    let offset = (page - 1) * limit;

    let mut filter_sql = String::new();
    let mut params: Vec<String> = Vec::new();
    let mut param_idx = 1;
    append_event_filter(filter, &mut filter_sql, &mut params, &mut param_idx);
    let param_refs: Vec<&dyn duckdb::types::ToSql> = params
        .iter()
        .map(|p| p as &dyn duckdb::types::ToSql)
        .collect();

    let conn = db.conn.lock().await;

    let count_sql = format!("SELECT COUNT(*) FROM public.events WHERE 1=1{filter_sql}");
    let total: i64 = conn
        .prepare(&count_sql)?
        .query_row(param_refs.as_slice(), |row| row.get(0))?;

    let rows_sql = format!(
        r#"
        SELECT id, name, CAST(props AS VARCHAR), path, referrer, user_agent, session_id,
               ip, country_code, country_name, org, asn, hostname, epoch_us(created_at)
        FROM public.events
        WHERE 1=1{filter_sql}
        ORDER BY created_at DESC, id DESC
        LIMIT {limit} OFFSET {offset}
        "#
    );
    let mut stmt = conn.prepare(&rows_sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        Ok(RawEventRow {
            id: row.get(0)?,
            name: row.get(1)?,
            props: row.get(2)?,
            path: row.get(3)?,
            referrer: row.get(4)?,
            user_agent: row.get(5)?,
            session_id: row.get(6)?,
            ip: row.get(7)?,
            country_code: row.get(8)?,
            country_name: row.get(9)?,
            org: row.get(10)?,
            asn: row.get(11)?,
            hostname: row.get(12)?,
            created_us: row.get(13)?,
        })
    })?;

    let mut items = Vec::new();
    for row in rows {
        let raw = row?;
        let props = match raw.props.as_deref() {
            Some(text) => serde_json::from_str(text).unwrap_or(serde_json::Value::Null),
            None => serde_json::Value::Null,
        };
        let created_at =
            DateTime::from_timestamp_micros(raw.created_us).unwrap_or(DateTime::UNIX_EPOCH);
        items.push(AnalyticsEvent {
            id: raw.id,
            name: raw.name,
            props,
            path: raw.path,
            referrer: raw.referrer,
            user_agent: raw.user_agent,
            session_id: raw.session_id,
            ip: raw.ip,
            country_code: raw.country_code,
            country_name: raw.country_name,
            org: raw.org,
            asn: raw.asn,
            hostname: raw.hostname,
            created_at,
        });
    }

    Ok(EventPage {
        page,
        limit,
        total,
        items,
    })
}

impl DuckDbBackend {
    pub async fn list_events(
        &self,
        filter: &EventFilter,
        page: i64,
        limit: i64,
    ) -> Result<EventPage> {
        list_events_inner(self, filter, page, limit).await
    }
}
