use anyhow::Result;

use kompass_core::analytics::{
    AnalyticsSummary, CountryCount, EventFilter, NamedCount, OrgCount, TOP_N,
};

use crate::DuckDbBackend;

use super::append_event_filter;

/// Range totals plus top-N breakdowns by event name, country, and
/// organisation. Rows with no country or org are counted in the totals but
/// excluded from their breakdown.
pub async fn summarize_inner(db: &DuckDbBackend, filter: &EventFilter) -> Result<AnalyticsSummary> {
    let mut totals_filter = String::new();
    let mut params: Vec<String> = Vec::new();
    let mut param_idx = 1;
    append_event_filter(filter, &mut totals_filter, &mut params, &mut param_idx);

    let conn = db.conn.lock().await;

    let totals_sql = format!(
        "SELECT COUNT(*), COUNT(DISTINCT session_id), COUNT(DISTINCT ip) \
         FROM public.events WHERE 1=1{totals_filter}"
    );
    let totals_refs: Vec<&dyn duckdb::types::ToSql> = params
        .iter()
        .map(|p| p as &dyn duckdb::types::ToSql)
        .collect();
    let (total, unique_sessions, unique_ips) =
        conn.prepare(&totals_sql)?
            .query_row(totals_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;

    // One round trip for all three breakdowns. Each branch filters and limits
    // independently; the final ordering is reimposed in Rust because UNION ALL
    // does not preserve branch-internal order.
    let mut event_filter_sql = String::new();
    let mut country_filter_sql = String::new();
    let mut org_filter_sql = String::new();
    let mut top_params: Vec<String> = Vec::new();
    let mut top_param_idx = 1;
    append_event_filter(filter, &mut event_filter_sql, &mut top_params, &mut top_param_idx);
    append_event_filter(
        filter,
        &mut country_filter_sql,
        &mut top_params,
        &mut top_param_idx,
    );
    append_event_filter(filter, &mut org_filter_sql, &mut top_params, &mut top_param_idx);

    let top_sql = format!(
        r#"
        (SELECT 'event' AS kind, name AS k1, CAST(NULL AS VARCHAR) AS k2, COUNT(*) AS c
         FROM public.events
         WHERE 1=1{event_filter_sql}
         GROUP BY name
         ORDER BY c DESC, k1 ASC
         LIMIT {TOP_N})
        UNION ALL
        (SELECT 'country' AS kind, country_code AS k1, country_name AS k2, COUNT(*) AS c
         FROM public.events
         WHERE country_code IS NOT NULL{country_filter_sql}
         GROUP BY country_code, country_name
         ORDER BY c DESC, k1 ASC
         LIMIT {TOP_N})
        UNION ALL
        (SELECT 'org' AS kind, org AS k1, CAST(NULL AS VARCHAR) AS k2, COUNT(*) AS c
         FROM public.events
         WHERE org IS NOT NULL{org_filter_sql}
         GROUP BY org
         ORDER BY c DESC, k1 ASC
         LIMIT {TOP_N})
        "#
    );
    let top_refs: Vec<&dyn duckdb::types::ToSql> = top_params
        .iter()
        .map(|p| p as &dyn duckdb::types::ToSql)
        .collect();
    let mut stmt = conn.prepare(&top_sql)?;
    let rows = stmt.query_map(top_refs.as_slice(), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut top_events = Vec::new();
    let mut top_countries = Vec::new();
    let mut top_orgs = Vec::new();
    for row in rows {
        let (kind, k1, k2, c) = row?;
        match kind.as_str() {
            "event" => {
                if let Some(name) = k1 {
                    top_events.push(NamedCount { name, c });
                }
            }
            "country" => {
                if let Some(country_code) = k1 {
                    top_countries.push(CountryCount {
                        country_code,
                        country_name: k2,
                        c,
                    });
                }
            }
            "org" => {
                if let Some(org) = k1 {
                    top_orgs.push(OrgCount { org, c });
                }
            }
            _ => {}
        }
    }
    top_events.sort_by(|a, b| b.c.cmp(&a.c).then(a.name.cmp(&b.name)));
    top_countries.sort_by(|a, b| b.c.cmp(&a.c).then(a.country_code.cmp(&b.country_code)));
    top_orgs.sort_by(|a, b| b.c.cmp(&a.c).then(a.org.cmp(&b.org)));

    Ok(AnalyticsSummary {
        total,
        unique_sessions,
        unique_ips,
        top_events,
        top_countries,
        top_orgs,
    })
}

impl DuckDbBackend {
    pub async fn summarize(&self, filter: &EventFilter) -> Result<AnalyticsSummary> {
        summarize_inner(self, filter).await
    }
}
