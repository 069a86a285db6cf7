pub mod events;
pub mod summary;
pub mod timeseries;

use chrono::{DateTime, Utc};
use kompass_core::analytics::EventFilter;

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Append the shared event-log filter to a WHERE clause under construction.
///
/// Callers start from `WHERE 1=1`; every condition lands as ` AND ...` with
/// the next free `?N` placeholder. `from` is inclusive and `to` exclusive;
/// the HTTP layer widens user-supplied bounds before they get here. The free
/// text needle is matched against path, referrer, user agent, and the raw
/// props text.
pub(crate) fn append_event_filter(
    filter: &EventFilter,
    filter_sql: &mut String,
    params: &mut Vec<String>,
    param_idx: &mut usize,
) {
    if let Some(ref name) = filter.name {
        filter_sql.push_str(&format!(" AND name = ?{}", *param_idx));
        params.push(name.clone());
        *param_idx += 1;
    }
    if let Some(ref q) = filter.q {
        let needle = format!("%{q}%");
        filter_sql.push_str(&format!(
            " AND (path ILIKE ?{} OR referrer ILIKE ?{} OR user_agent ILIKE ?{} OR CAST(props AS VARCHAR) ILIKE ?{})",
            *param_idx,
            *param_idx + 1,
            *param_idx + 2,
            *param_idx + 3
        ));
        for _ in 0..4 {
            params.push(needle.clone());
        }
        *param_idx += 4;
    }
    if let Some(from) = filter.from {
        filter_sql.push_str(&format!(" AND created_at >= ?{}", *param_idx));
        params.push(format_ts(from));
        *param_idx += 1;
    }
    if let Some(to) = filter.to {
        filter_sql.push_str(&format!(" AND created_at < ?{}", *param_idx));
        params.push(format_ts(to));
        *param_idx += 1;
    }
}
