use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use kompass_core::analytics::{AnalyticsSummary, AnalyticsTimeSeries, EventFilter, EventPage};
use kompass_core::table::MAX_PAGE_LIMIT;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub name: Option<String>,
    pub q: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// `GET /api/analytics/events`: one page of the raw event log, newest first.
///
/// A storage failure degrades to an empty page flagged `error: true` instead
/// of a 5xx; the dashboard keeps rendering.
#[tracing::instrument(skip(state))]
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let filter = event_filter(&query.name, &query.q, &query.from, &query.to)?;
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_PAGE_LIMIT);

    match state.db.list_events(&filter, page, limit).await {
        Ok(result) => Ok(Json(to_json(result)?)),
        Err(e) => {
            tracing::error!(error = %e, "Event list query failed, returning empty page");
            Ok(Json(degraded(EventPage {
                page,
                limit,
                total: 0,
                items: Vec::new(),
            })))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub name: Option<String>,
    pub q: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// `GET /api/analytics/summary`: headline totals plus top-10 groupings.
#[tracing::instrument(skip(state))]
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let filter = event_filter(&query.name, &query.q, &query.from, &query.to)?;

    match state.db.summarize(&filter).await {
        Ok(summary) => Ok(Json(to_json(summary)?)),
        Err(e) => {
            tracing::error!(error = %e, "Summary aggregation failed, returning zero shape");
            Ok(Json(degraded(AnalyticsSummary::default())))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TimeseriesQuery {
    pub name: Option<String>,
    pub q: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    /// hour, day, week, or month; anything else falls back to the automatic
    /// choice for the range.
    pub interval: Option<String>,
}

/// `GET /api/analytics/timeseries`: zero-filled bucket series plus the Web
/// Vitals means for the range.
#[tracing::instrument(skip(state))]
pub async fn timeseries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeseriesQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let filter = event_filter(&query.name, &query.q, &query.from, &query.to)?;

    match state
        .db
        .timeseries(&filter, query.interval.as_deref())
        .await
    {
        Ok(series) => Ok(Json(to_json(series)?)),
        Err(e) => {
            tracing::error!(error = %e, "Timeseries aggregation failed, returning empty series");
            Ok(Json(degraded(AnalyticsTimeSeries::default())))
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn event_filter(
    name: &Option<String>,
    q: &Option<String>,
    from: &Option<String>,
    to: &Option<String>,
) -> Result<EventFilter, AppError> {
    let from = match from.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(lower_bound(raw).ok_or_else(|| bad_timestamp("from", raw))?),
        None => None,
    };
    let to = match to.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(upper_bound(raw).ok_or_else(|| bad_timestamp("to", raw))?),
        None => None,
    };
    Ok(EventFilter {
        name: name.clone().filter(|s| !s.is_empty()),
        q: q.clone().filter(|s| !s.is_empty()),
        from,
        to,
    })
}

fn bad_timestamp(field: &str, raw: &str) -> AppError {
    AppError::BadRequest(format!(
        "invalid {field}: {raw:?} (expected YYYY-MM-DD or RFC 3339)"
    ))
}

/// Parse an inclusive lower bound: RFC 3339 as-is, a bare date at midnight.
fn lower_bound(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Widen an inclusive wire `to` into the store's exclusive upper bound: a
/// bare date covers its whole day, an exact timestamp covers itself.
fn upper_bound(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc) + Duration::microseconds(1));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some((date + Duration::days(1)).and_hms_opt(0, 0, 0)?.and_utc())
}

/// Serialize a zero/empty aggregate shape with an `error: true` marker so
/// dashboards render an empty state instead of breaking on a storage hiccup.
fn degraded<T: Serialize>(shape: T) -> serde_json::Value {
    let mut value = serde_json::to_value(shape).unwrap_or_else(|_| json!({}));
    if let Some(map) = value.as_object_mut() {
        map.insert("error".to_string(), serde_json::Value::Bool(true));
    }
    value
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize response: {e}")))
}
