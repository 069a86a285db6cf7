//! Filter and result shapes for the events dashboards.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::AnalyticsEvent;

/// Well-known event names carried as per-bucket series in the time series.
pub const EVENT_PAGE_VIEW: &str = "page_view";
pub const EVENT_OUTBOUND_CLICK: &str = "outbound_click";
pub const EVENT_FORM_SUBMIT: &str = "form_submit";

/// Event name carrying Web Vitals measurements in its props.
pub const EVENT_WEB_VITALS: &str = "web_vitals";

/// How many entries the top_* groupings return.
pub const TOP_N: usize = 10;

/// Optional dimension filters applied uniformly to analytics queries.
///
/// The events table's shape is fixed, so these are hard-coded rather than
/// validated against introspection like the generic table browser.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Exact event name match.
    pub name: Option<String>,
    /// Case-insensitive substring matched across path, referrer, user agent
    /// and the serialized props text.
    pub q: Option<String>,
    /// Inclusive lower bound on created_at.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on created_at. Inclusive wire inputs are widened
    /// upstream (whole day for dates, one microsecond for timestamps).
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub c: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryCount {
    pub country_code: String,
    pub country_name: Option<String>,
    pub c: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrgCount {
    pub org: String,
    pub c: i64,
}

/// Derived, never persisted: recomputed on demand from a filtered slice of
/// events. Top groupings are ordered by count descending, name ascending.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyticsSummary {
    pub total: i64,
    pub unique_sessions: i64,
    pub unique_ips: i64,
    pub top_events: Vec<NamedCount>,
    pub top_countries: Vec<CountryCount>,
    pub top_orgs: Vec<OrgCount>,
}

/// One time bucket. Buckets with no events still appear with zero counts so
/// charts render continuous series.
#[derive(Debug, Clone, Serialize)]
pub struct TimeBucket {
    pub ts: String,
    pub total: i64,
    pub unique_sessions: i64,
    pub page_views: i64,
    pub outbound_clicks: i64,
    pub form_submits: i64,
}

/// Arithmetic means of the three Web Vitals metrics out of `props`, over the
/// matching `web_vitals` events. `count` is how many such events matched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WebVitals {
    #[serde(rename = "LCP")]
    pub lcp: Option<f64>,
    #[serde(rename = "CLS")]
    pub cls: Option<f64>,
    #[serde(rename = "FID")]
    pub fid: Option<f64>,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyticsTimeSeries {
    pub interval: String,
    pub items: Vec<TimeBucket>,
    pub web_vitals: WebVitals,
}

/// One page of the raw event log, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct EventPage {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub items: Vec<AnalyticsEvent>,
}
