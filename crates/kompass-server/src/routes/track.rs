use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use kompass_core::event::{
    fallback_session_id, AnalyticsEvent, TrackOrBatch, TrackPayload, MAX_BATCH_SIZE,
};

use crate::{error::AppError, state::AppState};

/// `POST /api/analytics/events`: ingest a single event or a batch of up to 50.
///
/// ## Validation
/// Malformed bodies and empty batches are 400; more than 50 events is 413.
///
/// ## Enrichment (all best-effort, failures leave the field NULL)
/// - `ip`: first `X-Forwarded-For` entry, falling back to the peer address.
/// - `user_agent`: the `User-Agent` header, classified via `woothee` for the
///   ingest log.
/// - `country_code`/`country_name` and `asn`/`org`: MaxMind City + ASN.
/// - `hostname`: optional HTTP metadata lookup, cached per IP.
/// - `session_id`: the client's own, else a salted daily hash of IP and UA.
///
/// ## Response
/// `202 Accepted` with `{ "ok": true, "ids": [...] }`. A storage failure is
/// logged and swallowed; the reporting client still gets 202, with
/// `ok: false` and no ids.
#[tracing::instrument(skip(state, headers, payload))]
pub async fn track(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<TrackOrBatch>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let payload = match payload {
        Ok(Json(p)) => p,
        Err(rejection) => {
            return Err(AppError::BadRequest(format!(
                "invalid event payload: {rejection}"
            )));
        }
    };

    let payloads: Vec<TrackPayload> = match payload {
        TrackOrBatch::Single(p) => vec![*p],
        TrackOrBatch::Batch(v) => v,
    };

    if payloads.is_empty() {
        return Err(AppError::BadRequest("empty batch".to_string()));
    }
    if payloads.len() > MAX_BATCH_SIZE {
        return Err(AppError::BatchTooLarge(payloads.len()));
    }

    let client_ip = client_ip(&headers, &peer);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    if let Some(ua) = user_agent.as_deref() {
        log_user_agent(ua);
    }

    let geo = lookup_geo(&state, &client_ip);
    let hostname = lookup_hostname(&state, &client_ip).await;

    let now = Utc::now();
    let events: Vec<AnalyticsEvent> = payloads
        .into_iter()
        .map(|p| {
            let session_id = p
                .session_id
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| {
                    fallback_session_id(&client_ip, user_agent.as_deref().unwrap_or(""))
                });
            AnalyticsEvent {
                id: uuid::Uuid::new_v4().to_string(),
                name: p.name,
                props: p.props.unwrap_or(serde_json::Value::Null),
                path: p.path,
                referrer: p.referrer,
                user_agent: user_agent.clone(),
                session_id,
                ip: Some(client_ip.clone()),
                country_code: geo.country_code.clone(),
                country_name: geo.country_name.clone(),
                org: geo.org.clone(),
                asn: geo.asn,
                hostname: hostname.clone(),
                created_at: now,
            }
        })
        .collect();

    let ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();

    match state.db.insert_events(&events).await {
        Ok(()) => Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "ok": true, "ids": ids })),
        )),
        Err(e) => {
            tracing::error!(count = events.len(), error = %e, "Event insert failed, dropping batch");
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({ "ok": false, "ids": [] })),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The real client IP: first `X-Forwarded-For` entry when a proxy fills it,
/// otherwise the TCP peer address.
fn client_ip(headers: &HeaderMap, peer: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

/// GeoIP enrichment pulled from the City and ASN databases.
#[derive(Debug, Default)]
struct GeoInfo {
    country_code: Option<String>,
    country_name: Option<String>,
    org: Option<String>,
    asn: Option<i64>,
}

fn lookup_geo(state: &AppState, ip: &str) -> GeoInfo {
    let Ok(addr) = IpAddr::from_str(ip) else {
        return GeoInfo::default();
    };

    let mut info = GeoInfo::default();

    if let Some(reader) = &state.geo_city {
        let city: Option<maxminddb::geoip2::City> = reader.lookup(addr).ok();
        if let Some(city) = city {
            info.country_code = city
                .country
                .as_ref()
                .and_then(|c| c.iso_code)
                .map(str::to_string);
            info.country_name = city
                .country
                .as_ref()
                .and_then(|c| c.names.as_ref())
                .and_then(|names| names.get("en"))
                .map(|s| s.to_string());
        }
    }

    if let Some(reader) = &state.geo_asn {
        let asn: Option<maxminddb::geoip2::Asn> = reader.lookup(addr).ok();
        if let Some(asn) = asn {
            info.asn = asn.autonomous_system_number.map(i64::from);
            info.org = asn
                .autonomous_system_organization
                .map(str::to_string);
        }
    }

    info
}

/// Resolve a hostname for `ip` through the configured metadata endpoint.
///
/// Returns `None` immediately when no endpoint is configured. Results,
/// including failures, are cached for the process lifetime so each IP costs
/// at most one outbound call.
async fn lookup_hostname(state: &AppState, ip: &str) -> Option<String> {
    let url_template = state.config.ip_lookup_url.clone()?;

    {
        let cache = state.hostname_cache.read().await;
        if let Some(cached) = cache.get(ip) {
            return cached.clone();
        }
    }

    let url = url_template.replace("{ip}", ip);
    // ureq is blocking; keep it off the async worker threads.
    let resolved = tokio::task::spawn_blocking(move || fetch_hostname(&url))
        .await
        .ok()
        .flatten();

    let mut cache = state.hostname_cache.write().await;
    cache.insert(ip.to_string(), resolved.clone());
    resolved
}

/// One blocking metadata call. Any failure reads as a missing hostname.
fn fetch_hostname(url: &str) -> Option<String> {
    let response = ureq::get(url)
        .timeout(std::time::Duration::from_secs(2))
        .call()
        .ok()?;
    let body: serde_json::Value = response.into_json().ok()?;
    body.get("hostname")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Classify the User-Agent for the ingest log. Unclassifiable strings are
/// logged as such rather than dropped.
fn log_user_agent(user_agent: &str) {
    match woothee::parser::Parser::new().parse(user_agent) {
        Some(ua) => {
            tracing::debug!(
                browser = ua.name,
                os = ua.os,
                category = ua.category,
                "Ingest user agent"
            );
        }
        None => tracing::debug!("Ingest user agent unclassified"),
    }
}
