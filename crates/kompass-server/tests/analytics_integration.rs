use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use kompass_core::config::Config;
use kompass_core::event::AnalyticsEvent;
use kompass_duckdb::DuckDbBackend;
use kompass_server::app::build_app;
use kompass_server::state::AppState;

fn test_config() -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/kompass-test".to_string(),
        duckdb_memory_limit: "1GB".to_string(),
        schema_allow_list: vec!["public".to_string()],
        count_threshold: 500_000,
        geoip_city_path: "/nonexistent/GeoLite2-City.mmdb".to_string(),
        geoip_asn_path: "/nonexistent/GeoLite2-ASN.mmdb".to_string(),
        ip_lookup_url: None,
        cors_origins: vec![],
    }
}

async fn setup() -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, test_config()));
    let app = build_app(Arc::clone(&state));
    (state, app)
}

fn at(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, day, hour, min, 0).expect("ts")
}

fn event(name: &str, session: &str, created_at: DateTime<Utc>) -> AnalyticsEvent {
    AnalyticsEvent {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        props: serde_json::Value::Null,
        path: Some("/leistungen".to_string()),
        referrer: Some("https://www.google.com/".to_string()),
        user_agent: Some("Mozilla/5.0 (Macintosh) Chrome/126".to_string()),
        session_id: session.to_string(),
        ip: Some("192.0.2.10".to_string()),
        country_code: Some("DE".to_string()),
        country_name: Some("Germany".to_string()),
        org: Some("Telekom".to_string()),
        asn: Some(3320),
        hostname: None,
        created_at,
    }
}

/// Three events spread over three days, one per session.
async fn seed_week(state: &AppState) {
    let mut contact = event("form_submit", "sess_c", at(12, 0, 30));
    contact.props = serde_json::json!({"form": "kontakt"});
    state
        .db
        .insert_events(&[
            event("page_view", "sess_a", at(10, 9, 0)),
            event("page_view", "sess_b", at(11, 23, 0)),
            contact,
        ])
        .await
        .expect("seed events");
}

async fn get(app: &axum::Router, uri: &str) -> axum::http::Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    app.clone().oneshot(request).await.expect("request")
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

#[tokio::test]
async fn test_events_endpoint_pages_newest_first() {
    let (state, app) = setup().await;
    seed_week(&state).await;

    let json = json_body(get(&app, "/api/analytics/events?page=1&limit=2").await).await;
    assert_eq!(json["page"], 1);
    assert_eq!(json["limit"], 2);
    assert_eq!(json["total"], 3);
    let items = json["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    assert!(items[0]["created_at"]
        .as_str()
        .expect("created_at")
        .starts_with("2026-08-12"));
    assert_eq!(items[0]["name"], "form_submit");

    let json = json_body(get(&app, "/api/analytics/events?page=2&limit=2").await).await;
    assert_eq!(json["items"].as_array().expect("items").len(), 1);
}

#[tokio::test]
async fn test_events_date_params_cover_whole_days() {
    let (state, app) = setup().await;
    seed_week(&state).await;

    // Day-granular bounds include the whole `to` day.
    let json =
        json_body(get(&app, "/api/analytics/events?from=2026-08-10&to=2026-08-11").await).await;
    assert_eq!(json["total"], 2);

    // An exact timestamp bound still matches events at that instant.
    let json = json_body(
        get(
            &app,
            "/api/analytics/events?from=2026-08-11T23:00:00Z&to=2026-08-11T23:00:00Z",
        )
        .await,
    )
    .await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["items"][0]["session_id"], "sess_b");
}

#[tokio::test]
async fn test_summary_reflects_range_and_name_filter() {
    let (state, app) = setup().await;
    seed_week(&state).await;

    let json = json_body(
        get(&app, "/api/analytics/summary?from=2026-08-10&to=2026-08-12").await,
    )
    .await;
    assert_eq!(json["total"], 3);
    assert_eq!(json["unique_sessions"], 3);
    assert_eq!(json["unique_ips"], 1);
    assert_eq!(json["top_events"][0]["name"], "page_view");
    assert_eq!(json["top_events"][0]["c"], 2);
    assert_eq!(json["top_countries"][0]["country_code"], "DE");
    assert_eq!(json["top_orgs"][0]["org"], "Telekom");
    assert!(json.get("error").is_none());

    let json = json_body(get(&app, "/api/analytics/summary?name=page_view").await).await;
    assert_eq!(json["total"], 2);
}

#[tokio::test]
async fn test_timeseries_zero_fills_between_buckets() {
    let (state, app) = setup().await;
    state
        .db
        .insert_events(&[
            event("page_view", "sess_a", at(10, 10, 0)),
            event("outbound_click", "sess_a", at(12, 15, 0)),
        ])
        .await
        .expect("seed events");

    let json = json_body(
        get(
            &app,
            "/api/analytics/timeseries?from=2026-08-10&to=2026-08-12&interval=day",
        )
        .await,
    )
    .await;
    assert_eq!(json["interval"], "day");
    let items = json["items"].as_array().expect("items");
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["ts"], "2026-08-10");
    assert_eq!(items[0]["page_views"], 1);
    assert_eq!(items[1]["total"], 0);
    assert_eq!(items[2]["outbound_clicks"], 1);
    assert_eq!(json["web_vitals"]["count"], 0);

    let json = json_body(
        get(
            &app,
            "/api/analytics/timeseries?from=2026-08-10T10:00:00Z&to=2026-08-10T12:00:00Z&interval=hour",
        )
        .await,
    )
    .await;
    assert_eq!(json["interval"], "hour");
    let items = json["items"].as_array().expect("items");
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["ts"], "2026-08-10 10:00:00");
    assert_eq!(items[0]["total"], 1);
}

#[tokio::test]
async fn test_analytics_reads_degrade_when_storage_fails() {
    let (state, app) = setup().await;
    seed_week(&state).await;
    {
        let conn = state.db.conn_for_test().await;
        conn.execute_batch("DROP TABLE public.events")
            .expect("drop events");
    }

    let response = get(&app, "/api/analytics/summary").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["error"], true);
    assert_eq!(json["total"], 0);
    assert_eq!(json["top_events"], serde_json::json!([]));

    let json = json_body(get(&app, "/api/analytics/events").await).await;
    assert_eq!(json["error"], true);
    assert_eq!(json["items"], serde_json::json!([]));

    let json = json_body(get(&app, "/api/analytics/timeseries").await).await;
    assert_eq!(json["error"], true);
}

#[tokio::test]
async fn test_malformed_date_parameters_are_rejected() {
    let (_state, app) = setup().await;

    let response = get(&app, "/api/analytics/events?from=banana").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "validation_error");
    assert!(json["error"]["message"]
        .as_str()
        .expect("message")
        .contains("from"));

    let response = get(&app, "/api/analytics/summary?to=2026-13-99").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
