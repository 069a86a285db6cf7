use chrono::{DateTime, TimeZone, Utc};
use kompass_core::analytics::EventFilter;
use kompass_core::event::AnalyticsEvent;
use kompass_duckdb::DuckDbBackend;

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

fn range(from_day: u32, to_day: u32) -> EventFilter {
    EventFilter {
        from: Some(at(from_day, 0, 0)),
        to: Some(at(to_day, 0, 0)),
        ..EventFilter::default()
    }
}

#[tokio::test]
async fn test_insert_and_list_events_newest_first() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let mut contact = event("form_submit", "sess_b", at(11, 10, 0));
    contact.props = serde_json::json!({"form": "kontakt-formular"});
    db.insert_events(&[
        event("page_view", "sess_a", at(10, 10, 0)),
        contact,
        event("page_view", "sess_c", at(12, 10, 0)),
    ])
    .await
    .expect("insert");

    let first = db
        .list_events(&EventFilter::default(), 1, 2)
        .await
        .expect("page 1");
    assert_eq!(first.total, 3);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].created_at, at(12, 10, 0));
    assert_eq!(first.items[1].name, "form_submit");
    assert_eq!(first.items[1].props["form"], "kontakt-formular");

    let second = db
        .list_events(&EventFilter::default(), 2, 2)
        .await
        .expect("page 2");
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].created_at, at(10, 10, 0));
}

#[tokio::test]
async fn test_event_filters_by_name_and_free_text() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let mut form = event("form_submit", "sess_b", at(11, 9, 0));
    form.props = serde_json::json!({"form": "kontakt-formular"});
    let mut about = event("page_view", "sess_c", at(11, 10, 0));
    about.path = Some("/ueber-uns".to_string());
    db.insert_events(&[event("page_view", "sess_a", at(11, 8, 0)), form, about])
        .await
        .expect("insert");

    let by_name = EventFilter {
        name: Some("page_view".to_string()),
        ..EventFilter::default()
    };
    assert_eq!(db.list_events(&by_name, 1, 50).await.expect("name").total, 2);

    let by_props_text = EventFilter {
        q: Some("kontakt".to_string()),
        ..EventFilter::default()
    };
    let page = db.list_events(&by_props_text, 1, 50).await.expect("props");
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].name, "form_submit");

    let by_path = EventFilter {
        q: Some("ueber".to_string()),
        ..EventFilter::default()
    };
    assert_eq!(db.list_events(&by_path, 1, 50).await.expect("path").total, 1);
}

#[tokio::test]
async fn test_summary_totals_and_top_lists() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let mut e3 = event("form_submit", "sess_b", at(11, 11, 0));
    e3.ip = Some("192.0.2.11".to_string());
    e3.org = Some("Vodafone".to_string());
    let mut e4 = event("page_view", "sess_c", at(11, 12, 0));
    e4.ip = Some("192.0.2.12".to_string());
    e4.country_code = None;
    e4.country_name = None;
    e4.org = None;
    db.insert_events(&[
        event("page_view", "sess_a", at(11, 10, 0)),
        event("page_view", "sess_a", at(11, 10, 5)),
        e3,
        e4,
    ])
    .await
    .expect("insert");

    let summary = db.summarize(&range(10, 13)).await.expect("summary");
    assert_eq!(summary.total, 4);
    assert_eq!(summary.unique_sessions, 3);
    assert_eq!(summary.unique_ips, 3);

    assert_eq!(summary.top_events[0].name, "page_view");
    assert_eq!(summary.top_events[0].c, 3);
    assert_eq!(summary.top_events[1].name, "form_submit");

    // Rows without enrichment stay in the totals but out of the breakdowns.
    assert_eq!(summary.top_countries.len(), 1);
    assert_eq!(summary.top_countries[0].country_code, "DE");
    assert_eq!(summary.top_countries[0].c, 3);

    assert_eq!(summary.top_orgs.len(), 2);
    assert_eq!(summary.top_orgs[0].org, "Telekom");
    assert_eq!(summary.top_orgs[0].c, 2);
    assert_eq!(summary.top_orgs[1].org, "Vodafone");
}

#[tokio::test]
async fn test_summary_range_includes_start_excludes_end() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.insert_events(&[
        event("page_view", "sess_a", at(10, 0, 0)),
        event("page_view", "sess_a", at(11, 12, 0)),
        event("page_view", "sess_a", at(13, 0, 0)),
    ])
    .await
    .expect("insert");

    let summary = db.summarize(&range(10, 13)).await.expect("summary");
    assert_eq!(summary.total, 2);
}

#[tokio::test]
async fn test_timeseries_zero_fills_gaps() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.insert_events(&[
        event("page_view", "sess_a", at(10, 9, 0)),
        event("page_view", "sess_b", at(10, 17, 0)),
        event("outbound_click", "sess_c", at(12, 13, 0)),
    ])
    .await
    .expect("insert");

    let series = db
        .timeseries(&range(10, 13), None)
        .await
        .expect("timeseries");
    assert_eq!(series.interval, "day");
    assert_eq!(series.items.len(), 3);

    assert_eq!(series.items[0].ts, "2026-08-10");
    assert_eq!(series.items[0].total, 2);
    assert_eq!(series.items[0].unique_sessions, 2);
    assert_eq!(series.items[0].page_views, 2);

    assert_eq!(series.items[1].ts, "2026-08-11");
    assert_eq!(series.items[1].total, 0);
    assert_eq!(series.items[1].unique_sessions, 0);

    assert_eq!(series.items[2].outbound_clicks, 1);
    assert_eq!(series.items[2].page_views, 0);

    assert_eq!(series.web_vitals.count, 0);
    assert_eq!(series.web_vitals.lcp, None);
}

#[tokio::test]
async fn test_timeseries_web_vitals_averages() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let mut v1 = event("web_vitals", "sess_a", at(11, 10, 0));
    v1.props = serde_json::json!({"LCP": 1200.0, "CLS": 0.05, "FID": 10.0});
    let mut v2 = event("web_vitals", "sess_b", at(11, 11, 0));
    v2.props = serde_json::json!({"LCP": 1800.0});
    db.insert_events(&[v1, v2, event("page_view", "sess_a", at(11, 12, 0))])
        .await
        .expect("insert");

    let series = db
        .timeseries(&range(10, 13), None)
        .await
        .expect("timeseries");
    assert_eq!(series.web_vitals.count, 2);
    let lcp = series.web_vitals.lcp.expect("lcp");
    assert!((lcp - 1500.0).abs() < 0.001);
    let cls = series.web_vitals.cls.expect("cls");
    assert!((cls - 0.05).abs() < 0.001);
    let fid = series.web_vitals.fid.expect("fid");
    assert!((fid - 10.0).abs() < 0.001);
}

#[tokio::test]
async fn test_timeseries_hour_granularity_on_request() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.insert_events(&[
        event("page_view", "sess_a", at(11, 10, 15)),
        event("page_view", "sess_b", at(11, 12, 45)),
    ])
    .await
    .expect("insert");

    let filter = EventFilter {
        from: Some(at(11, 10, 0)),
        to: Some(at(11, 13, 0)),
        ..EventFilter::default()
    };
    let series = db
        .timeseries(&filter, Some("hour"))
        .await
        .expect("timeseries");
    assert_eq!(series.interval, "hour");
    assert_eq!(series.items.len(), 3);
    assert_eq!(series.items[0].ts, "2026-08-11 10:00:00");
    assert_eq!(series.items[0].total, 1);
    assert_eq!(series.items[1].total, 0);
    assert_eq!(series.items[2].total, 1);
}
