use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Three layers wrap every route: gzip compression for the JSON dashboards
/// and exports, CORS (permissive by default, restricted to the configured
/// origins when `KOMPASS_CORS_ORIGINS` is set), and `TraceLayer` for
/// structured request/response logging via `tracing`.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/admin/db/status", get(routes::admin_db::status))
        .route("/api/admin/db/tables", get(routes::admin_db::tables))
        .route(
            "/api/admin/db/table-schema",
            get(routes::admin_db::table_schema),
        )
        .route(
            "/api/admin/db/table-rows",
            get(routes::admin_db::table_rows),
        )
        .route(
            "/api/admin/db/export-csv",
            get(routes::admin_db::export_csv),
        )
        .route(
            "/api/admin/db/export-json",
            get(routes::admin_db::export_json),
        )
        .route("/api/admin/db/query", post(routes::admin_db::query))
        .route(
            "/api/analytics/events",
            get(routes::analytics::list_events).post(routes::track::track),
        )
        .route("/api/analytics/summary", get(routes::analytics::summary))
        .route(
            "/api/analytics/timeseries",
            get(routes::analytics::timeseries),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(CompressionLayer::new())
        .with_state(state)
}
