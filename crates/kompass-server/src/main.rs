use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use kompass_server::state::AppState;

/// `kompass health`: liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$KOMPASS_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("KOMPASS_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Health-check subcommand: probe the running server and exit before any
    // server setup happens.
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }

    // Structured JSON logging. Level controlled via the RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kompass_server=info".parse()?)
                .add_directive("kompass_duckdb=info".parse()?),
        )
        .json()
        .init();

    let cfg = kompass_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // The data directory must exist before DuckDB creates its file there.
    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/kompass.db", cfg.data_dir);

    // Opening runs the idempotent schema bootstrap and migration ledger seed.
    let db = kompass_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    // Missing MaxMind databases are a warning, not a failure: events are then
    // stored with NULL enrichment fields.
    for (path, fields) in [
        (&cfg.geoip_city_path, "country"),
        (&cfg.geoip_asn_path, "asn/org"),
    ] {
        if !std::path::Path::new(path).exists() {
            tracing::warn!(
                path = %path,
                "GeoIP database not found. Events stored with NULL {} fields.",
                fields
            );
        }
    }

    let state = Arc::new(AppState::new(db, cfg.clone()));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = kompass_server::app::build_app(Arc::clone(&state));

    info!(port = cfg.port, "Kompass listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await?;

    Ok(())
}
