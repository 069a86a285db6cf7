use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use kompass_core::config::Config;
use kompass_duckdb::DuckDbBackend;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
///
/// Heavy resources are wrapped in `Arc` so the state stays cheap to share
/// across request tasks.
pub struct AppState {
    /// The DuckDB backend. Internally uses `Arc<tokio::sync::Mutex<Connection>>`
    /// so it is already cheap to clone and async-safe.
    pub db: Arc<DuckDbBackend>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// MaxMind City database, mapped once at startup. `None` when the file is
    /// absent; events are then stored with NULL country fields.
    pub geo_city: Option<maxminddb::Reader<Vec<u8>>>,

    /// MaxMind ASN database for the org/asn enrichment. Same absence rule.
    pub geo_asn: Option<maxminddb::Reader<Vec<u8>>>,

    /// Hostname lookup results keyed by IP. A `None` value records a failed
    /// lookup so the same dead IP is not retried on every event.
    pub hostname_cache: Arc<RwLock<HashMap<String, Option<String>>>>,
}

impl AppState {
    /// Construct the state, loading whichever MaxMind databases exist at the
    /// configured paths. Missing or unreadable files disable that enrichment
    /// rather than failing startup.
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let geo_city = open_mmdb(&config.geoip_city_path, "city");
        let geo_asn = open_mmdb(&config.geoip_asn_path, "asn");
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
            geo_city,
            geo_asn,
            hostname_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

fn open_mmdb(path: &str, kind: &str) -> Option<maxminddb::Reader<Vec<u8>>> {
    if !std::path::Path::new(path).exists() {
        return None;
    }
    match maxminddb::Reader::open_readfile(path) {
        Ok(reader) => Some(reader),
        Err(e) => {
            warn!(path, kind, error = %e, "Failed to open MaxMind database");
            None
        }
    }
}
