#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    /// DuckDB memory ceiling, e.g. "512MB".
    pub duckdb_memory_limit: String,
    /// Schemas the table browser may touch. Everything else (system catalogs
    /// included) is invisible and unreachable.
    pub schema_allow_list: Vec<String>,
    /// Estimated row count above which table-rows skips the COUNT query and
    /// reports total as null.
    pub count_threshold: i64,
    pub geoip_city_path: String,
    pub geoip_asn_path: String,
    /// Optional IP-metadata endpoint for hostname enrichment. `{ip}` in the
    /// URL is replaced per lookup; unset disables hostname resolution.
    pub ip_lookup_url: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("KOMPASS_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("KOMPASS_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            duckdb_memory_limit: std::env::var("KOMPASS_DUCKDB_MEMORY_LIMIT")
                .unwrap_or_else(|_| "512MB".to_string()),
            schema_allow_list: std::env::var("KOMPASS_SCHEMA_ALLOW_LIST")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["public".to_string()]),
            count_threshold: std::env::var("KOMPASS_COUNT_THRESHOLD")
                .unwrap_or_else(|_| "500000".to_string())
                .parse()
                .unwrap_or(500_000),
            geoip_city_path: std::env::var("KOMPASS_GEOIP_CITY_PATH")
                .unwrap_or_else(|_| "./GeoLite2-City.mmdb".to_string()),
            geoip_asn_path: std::env::var("KOMPASS_GEOIP_ASN_PATH")
                .unwrap_or_else(|_| "./GeoLite2-ASN.mmdb".to_string()),
            ip_lookup_url: std::env::var("KOMPASS_IP_LOOKUP_URL").ok().filter(|v| !v.is_empty()),
            cors_origins: std::env::var("KOMPASS_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}
