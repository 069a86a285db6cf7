use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum number of events accepted in a single ingestion batch.
pub const MAX_BATCH_SIZE: usize = 50;

/// The payload a reporting client sends to POST /api/analytics/events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackPayload {
    pub name: String,
    /// Arbitrary JSON object; stored opaque, never trusted as SQL.
    pub props: Option<serde_json::Value>,
    pub path: Option<String>,
    pub referrer: Option<String>,
    /// Client-persisted session identifier. When absent the server derives a
    /// daily fallback from IP and User-Agent.
    pub session_id: Option<String>,
}

/// Accepts either a single event or a batch array at the ingestion endpoint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TrackOrBatch {
    Single(Box<TrackPayload>),
    Batch(Vec<TrackPayload>),
}

/// The enriched, stored version of an event. Mirrors the `events` table
/// columns exactly. Append-only; `id` and `created_at` are assigned at
/// insert and rows are never updated or deleted by normal flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: String,
    pub name: String,
    /// Arbitrary JSON properties. Serialized to text for storage and parsed
    /// back when read, so API consumers always see the object form.
    #[serde(default)]
    pub props: serde_json::Value,
    pub path: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: String,
    pub ip: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub org: Option<String>,
    pub asn: Option<i64>,
    pub hostname: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Compute a fallback session ID from IP and User-Agent.
///
/// Formula: sha256(salt_epoch + ip + user_agent)[0..8] encoded as 16 hex chars.
/// The salt_epoch rotates daily at midnight UTC. Clients that persist their
/// own session_id are unaffected; the fallback only applies to payloads that
/// carry none.
pub fn fallback_session_id(ip: &str, user_agent: &str) -> String {
    let salt_epoch = Utc::now().timestamp() / 86400;
    let input = format!("{}{}{}", salt_epoch, ip, user_agent);
    let hash = Sha256::digest(input.as_bytes());
    hex::encode(&hash[..8])
}
