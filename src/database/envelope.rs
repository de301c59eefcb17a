use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use serde_with::{serde_as, DefaultOnError};

use super::DatabaseError;
use crate::logging::logger;
use crate::stations::{build_stations_fingerprint, Station};

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 10;
/// Version assumed for blobs that do not declare one.
pub const OLDEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseEnvelope {
    pub version: u32,
    pub stations: Vec<Station>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DatabaseMetadata>,
}

/// Fields decode independently; a malformed one is reset without losing the rest.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub extras: Map<String, Value>,
}

impl DatabaseMetadata {
    pub fn synthesized(now: DateTime<Utc>) -> Self {
        Self {
            created_at: Some(now),
            modified_at: Some(now),
            ..Self::default()
        }
    }
}

impl DatabaseEnvelope {
    /// Empty database at the current version.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: CURRENT_VERSION,
            stations: vec![],
            metadata: Some(DatabaseMetadata::synthesized(now)),
        }
    }

    pub fn with_stations(mut self, stations: Vec<Station>) -> Self {
        self.stations = stations;
        self
    }

    pub fn fingerprint(&self) -> Result<String, DatabaseError> {
        build_stations_fingerprint(&self.stations).map_err(DatabaseError::Encode)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        let metadata = self
            .metadata
            .get_or_insert_with(|| DatabaseMetadata::synthesized(now));
        metadata.modified_at = Some(now);
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredDatabase {
    Envelope(StoredEnvelope),
    Bare(Vec<Value>),
}

#[derive(Deserialize)]
struct StoredEnvelope {
    #[serde(default)]
    version: Option<SchemaVersionValue>,
    stations: Vec<Value>,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaVersionValue {
    Number(i64),
    String(String),
    Other(Value),
}

impl SchemaVersionValue {
    /// Versions past `u32::MAX` saturate so they still read as newer than this
    /// build. Negative, fractional and malformed values read as the oldest.
    fn resolve(self) -> u32 {
        let raw: Option<i128> = match self {
            SchemaVersionValue::Number(value) => Some(value.into()),
            SchemaVersionValue::String(value) => value.trim().parse().ok(),
            SchemaVersionValue::Other(Value::Number(number)) => number.as_u64().map(i128::from),
            SchemaVersionValue::Other(_) => None,
        };
        match raw {
            Some(value) if value >= i128::from(OLDEST_VERSION) => {
                u32::try_from(value).unwrap_or(u32::MAX)
            }
            _ => OLDEST_VERSION,
        }
    }
}

/// Decodes a stored database blob.
///
/// Accepts the versioned envelope as well as the bare record list written by
/// the first schema. Individual records and the metadata block degrade
/// instead of failing; only a document that is not JSON of either shape is an
/// error.
pub fn decode_database(bytes: &[u8]) -> Result<DatabaseEnvelope, DatabaseError> {
    let stored: StoredDatabase = serde_json::from_slice(bytes).map_err(DatabaseError::Decode)?;

    let (version, raw_stations, raw_metadata) = match stored {
        StoredDatabase::Envelope(envelope) => (
            envelope
                .version
                .map(SchemaVersionValue::resolve)
                .unwrap_or(OLDEST_VERSION),
            envelope.stations,
            envelope.metadata,
        ),
        StoredDatabase::Bare(stations) => (OLDEST_VERSION, stations, None),
    };

    let total = raw_stations.len();
    let mut stations = Vec::with_capacity(total);
    for (index, raw) in raw_stations.into_iter().enumerate() {
        match serde_json::from_value::<Station>(raw) {
            Ok(station) => stations.push(station),
            Err(err) => {
                if let Some(log) = logger() {
                    log.warn(
                        "database.decode.record_skipped",
                        json!({ "index": index, "error": err.to_string() }),
                    );
                }
            }
        }
    }

    let metadata = raw_metadata
        .filter(|value| !value.is_null())
        .and_then(|value| match serde_json::from_value::<DatabaseMetadata>(value) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                if let Some(log) = logger() {
                    log.warn(
                        "database.decode.metadata_dropped",
                        json!({ "error": err.to_string() }),
                    );
                }
                None
            }
        });

    if let Some(log) = logger() {
        log.debug(
            "database.decoded",
            json!({
                "version": version,
                "records": total,
                "decoded": stations.len(),
            }),
        );
    }

    Ok(DatabaseEnvelope {
        version,
        stations,
        metadata,
    })
}

pub fn encode_database(envelope: &DatabaseEnvelope) -> Result<Vec<u8>, DatabaseError> {
    serde_json::to_vec_pretty(envelope).map_err(DatabaseError::Encode)
}
