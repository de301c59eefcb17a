use serde::Serialize;
use url::Url;
use uuid::Uuid;

use super::Station;

/// Namespace for name-based station identifiers. Changing it would orphan
/// every identifier ever derived, so it is fixed forever.
const STATION_NAMESPACE: Uuid = Uuid::from_u128(0x3a7c_1f52_9d4e_4b8a_b6f0_2e5d_8c91_a4f3);

/// Field set that went into a derived identifier.
///
/// Each later algorithm appends more disambiguators to the same normalized URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IdAlgorithm {
    /// Normalized URL only.
    UrlOnly,
    /// URL plus country.
    UrlCountry,
    /// URL plus country, codec and bitrate.
    Full,
}

impl IdAlgorithm {
    pub const CURRENT: IdAlgorithm = IdAlgorithm::Full;

    /// Algorithm that derived identifiers for records stored at `version`.
    pub fn for_schema_version(version: u32) -> Self {
        match version {
            0..=4 => IdAlgorithm::UrlOnly,
            5..=9 => IdAlgorithm::UrlCountry,
            _ => IdAlgorithm::Full,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdAlgorithm::UrlOnly => "urlOnly",
            IdAlgorithm::UrlCountry => "urlCountry",
            IdAlgorithm::Full => "full",
        }
    }

    pub fn canonical_key(&self, station: &Station) -> String {
        match self {
            IdAlgorithm::UrlOnly => canonicalize(&station.stream_url, None, None, None),
            IdAlgorithm::UrlCountry => {
                canonicalize(&station.stream_url, Some(&station.country), None, None)
            }
            IdAlgorithm::Full => canonicalize(
                &station.stream_url,
                Some(&station.country),
                Some(&station.codec),
                Some(station.bitrate),
            ),
        }
    }
}

/// Builds the identity key for a stream.
///
/// `http` and `https` collapse to `https`, default ports, query and fragment are
/// dropped, host and path are lowercased and a single trailing slash is removed.
/// Disambiguators are appended in the fixed order country, codec, bitrate.
/// Input that does not parse as a URL is used trimmed as-is.
pub fn canonicalize(
    url: &str,
    country: Option<&str>,
    codec: Option<&str>,
    bitrate: Option<u32>,
) -> String {
    let mut key = canonical_url(url);

    if let Some(country) = country.map(str::trim).filter(|value| !value.is_empty()) {
        key.push_str("|country:");
        key.push_str(&country.to_uppercase());
    }
    if let Some(codec) = codec.map(str::trim).filter(|value| !value.is_empty()) {
        key.push_str("|codec:");
        key.push_str(&codec.to_uppercase());
    }
    if let Some(bitrate) = bitrate.filter(|value| *value > 0) {
        key.push_str("|bitrate:");
        key.push_str(&bitrate.to_string());
    }

    key
}

fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(parsed) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    let scheme = match parsed.scheme() {
        "http" | "https" => "https".to_string(),
        other => other.to_ascii_lowercase(),
    };

    let mut path = parsed.path().to_lowercase();
    if path.ends_with('/') {
        path.pop();
    }
    if path.is_empty() {
        path.push('/');
    }

    match parsed.host_str() {
        Some(host) => {
            let mut canonical = format!("{scheme}://{}", host.to_lowercase());
            if let Some(port) = parsed.port().filter(|port| *port != 443 && *port != 80) {
                canonical.push(':');
                canonical.push_str(&port.to_string());
            }
            canonical.push_str(&path);
            canonical
        }
        None => format!("{scheme}:{path}"),
    }
}

/// Name-based (v5) identifier for a canonical key, lowercase hyphenated.
pub fn derive_id(key: &str) -> String {
    Uuid::new_v5(&STATION_NAMESPACE, key.as_bytes()).to_string()
}

/// Identifier for a bare stream URL, with no disambiguators.
pub fn generate_id(url: &str) -> String {
    derive_id(&canonicalize(url, None, None, None))
}

/// Current identifier of `station`.
///
/// A persisted identifier always wins. Records without a stream URL fall back
/// to their stored random identifier, or a freshly minted one.
pub fn resolve(station: &Station) -> String {
    if let Some(id) = persisted(station) {
        return id.to_string();
    }
    if !station.has_stream_url() {
        return station
            .legacy_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
    }
    derive_id(&IdAlgorithm::CURRENT.canonical_key(station))
}

/// Like [`resolve`], but stores a minted fallback identifier on the record so
/// later calls agree.
pub fn resolve_mut(station: &mut Station) -> String {
    if persisted(station).is_none() && !station.has_stream_url() {
        return station
            .legacy_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
    }
    resolve(station)
}

/// Identifier `station` had under `algorithm`, ignoring any persisted one.
///
/// Returns `None` for records whose fallback identifier was never stored.
pub fn legacy_id(station: &Station, algorithm: IdAlgorithm) -> Option<String> {
    if !station.has_stream_url() {
        return station.legacy_id.clone();
    }
    Some(derive_id(&algorithm.canonical_key(station)))
}

/// Makes the current identifier permanent. Returns `true` when it was newly set.
pub fn freeze_identity(station: &mut Station) -> bool {
    if persisted(station).is_some() {
        return false;
    }
    let id = resolve_mut(station);
    station.persistent_id = Some(id);
    true
}

fn persisted(station: &Station) -> Option<&str> {
    station
        .persistent_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
}
