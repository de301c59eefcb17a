use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};

/// One radio stream as stored in the station database.
///
/// Every field decodes leniently: a missing or malformed value falls back to
/// its neutral default instead of failing the whole record.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    #[serde(rename = "persistentID", default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub persistent_id: Option<String>,
    /// Random identifier minted for records without a usable stream URL.
    #[serde(rename = "legacyID", default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub legacy_id: Option<String>,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub name: String,
    #[serde(rename = "streamURL", default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub stream_url: String,
    #[serde(rename = "homepageURL", default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub homepage_url: String,
    #[serde(rename = "faviconURL", default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub favicon_url: String,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub tags: Vec<String>,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub codec: String,
    /// Kilobits per second, zero when unknown.
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub bitrate: u32,
    /// ISO country code.
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub supports_metadata: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub last_played_date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub health: HealthStatus,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub labels: Vec<String>,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub curated: bool,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub quality_check: QualityCheck,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub location: Option<StationLocation>,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub enrichment: EnrichmentStatus,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub credits: String,

    /// Pre-health reachability flag, folded into `health` by the 1→2 step.
    #[serde(rename = "isWorking", default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub legacy_is_working: Option<bool>,
    /// Deprecated check timestamp, folded into `health.last_check` by the 3→4 step.
    #[serde(rename = "lastCheckedDate", default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub legacy_last_checked_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckResult {
    #[default]
    Unknown,
    Ok,
    Failed,
}

impl CheckResult {
    pub fn from_flag(working: bool) -> Self {
        if working {
            CheckResult::Ok
        } else {
            CheckResult::Failed
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolChecks {
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub http: CheckResult,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub https: CheckResult,
}

impl ProtocolChecks {
    /// Slot for the protocol of `url`, if it is plain or secure HTTP.
    pub fn for_url_mut(&mut self, url: &str) -> Option<&mut CheckResult> {
        let scheme = url.trim().split_once("://")?.0.to_ascii_lowercase();
        match scheme.as_str() {
            "http" => Some(&mut self.http),
            "https" => Some(&mut self.https),
            _ => None,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub stream: ProtocolChecks,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub favicon: ProtocolChecks,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub homepage: ProtocolChecks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub last_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualityCheck {
    #[default]
    Open,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationLocation {
    #[serde(default)]
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Progress of one background enrichment task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnrichmentState {
    #[default]
    NotStarted,
    Planned,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrichmentFeature {
    HealthCheck,
    Location,
    Genre,
    Favicon,
    Copyright,
    Homepage,
    Metadata,
}

impl EnrichmentFeature {
    pub const ALL: [EnrichmentFeature; 7] = [
        EnrichmentFeature::HealthCheck,
        EnrichmentFeature::Location,
        EnrichmentFeature::Genre,
        EnrichmentFeature::Favicon,
        EnrichmentFeature::Copyright,
        EnrichmentFeature::Homepage,
        EnrichmentFeature::Metadata,
    ];
}

/// Per-feature enrichment tracking.
///
/// A `None` slot means the schema version the record came from did not know
/// the feature yet; migration steps fill it in as they introduce it.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub health_check: Option<EnrichmentState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub location: Option<EnrichmentState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub genre: Option<EnrichmentState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub favicon: Option<EnrichmentState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub copyright: Option<EnrichmentState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub homepage: Option<EnrichmentState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub metadata: Option<EnrichmentState>,
}

impl EnrichmentStatus {
    /// Status with every feature tracked and not started.
    pub fn fresh() -> Self {
        let mut status = Self::default();
        for feature in EnrichmentFeature::ALL {
            status.introduce(feature);
        }
        status
    }

    fn slot_mut(&mut self, feature: EnrichmentFeature) -> &mut Option<EnrichmentState> {
        match feature {
            EnrichmentFeature::HealthCheck => &mut self.health_check,
            EnrichmentFeature::Location => &mut self.location,
            EnrichmentFeature::Genre => &mut self.genre,
            EnrichmentFeature::Favicon => &mut self.favicon,
            EnrichmentFeature::Copyright => &mut self.copyright,
            EnrichmentFeature::Homepage => &mut self.homepage,
            EnrichmentFeature::Metadata => &mut self.metadata,
        }
    }

    pub fn state(&self, feature: EnrichmentFeature) -> EnrichmentState {
        let slot = match feature {
            EnrichmentFeature::HealthCheck => self.health_check,
            EnrichmentFeature::Location => self.location,
            EnrichmentFeature::Genre => self.genre,
            EnrichmentFeature::Favicon => self.favicon,
            EnrichmentFeature::Copyright => self.copyright,
            EnrichmentFeature::Homepage => self.homepage,
            EnrichmentFeature::Metadata => self.metadata,
        };
        slot.unwrap_or_default()
    }

    pub fn set(&mut self, feature: EnrichmentFeature, state: EnrichmentState) {
        *self.slot_mut(feature) = Some(state);
    }

    pub fn is_tracked(&self, feature: EnrichmentFeature) -> bool {
        match feature {
            EnrichmentFeature::HealthCheck => self.health_check.is_some(),
            EnrichmentFeature::Location => self.location.is_some(),
            EnrichmentFeature::Genre => self.genre.is_some(),
            EnrichmentFeature::Favicon => self.favicon.is_some(),
            EnrichmentFeature::Copyright => self.copyright.is_some(),
            EnrichmentFeature::Homepage => self.homepage.is_some(),
            EnrichmentFeature::Metadata => self.metadata.is_some(),
        }
    }

    /// Starts tracking `feature` as not started, keeping any existing state.
    pub fn introduce(&mut self, feature: EnrichmentFeature) {
        self.slot_mut(feature)
            .get_or_insert(EnrichmentState::NotStarted);
    }
}

impl Station {
    /// A new, current-version record for `stream_url`.
    pub fn new(name: impl Into<String>, stream_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stream_url: stream_url.into(),
            enrichment: EnrichmentStatus::fresh(),
            ..Self::default()
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>, bitrate: u32) -> Self {
        self.codec = codec.into();
        self.bitrate = bitrate;
        self
    }

    pub fn has_stream_url(&self) -> bool {
        !self.stream_url.trim().is_empty()
    }
}
