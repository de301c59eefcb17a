use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use super::{DatabaseEnvelope, DatabaseMetadata, CURRENT_VERSION};
use crate::logging::logger;
use crate::stations::identity::freeze_identity;
use crate::stations::{CheckResult, EnrichmentFeature, IdAlgorithm, Station};

type Step = fn(&Migrator, DatabaseEnvelope) -> DatabaseEnvelope;

/// Ordered upgrade chain, keyed by source version.
static STEPS: [(u32, &str, Step); 9] = [
    (1, "migrate_1_to_2", Migrator::migrate_1_to_2),
    (2, "migrate_2_to_3", Migrator::migrate_2_to_3),
    (3, "migrate_3_to_4", Migrator::migrate_3_to_4),
    (4, "migrate_4_to_5", Migrator::migrate_4_to_5),
    (5, "migrate_5_to_6", Migrator::migrate_5_to_6),
    (6, "migrate_6_to_7", Migrator::migrate_6_to_7),
    (7, "migrate_7_to_8", Migrator::migrate_7_to_8),
    (8, "migrate_8_to_9", Migrator::migrate_8_to_9),
    (9, "migrate_9_to_10", Migrator::migrate_9_to_10),
];

pub fn needs_migration(envelope: &DatabaseEnvelope) -> bool {
    envelope.version < CURRENT_VERSION
}

/// Brings `envelope` to [`CURRENT_VERSION`] with the wall clock as "now".
pub fn migrate(envelope: DatabaseEnvelope) -> DatabaseEnvelope {
    Migrator::new().migrate(envelope).0
}

/// A change of identity algorithm crossed by a migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityChange {
    pub at_version: u32,
    pub previous: IdAlgorithm,
    pub current: IdAlgorithm,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub applied_steps: Vec<&'static str>,
    pub identity_changes: Vec<IdentityChange>,
}

impl MigrationReport {
    pub fn migrated(&self) -> bool {
        !self.applied_steps.is_empty()
    }

    pub fn identity_changed(&self) -> bool {
        !self.identity_changes.is_empty()
    }
}

/// Runs the version chain. Steps are pure apart from the injected clock,
/// which is only used to synthesize envelope metadata.
#[derive(Debug, Clone, Copy)]
pub struct Migrator {
    now: DateTime<Utc>,
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Migrator {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Applies steps one at a time until the envelope is current.
    ///
    /// Every intermediate value is a complete envelope, so stopping between
    /// steps never leaves a half-migrated record set.
    pub fn migrate(&self, mut envelope: DatabaseEnvelope) -> (DatabaseEnvelope, MigrationReport) {
        let mut report = MigrationReport {
            from_version: envelope.version,
            to_version: envelope.version,
            ..MigrationReport::default()
        };

        while needs_migration(&envelope) {
            let source = envelope.version;
            let Some((_, name, step)) = STEPS.iter().find(|(from, _, _)| *from == source) else {
                break;
            };

            let records = envelope.stations.len();
            envelope = step(self, envelope);
            if envelope.version == source {
                break;
            }
            debug_assert_eq!(records, envelope.stations.len());

            let previous = IdAlgorithm::for_schema_version(source);
            let current = IdAlgorithm::for_schema_version(envelope.version);
            if previous != current {
                report.identity_changes.push(IdentityChange {
                    at_version: envelope.version,
                    previous,
                    current,
                });
            }
            report.applied_steps.push(*name);

            if let Some(log) = logger() {
                log.debug(
                    "migration.step",
                    json!({
                        "step": name,
                        "version": envelope.version,
                        "stations": records,
                    }),
                );
            }
        }

        report.to_version = envelope.version;
        (envelope, report)
    }

    /// Folds the legacy `isWorking` flag into the new health record.
    pub fn migrate_1_to_2(&self, envelope: DatabaseEnvelope) -> DatabaseEnvelope {
        map_stations(envelope, 1, |mut station| {
            if let Some(working) = station.legacy_is_working.take() {
                let url = station.stream_url.clone();
                if let Some(slot) = station.health.stream.for_url_mut(&url) {
                    if *slot == CheckResult::Unknown {
                        *slot = CheckResult::from_flag(working);
                    }
                }
            }
            station
        })
    }

    /// Labels, the curated flag and credits arrive with neutral defaults on
    /// decode; the envelope gains its metadata block.
    pub fn migrate_2_to_3(&self, envelope: DatabaseEnvelope) -> DatabaseEnvelope {
        let mut envelope = map_stations(envelope, 2, |station| station);
        if envelope.version == 3 {
            envelope
                .metadata
                .get_or_insert_with(|| DatabaseMetadata::synthesized(self.now));
        }
        envelope
    }

    /// Drops `lastCheckedDate`, keeping its value as the health check time.
    pub fn migrate_3_to_4(&self, envelope: DatabaseEnvelope) -> DatabaseEnvelope {
        map_stations(envelope, 3, |mut station| {
            if let Some(checked) = station.legacy_last_checked_date.take() {
                station.health.last_check.get_or_insert(checked);
            }
            station
        })
    }

    /// Country joins the identity key. Records are untouched; user data keyed
    /// by the old identifiers is remapped by reconciliation.
    pub fn migrate_4_to_5(&self, envelope: DatabaseEnvelope) -> DatabaseEnvelope {
        map_stations(envelope, 4, |station| station)
    }

    pub fn migrate_5_to_6(&self, envelope: DatabaseEnvelope) -> DatabaseEnvelope {
        map_stations(envelope, 5, |mut station| {
            for feature in [
                EnrichmentFeature::HealthCheck,
                EnrichmentFeature::Location,
                EnrichmentFeature::Genre,
            ] {
                station.enrichment.introduce(feature);
            }
            station
        })
    }

    /// Quality check flag (decoded as `open` when absent) and the copyright,
    /// homepage and metadata enrichment features.
    pub fn migrate_6_to_7(&self, envelope: DatabaseEnvelope) -> DatabaseEnvelope {
        map_stations(envelope, 6, |mut station| {
            for feature in [
                EnrichmentFeature::Copyright,
                EnrichmentFeature::Homepage,
                EnrichmentFeature::Metadata,
            ] {
                station.enrichment.introduce(feature);
            }
            station
        })
    }

    /// Favicon download tracking.
    pub fn migrate_7_to_8(&self, envelope: DatabaseEnvelope) -> DatabaseEnvelope {
        map_stations(envelope, 7, |mut station| {
            station.enrichment.introduce(EnrichmentFeature::Favicon);
            station
        })
    }

    /// Queue states `planned` and `skipped` become valid. No data change.
    pub fn migrate_8_to_9(&self, envelope: DatabaseEnvelope) -> DatabaseEnvelope {
        map_stations(envelope, 8, |station| station)
    }

    /// Codec and bitrate join the identity key, and every record's identifier
    /// under the new key is frozen as its persisted identifier.
    pub fn migrate_9_to_10(&self, envelope: DatabaseEnvelope) -> DatabaseEnvelope {
        map_stations(envelope, 9, |mut station| {
            freeze_identity(&mut station);
            station
        })
    }
}

/// Applies `transform` to every record when the envelope is at `from`, then
/// bumps the version. Any other version passes through unchanged.
fn map_stations<F>(mut envelope: DatabaseEnvelope, from: u32, transform: F) -> DatabaseEnvelope
where
    F: FnMut(Station) -> Station,
{
    if envelope.version != from {
        return envelope;
    }
    envelope.stations = envelope.stations.into_iter().map(transform).collect();
    envelope.version = from + 1;
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::decode_database;
    use crate::stations::{identity, EnrichmentState, EnrichmentStatus, HealthStatus};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn envelope_at(version: u32, stations: Vec<Station>) -> DatabaseEnvelope {
        DatabaseEnvelope {
            version,
            stations,
            metadata: None,
        }
    }

    fn v1_station(url: &str) -> Station {
        Station {
            name: url.to_string(),
            stream_url: url.to_string(),
            ..Station::default()
        }
    }

    #[test]
    fn version_one_blob_needs_migration() {
        let blob = br#"[{"streamURL":"http://a.com/s1"},{"streamURL":"https://b.com/s2"}]"#;
        let envelope = decode_database(blob).unwrap();
        assert_eq!(envelope.version, 1);
        assert!(needs_migration(&envelope));
    }

    #[test]
    fn full_chain_reaches_current_version_without_losing_records() {
        let stations = vec![
            v1_station("http://a.com/s1"),
            v1_station("https://b.com/s2"),
            v1_station(""),
        ];
        let (migrated, report) = Migrator::at(now()).migrate(envelope_at(1, stations));

        assert_eq!(migrated.version, CURRENT_VERSION);
        assert_eq!(migrated.stations.len(), 3);
        assert_eq!(report.from_version, 1);
        assert_eq!(report.to_version, CURRENT_VERSION);
        assert_eq!(report.applied_steps.len(), 9);
        assert!(!needs_migration(&migrated));
        assert!(migrated
            .stations
            .iter()
            .all(|station| station.persistent_id.is_some()));
        for station in &migrated.stations {
            for feature in EnrichmentFeature::ALL {
                assert_eq!(station.enrichment.state(feature), EnrichmentState::NotStarted);
                assert!(station.enrichment.is_tracked(feature));
            }
        }
    }

    #[test]
    fn migration_is_idempotent_at_the_fixed_point() {
        let migrator = Migrator::at(now());
        let (once, _) = migrator.migrate(envelope_at(4, vec![v1_station("http://a.com/s")]));
        let (twice, report) = migrator.migrate(once.clone());

        assert_eq!(twice, once);
        assert!(!report.migrated());
    }

    #[test]
    fn steps_ignore_envelopes_at_other_versions() {
        let migrator = Migrator::at(now());
        let envelope = envelope_at(5, vec![v1_station("http://a.com/s")]);

        assert_eq!(migrator.migrate_1_to_2(envelope.clone()), envelope);
        assert_eq!(migrator.migrate_9_to_10(envelope.clone()), envelope);
        assert_eq!(migrator.migrate_5_to_6(envelope.clone()).version, 6);
    }

    #[test]
    fn reports_identity_algorithm_changes_crossed() {
        let (_, report) = Migrator::at(now()).migrate(envelope_at(3, vec![]));
        assert_eq!(
            report.identity_changes,
            vec![
                IdentityChange {
                    at_version: 5,
                    previous: IdAlgorithm::UrlOnly,
                    current: IdAlgorithm::UrlCountry,
                },
                IdentityChange {
                    at_version: 10,
                    previous: IdAlgorithm::UrlCountry,
                    current: IdAlgorithm::Full,
                },
            ]
        );

        let (_, late) = Migrator::at(now()).migrate(envelope_at(6, vec![]));
        assert_eq!(late.identity_changes.len(), 1);
    }

    #[test]
    fn legacy_working_flag_seeds_stream_health() {
        let mut down = v1_station("http://down.example.com/s");
        down.legacy_is_working = Some(false);
        let mut up = v1_station("https://up.example.com/s");
        up.legacy_is_working = Some(true);

        let migrated = Migrator::at(now()).migrate_1_to_2(envelope_at(1, vec![down, up]));

        assert_eq!(migrated.version, 2);
        let down = &migrated.stations[0];
        assert_eq!(down.health.stream.http, CheckResult::Failed);
        assert_eq!(down.health.stream.https, CheckResult::Unknown);
        assert_eq!(down.legacy_is_working, None);
        assert_eq!(migrated.stations[1].health.stream.https, CheckResult::Ok);
        assert_eq!(migrated.stations[1].health.favicon, Default::default());
    }

    #[test]
    fn metadata_is_synthesized_once() {
        let migrator = Migrator::at(now());
        let migrated = migrator.migrate_2_to_3(envelope_at(2, vec![]));
        assert_eq!(migrated.metadata, Some(DatabaseMetadata::synthesized(now())));

        let mut named = envelope_at(2, vec![]);
        named.metadata = Some(DatabaseMetadata {
            name: Some("Mine".into()),
            ..DatabaseMetadata::default()
        });
        let kept = migrator.migrate_2_to_3(named);
        assert_eq!(kept.metadata.unwrap().name.as_deref(), Some("Mine"));
    }

    #[test]
    fn deprecated_check_date_moves_into_health() {
        let checked = Utc.with_ymd_and_hms(2021, 7, 4, 10, 0, 0).unwrap();
        let mut legacy = v1_station("https://a.com/s");
        legacy.legacy_last_checked_date = Some(checked);

        let newer = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        let mut both = v1_station("https://b.com/s");
        both.legacy_last_checked_date = Some(checked);
        both.health = HealthStatus {
            last_check: Some(newer),
            ..HealthStatus::default()
        };

        let migrated = Migrator::at(now()).migrate_3_to_4(envelope_at(3, vec![legacy, both]));
        assert_eq!(migrated.stations[0].health.last_check, Some(checked));
        assert_eq!(migrated.stations[0].legacy_last_checked_date, None);
        assert_eq!(migrated.stations[1].health.last_check, Some(newer));

        let encoded = serde_json::to_value(&migrated).unwrap();
        assert!(encoded["stations"][0].get("lastCheckedDate").is_none());
    }

    #[test]
    fn enrichment_features_are_introduced_as_not_started() {
        let mut station = v1_station("https://a.com/s");
        station.enrichment = EnrichmentStatus::default();
        station
            .enrichment
            .set(EnrichmentFeature::Genre, EnrichmentState::Completed);

        let migrator = Migrator::at(now());
        let at6 = migrator.migrate_5_to_6(envelope_at(5, vec![station]));
        let enrichment = &at6.stations[0].enrichment;
        assert_eq!(enrichment.state(EnrichmentFeature::Genre), EnrichmentState::Completed);
        assert_eq!(enrichment.location, Some(EnrichmentState::NotStarted));
        assert!(!enrichment.is_tracked(EnrichmentFeature::Favicon));

        let at8 = migrator.migrate_7_to_8(migrator.migrate_6_to_7(at6));
        let enrichment = &at8.stations[0].enrichment;
        assert_eq!(enrichment.favicon, Some(EnrichmentState::NotStarted));
        assert_eq!(enrichment.metadata, Some(EnrichmentState::NotStarted));
    }

    #[test]
    fn final_step_freezes_full_identity_and_respects_existing_ids() {
        let fresh = v1_station("http://a.com/s");
        let mut kept = v1_station("http://b.com/s");
        kept.persistent_id = Some("kept-id".into());

        let migrated = Migrator::at(now()).migrate_9_to_10(envelope_at(9, vec![fresh.clone(), kept]));
        assert_eq!(
            migrated.stations[0].persistent_id,
            Some(identity::derive_id(&IdAlgorithm::Full.canonical_key(&fresh)))
        );
        assert_eq!(migrated.stations[1].persistent_id.as_deref(), Some("kept-id"));
    }
}
