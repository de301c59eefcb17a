mod id_map;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

pub use id_map::IdMigrationMap;

use crate::logging::logger;
use crate::stations::{identity, Station};

/// A user-data store keyed by station identifier.
pub trait KeyedStore {
    fn store_name(&self) -> &'static str;

    /// Re-keys entries found in `map`; counts entries that are neither current
    /// nor mapped. Re-keyed entries get `now` as their modification time.
    fn reconcile(
        &mut self,
        map: &IdMigrationMap,
        current_ids: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> ReconcileOutcome;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub store: &'static str,
    pub remapped: usize,
    /// Entries that landed on an id the store already held and were folded in.
    pub merged: usize,
    /// Entries for stations that can no longer be identified. They are kept.
    pub orphaned: usize,
}

impl ReconcileOutcome {
    pub fn new(store: &'static str) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }

    /// Records the outcome of one key and returns the key the entry should use.
    pub fn track(
        &mut self,
        id: &str,
        map: &IdMigrationMap,
        current_ids: &HashSet<String>,
    ) -> KeyDisposition {
        let disposition = KeyDisposition::classify(id, map, current_ids);
        match disposition {
            KeyDisposition::Current => {}
            KeyDisposition::Remapped(_) => self.remapped += 1,
            KeyDisposition::Orphaned => self.orphaned += 1,
        }
        disposition
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyDisposition {
    Current,
    Remapped(String),
    Orphaned,
}

impl KeyDisposition {
    pub fn classify(id: &str, map: &IdMigrationMap, current_ids: &HashSet<String>) -> Self {
        if current_ids.contains(id) {
            return KeyDisposition::Current;
        }
        match map.get(id) {
            Some(new_id) => KeyDisposition::Remapped(new_id.to_string()),
            None => KeyDisposition::Orphaned,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub mappings: usize,
    pub collisions: usize,
    pub outcomes: Vec<ReconcileOutcome>,
}

impl ReconcileSummary {
    pub fn orphaned(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.orphaned).sum()
    }

    pub fn remapped(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.remapped).sum()
    }
}

/// Identifiers of the current record set.
pub fn current_ids(stations: &[Station]) -> HashSet<String> {
    stations.iter().map(identity::resolve).collect()
}

/// Runs `map` against every store and logs what could not be carried over.
pub fn reconcile_stores(
    stores: &mut [&mut dyn KeyedStore],
    map: &IdMigrationMap,
    current_ids: &HashSet<String>,
    now: DateTime<Utc>,
) -> ReconcileSummary {
    let mut summary = ReconcileSummary {
        mappings: map.len(),
        collisions: map.collisions(),
        outcomes: Vec::with_capacity(stores.len()),
    };

    for store in stores.iter_mut() {
        let outcome = store.reconcile(map, current_ids, now);
        if let Some(log) = logger() {
            if outcome.orphaned > 0 {
                log.warn(
                    "reconcile.orphaned",
                    json!({ "store": outcome.store, "orphaned": outcome.orphaned }),
                );
            }
            log.info("reconcile.store", &outcome);
        }
        summary.outcomes.push(outcome);
    }

    summary
}
