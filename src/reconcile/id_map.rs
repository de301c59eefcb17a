use std::collections::{HashMap, HashSet};

use crate::stations::identity::{legacy_id, resolve};
use crate::stations::{IdAlgorithm, Station};

const LEGACY_ALGORITHMS: [IdAlgorithm; 2] = [IdAlgorithm::UrlOnly, IdAlgorithm::UrlCountry];

/// Old-algorithm identifier to current persisted identifier.
///
/// Built once per identity change and discarded after the keyed stores have
/// been re-keyed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMigrationMap {
    entries: HashMap<String, String>,
    /// `(old, new)` pairs that lost an old identifier to an earlier station.
    collisions: HashSet<(String, String)>,
}

impl IdMigrationMap {
    /// Maps every station's identifier under `previous` to its current one.
    ///
    /// When two stations shared an identifier under `previous` the first in
    /// collection order keeps it; later ones are counted as collisions.
    pub fn build(stations: &[Station], previous: IdAlgorithm) -> Self {
        let mut map = Self::default();
        map.extend(stations, previous);
        map
    }

    /// Covers every algorithm older than the current one, oldest first.
    ///
    /// User data written by any earlier release may still be keyed by the
    /// URL-only identifier, whatever schema version the database was at.
    pub fn legacy(stations: &[Station]) -> Self {
        let mut map = Self::default();
        for algorithm in LEGACY_ALGORITHMS {
            debug_assert_ne!(algorithm, IdAlgorithm::CURRENT);
            map.extend(stations, algorithm);
        }
        map
    }

    fn extend(&mut self, stations: &[Station], previous: IdAlgorithm) {
        for station in stations {
            let Some(old_id) = legacy_id(station, previous) else {
                continue;
            };
            let new_id = resolve(station);
            if old_id == new_id {
                continue;
            }
            match self.entries.get(&old_id) {
                Some(existing) if *existing != new_id => {
                    self.collisions.insert((old_id, new_id));
                }
                Some(_) => {}
                None => {
                    self.entries.insert(old_id, new_id);
                }
            }
        }
    }

    pub fn get(&self, old_id: &str) -> Option<&str> {
        self.entries.get(old_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Legacy identifiers claimed by more than one station.
    pub fn collisions(&self) -> usize {
        self.collisions.len()
    }
}
