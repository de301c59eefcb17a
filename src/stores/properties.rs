use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{serde_as, DefaultOnError};

use super::{read_json_value, write_json, StoreError};
use crate::reconcile::{IdMigrationMap, KeyDisposition, KeyedStore, ReconcileOutcome};

/// User overrides for a single station. A malformed field falls back to its
/// default without losing the others.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub custom_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub volume: Option<f32>,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub modified_at: Option<DateTime<Utc>>,
    /// Keys written by newer clients, carried through untouched.
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

pub struct StationPropertiesStore {
    path: PathBuf,
    entries: BTreeMap<String, StationProperties>,
    dirty: bool,
}

impl StationPropertiesStore {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match read_json_value(&path).await? {
            Some(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(id, value)| {
                    serde_json::from_value::<StationProperties>(value)
                        .ok()
                        .map(|properties| (id, properties))
                })
                .collect(),
            _ => BTreeMap::new(),
        };
        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    pub fn get(&self, id: &str) -> Option<&StationProperties> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set(&mut self, id: &str, mut properties: StationProperties) {
        properties.modified_at = Some(Utc::now());
        self.entries.insert(id.to_string(), properties);
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub async fn save(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        write_json("stationProperties", &self.path, &self.entries).await?;
        self.dirty = false;
        Ok(())
    }
}

impl KeyedStore for StationPropertiesStore {
    fn store_name(&self) -> &'static str {
        "stationProperties"
    }

    /// Properties already stored under the current id take precedence over
    /// re-keyed ones.
    fn reconcile(
        &mut self,
        map: &IdMigrationMap,
        current_ids: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::new(self.store_name());
        let mut moved = Vec::new();

        for id in self.entries.keys() {
            if let KeyDisposition::Remapped(new_id) = outcome.track(id, map, current_ids) {
                moved.push((id.clone(), new_id));
            }
        }

        for (old_id, new_id) in moved {
            let Some(mut properties) = self.entries.remove(&old_id) else {
                continue;
            };
            self.dirty = true;
            if self.entries.contains_key(&new_id) {
                outcome.merged += 1;
                continue;
            }
            properties.modified_at = Some(now);
            self.entries.insert(new_id, properties);
        }

        outcome
    }
}
