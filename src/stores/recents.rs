use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{current_timestamp, read_json_value, write_json, StoreError};
use crate::reconcile::{IdMigrationMap, KeyDisposition, KeyedStore, ReconcileOutcome};

pub const DEFAULT_MAX_RECENTS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEntry {
    pub id: String,
    pub played_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<i64>,
}

/// Recently played stations, most recent first.
pub struct RecentsStore {
    path: PathBuf,
    entries: Vec<RecentEntry>,
    max_entries: usize,
    dirty: bool,
}

impl RecentsStore {
    pub async fn load(path: impl Into<PathBuf>, max_entries: usize) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = read_json_value(&path)
            .await?
            .and_then(|value| serde_json::from_value::<Vec<RecentEntry>>(value).ok())
            .unwrap_or_default();
        let mut store = Self {
            path,
            entries: vec![],
            max_entries: max_entries.max(1),
            dirty: false,
        };
        store.entries = store.normalized(entries);
        Ok(store)
    }

    pub fn entries(&self) -> &[RecentEntry] {
        &self.entries
    }

    pub fn record_play(&mut self, id: &str) {
        self.entries.retain(|entry| entry.id != id);
        self.entries.insert(
            0,
            RecentEntry {
                id: id.to_string(),
                played_at: current_timestamp(),
                modified_at: None,
            },
        );
        self.entries.truncate(self.max_entries);
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub async fn save(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        write_json("recents", &self.path, &self.entries).await?;
        self.dirty = false;
        Ok(())
    }

    /// Newest first, one entry per station, capped.
    fn normalized(&self, mut entries: Vec<RecentEntry>) -> Vec<RecentEntry> {
        entries.sort_by(|a, b| b.played_at.cmp(&a.played_at));
        let mut seen = HashSet::new();
        entries.retain(|entry| seen.insert(entry.id.clone()));
        entries.truncate(self.max_entries);
        entries
    }
}

impl KeyedStore for RecentsStore {
    fn store_name(&self) -> &'static str {
        "recents"
    }

    fn reconcile(
        &mut self,
        map: &IdMigrationMap,
        current_ids: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::new(self.store_name());
        let mut entries = std::mem::take(&mut self.entries);
        for entry in entries.iter_mut() {
            if let KeyDisposition::Remapped(new_id) = outcome.track(&entry.id, map, current_ids) {
                entry.id = new_id;
                entry.modified_at = Some(now.timestamp_millis());
                self.dirty = true;
            }
        }

        let before = entries.len();
        self.entries = self.normalized(entries);
        outcome.merged = before - self.entries.len();
        outcome
    }
}
