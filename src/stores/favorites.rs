use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{current_timestamp, read_json_value, write_json, StoreError};
use crate::reconcile::{IdMigrationMap, KeyDisposition, KeyedStore, ReconcileOutcome};

pub const FAVORITES_STORAGE_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    pub id: String,
    /// Milliseconds since the epoch.
    pub saved_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<i64>,
}

#[derive(Serialize)]
struct FavoritesPayload<'a> {
    version: u32,
    entries: &'a [FavoriteEntry],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEntry {
    id: Option<String>,
    saved_at: Option<i64>,
    modified_at: Option<i64>,
}

/// Ordered list of favorite station identifiers, persisted as JSON.
pub struct FavoritesStore {
    path: PathBuf,
    entries: Vec<FavoriteEntry>,
    dirty: bool,
}

impl FavoritesStore {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match read_json_value(&path).await? {
            Some(value) => dedupe_entries(normalize_entries_from_raw(&value)),
            None => vec![],
        };
        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    pub fn in_memory(path: impl Into<PathBuf>, entries: Vec<FavoriteEntry>) -> Self {
        Self {
            path: path.into(),
            entries: dedupe_entries(entries),
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[FavoriteEntry] {
        &self.entries
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn add(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.entries.push(FavoriteEntry {
            id: id.to_string(),
            saved_at: current_timestamp(),
            modified_at: None,
        });
        self.dirty = true;
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        let removed = self.entries.len() != before;
        self.dirty |= removed;
        removed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes the store if anything changed since load.
    pub async fn save(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        let payload = FavoritesPayload {
            version: FAVORITES_STORAGE_VERSION,
            entries: &self.entries,
        };
        write_json("favorites", &self.path, &payload).await?;
        self.dirty = false;
        Ok(())
    }
}

impl KeyedStore for FavoritesStore {
    fn store_name(&self) -> &'static str {
        "favorites"
    }

    /// Re-keyed favorites that collide with one already present merge into
    /// the earlier entry, which keeps the older `savedAt`.
    fn reconcile(
        &mut self,
        map: &IdMigrationMap,
        current_ids: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::new(self.store_name());
        let mut merged: Vec<FavoriteEntry> = Vec::with_capacity(self.entries.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        for mut entry in std::mem::take(&mut self.entries) {
            if let KeyDisposition::Remapped(new_id) = outcome.track(&entry.id, map, current_ids) {
                entry.id = new_id;
                entry.modified_at = Some(now.timestamp_millis());
                self.dirty = true;
            }
            match positions.get(&entry.id) {
                Some(&index) => {
                    let kept = &mut merged[index];
                    kept.saved_at = kept.saved_at.min(entry.saved_at);
                    outcome.merged += 1;
                    self.dirty = true;
                }
                None => {
                    positions.insert(entry.id.clone(), merged.len());
                    merged.push(entry);
                }
            }
        }

        self.entries = merged;
        outcome
    }
}

/// Accepts every shape favorites were ever stored in: a bare list of ids, a
/// list of entry objects, or an object wrapping either under `entries`/`items`.
fn normalize_entries_from_raw(value: &Value) -> Vec<FavoriteEntry> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(id) => Some(FavoriteEntry {
                    id: id.clone(),
                    saved_at: current_timestamp(),
                    modified_at: None,
                }),
                Value::Object(_) => serde_json::from_value::<LegacyEntry>(item.clone())
                    .ok()
                    .and_then(|entry| {
                        entry.id.map(|id| FavoriteEntry {
                            id,
                            saved_at: entry.saved_at.unwrap_or_else(current_timestamp),
                            modified_at: entry.modified_at,
                        })
                    }),
                _ => None,
            })
            .collect(),
        Value::Object(map) => {
            if let Some(entries) = map.get("entries") {
                return normalize_entries_from_raw(entries);
            }
            if let Some(items) = map.get("items") {
                return normalize_entries_from_raw(items);
            }
            vec![]
        }
        _ => vec![],
    }
}

fn dedupe_entries(entries: Vec<FavoriteEntry>) -> Vec<FavoriteEntry> {
    let mut seen = HashSet::new();
    let mut deduped = Vec::new();
    for entry in entries {
        let id = entry.id.trim();
        if id.is_empty() {
            continue;
        }
        if seen.insert(id.to_string()) {
            deduped.push(FavoriteEntry {
                id: id.to_string(),
                saved_at: if entry.saved_at > 0 {
                    entry.saved_at
                } else {
                    current_timestamp()
                },
                modified_at: entry.modified_at,
            });
        }
    }
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stations::identity::{freeze_identity, generate_id};
    use crate::stations::{IdAlgorithm, Station};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn entry(id: &str, saved_at: i64) -> FavoriteEntry {
        FavoriteEntry {
            id: id.into(),
            saved_at,
            modified_at: None,
        }
    }

    #[test]
    fn normalizes_legacy_shapes() {
        let bare = normalize_entries_from_raw(&json!(["a-1", 7, "b-2"]));
        assert_eq!(
            bare.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec!["a-1", "b-2"]
        );

        let wrapped = normalize_entries_from_raw(&json!({
            "version": 2,
            "entries": [{ "id": "c-3", "savedAt": 42 }, { "savedAt": 1 }],
        }));
        assert_eq!(wrapped, vec![entry("c-3", 42)]);

        let items = normalize_entries_from_raw(&json!({ "items": ["d-4"] }));
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn dedupe_keeps_first_and_drops_blank_ids() {
        let deduped = dedupe_entries(vec![entry("a", 1), entry(" ", 2), entry("a", 3)]);
        assert_eq!(deduped, vec![entry("a", 1)]);
    }

    #[test]
    fn reconcile_rekeys_merges_and_counts_orphans() {
        let mut first = Station::new("First", "http://dup.example.com/s").with_codec("mp3", 64);
        let mut second = Station::new("Second", "https://dup.example.com/s").with_codec("mp3", 256);
        freeze_identity(&mut first);
        freeze_identity(&mut second);
        let stations = vec![first.clone(), second];
        let map = IdMigrationMap::build(&stations, IdAlgorithm::UrlOnly);
        let ids = crate::reconcile::current_ids(&stations);
        let first_id = first.persistent_id.unwrap();

        let mut store = FavoritesStore::in_memory(
            "favorites.json",
            vec![
                entry(&first_id, 50),
                entry(&generate_id("http://dup.example.com/s"), 10),
                entry("lost-station", 5),
            ],
        );
        let now = Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap();
        let outcome = store.reconcile(&map, &ids, now);

        assert_eq!(outcome.remapped, 1);
        assert_eq!(outcome.merged, 1);
        assert_eq!(outcome.orphaned, 1);
        assert_eq!(store.entries().len(), 2);
        assert_eq!(store.entries()[0].id, first_id);
        assert_eq!(store.entries()[0].saved_at, 10);
        assert_eq!(store.entries()[1].id, "lost-station");
        assert!(store.is_dirty());
    }

    #[tokio::test]
    async fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.json");

        let mut store = FavoritesStore::load(&path).await.unwrap();
        assert!(store.entries().is_empty());
        assert!(store.add("station-1"));
        assert!(!store.add("station-1"));
        store.save().await.unwrap();

        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], json!(FAVORITES_STORAGE_VERSION));

        let reloaded = FavoritesStore::load(&path).await.unwrap();
        assert!(reloaded.contains("station-1"));
        assert!(!reloaded.is_dirty());
    }

    #[tokio::test]
    async fn corrupt_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.json");
        std::fs::write(&path, b"{not json").unwrap();

        let mut store = FavoritesStore::load(&path).await.unwrap();
        assert!(store.entries().is_empty());
        store.save().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{not json");
    }
}
