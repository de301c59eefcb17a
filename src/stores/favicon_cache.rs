use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::fs;

use super::StoreError;
use crate::logging::logger;
use crate::reconcile::{IdMigrationMap, KeyDisposition, KeyedStore, ReconcileOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingChange {
    Rename { from: PathBuf, to: PathBuf },
    Remove(PathBuf),
}

/// Directory of downloaded favicons named `<station id>.<ext>`.
///
/// Reconciliation only plans renames; [`FaviconCache::save`] applies them.
pub struct FaviconCache {
    dir: PathBuf,
    files: BTreeMap<String, PathBuf>,
    pending: Vec<PendingChange>,
}

impl FaviconCache {
    pub async fn load(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        let mut files = BTreeMap::new();

        let mut reader = match fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Self {
                    dir,
                    files,
                    pending: vec![],
                })
            }
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = reader.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if let Some(id) = station_id_for(&path) {
                files.entry(id).or_insert(path);
            }
        }

        Ok(Self {
            dir,
            files,
            pending: vec![],
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> Option<&Path> {
        self.files.get(id).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Applies planned renames and removals. Changes that fail stay queued and
    /// the save reports an error, so the reconciliation is retried later.
    pub async fn save(&mut self) -> Result<(), StoreError> {
        let mut failed = Vec::new();
        for change in std::mem::take(&mut self.pending) {
            let result = match &change {
                PendingChange::Rename { from, to } => fs::rename(from, to).await,
                PendingChange::Remove(path) => fs::remove_file(path).await,
            };
            match result {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    if let Some(log) = logger() {
                        log.warn(
                            "favicons.apply_failed",
                            json!({ "change": format!("{change:?}"), "error": err.to_string() }),
                        );
                    }
                    failed.push(change);
                }
            }
        }

        if failed.is_empty() {
            return Ok(());
        }
        let count = failed.len();
        self.pending = failed;
        Err(StoreError::Incomplete {
            store: "favicons",
            failed: count,
        })
    }
}

impl KeyedStore for FaviconCache {
    fn store_name(&self) -> &'static str {
        "favicons"
    }

    /// A legacy favicon whose new name is already taken is discarded; the
    /// image under the current id is at least as fresh.
    fn reconcile(
        &mut self,
        map: &IdMigrationMap,
        current_ids: &HashSet<String>,
        _now: DateTime<Utc>,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::new(self.store_name());
        let mut moved = Vec::new();

        for id in self.files.keys() {
            if let KeyDisposition::Remapped(new_id) = outcome.track(id, map, current_ids) {
                moved.push((id.clone(), new_id));
            }
        }

        for (old_id, new_id) in moved {
            let Some(from) = self.files.remove(&old_id) else {
                continue;
            };
            if self.files.contains_key(&new_id) {
                outcome.merged += 1;
                self.pending.push(PendingChange::Remove(from));
                continue;
            }
            let to = self.dir.join(renamed_file(&from, &new_id));
            self.pending.push(PendingChange::Rename {
                from,
                to: to.clone(),
            });
            self.files.insert(new_id, to);
        }

        outcome
    }
}

/// Station id encoded in a cache file name. Partially written files are ignored.
fn station_id_for(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') || name.ends_with(".tmp") {
        return None;
    }
    let id = name.split('.').next()?;
    (!id.is_empty()).then(|| id.to_string())
}

fn renamed_file(from: &Path, new_id: &str) -> String {
    let name = from
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((_, ext)) => format!("{new_id}.{ext}"),
        None => new_id.to_string(),
    }
}
