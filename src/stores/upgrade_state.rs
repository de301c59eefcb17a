use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{read_json_value, write_json, StoreError};

/// Key under which a finished reconciliation between two schema versions is
/// remembered.
pub fn reconciliation_key(from_version: u32, to_version: u32) -> String {
    format!("{from_version}->{to_version}")
}

/// A database write that happened before its stores were re-keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReconciliation {
    pub from_version: u32,
    pub to_version: u32,
}

impl PendingReconciliation {
    pub fn key(&self) -> String {
        reconciliation_key(self.from_version, self.to_version)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpgradeStateFile {
    #[serde(default)]
    completed: BTreeSet<String>,
    #[serde(default)]
    pending: Option<PendingReconciliation>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Survives restarts so each reconciliation runs exactly once.
pub struct UpgradeState {
    path: PathBuf,
    state: UpgradeStateFile,
}

impl UpgradeState {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = read_json_value(&path)
            .await?
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        Ok(Self { path, state })
    }

    pub fn is_done(&self, key: &str) -> bool {
        self.state.completed.contains(key)
    }

    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.state.completed.iter().map(String::as_str)
    }

    pub fn pending(&self) -> Option<PendingReconciliation> {
        self.state.pending
    }

    pub fn set_pending(&mut self, pending: PendingReconciliation) {
        self.state.pending = Some(pending);
    }

    /// Records `pending` as finished and clears it.
    pub fn complete(&mut self, pending: PendingReconciliation) {
        self.state.completed.insert(pending.key());
        if self.state.pending == Some(pending) {
            self.state.pending = None;
        }
    }

    pub async fn save(&mut self) -> Result<(), StoreError> {
        self.state.updated_at = Some(Utc::now());
        write_json("upgradeState", &self.path, &self.state).await
    }
}
