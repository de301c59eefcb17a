mod favicon_cache;
mod favorites;
mod properties;
mod recents;
mod upgrade_state;

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use favicon_cache::FaviconCache;
pub use favorites::{FavoriteEntry, FavoritesStore, FAVORITES_STORAGE_VERSION};
pub use properties::{StationProperties, StationPropertiesStore};
pub use recents::{RecentEntry, RecentsStore, DEFAULT_MAX_RECENTS};
pub use upgrade_state::{reconciliation_key, PendingReconciliation, UpgradeState};

use crate::files;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to encode {store}: {source}")]
    Encode {
        store: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{store}: {failed} pending change(s) could not be applied")]
    Incomplete { store: &'static str, failed: usize },
}

/// Loads a JSON document as a loose value. Missing files and unparseable
/// content both read as `None`; stores rebuild from whatever they can use.
async fn read_json_value(path: &Path) -> Result<Option<Value>, StoreError> {
    let Some(bytes) = files::read_optional(path).await? else {
        return Ok(None);
    };
    Ok(serde_json::from_slice(&bytes).ok())
}

async fn write_json<T: Serialize>(
    store: &'static str,
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let bytes =
        serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode { store, source })?;
    files::write_atomic(path, &bytes).await?;
    Ok(())
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
