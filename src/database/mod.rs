mod codec;
mod envelope;
mod migrations;

use std::path::Path;

use thiserror::Error;

pub use codec::{DatabaseCodec, JsonCodec, MsgPackLz4Codec};
pub use envelope::{
    decode_database, encode_database, DatabaseEnvelope, DatabaseMetadata, CURRENT_VERSION,
    OLDEST_VERSION,
};
pub use migrations::{migrate, needs_migration, IdentityChange, MigrationReport, Migrator};

use crate::files;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to decode station database: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode station database: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("{0}")]
    Snapshot(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reads and decodes the database at `path`. `Ok(None)` when no file exists.
pub async fn load_database(path: &Path) -> Result<Option<DatabaseEnvelope>, DatabaseError> {
    match files::read_optional(path).await? {
        Some(bytes) => Ok(Some(JsonCodec.decode(&bytes)?)),
        None => Ok(None),
    }
}

pub async fn save_database(path: &Path, envelope: &DatabaseEnvelope) -> Result<(), DatabaseError> {
    let bytes = JsonCodec.encode(envelope)?;
    files::write_atomic(path, &bytes).await?;
    Ok(())
}
