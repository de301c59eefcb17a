use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use super::{decode_database, encode_database, DatabaseEnvelope, DatabaseError};

/// Encoding of a whole database envelope.
pub trait DatabaseCodec {
    fn encode(&self, envelope: &DatabaseEnvelope) -> Result<Vec<u8>, DatabaseError>;
    fn decode(&self, data: &[u8]) -> Result<DatabaseEnvelope, DatabaseError>;
    fn extension(&self) -> &'static str;
}

/// The on-disk database document.
pub struct JsonCodec;

impl DatabaseCodec for JsonCodec {
    fn encode(&self, envelope: &DatabaseEnvelope) -> Result<Vec<u8>, DatabaseError> {
        encode_database(envelope)
    }

    fn decode(&self, data: &[u8]) -> Result<DatabaseEnvelope, DatabaseError> {
        decode_database(data)
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

/// MessagePack with LZ4 compression, used for pre-migration snapshots.
pub struct MsgPackLz4Codec;

impl DatabaseCodec for MsgPackLz4Codec {
    fn encode(&self, envelope: &DatabaseEnvelope) -> Result<Vec<u8>, DatabaseError> {
        // Named fields so optional keys skipped on write do not shift positions.
        let msgpack_bytes = rmp_serde::to_vec_named(envelope).map_err(|err| {
            DatabaseError::Snapshot(format!("MessagePack serialization failed: {err}"))
        })?;

        Ok(compress_prepend_size(&msgpack_bytes))
    }

    fn decode(&self, data: &[u8]) -> Result<DatabaseEnvelope, DatabaseError> {
        let decompressed = decompress_size_prepended(data)
            .map_err(|err| DatabaseError::Snapshot(format!("LZ4 decompression failed: {err}")))?;

        rmp_serde::from_slice(&decompressed).map_err(|err| {
            DatabaseError::Snapshot(format!("MessagePack deserialization failed: {err}"))
        })
    }

    fn extension(&self) -> &'static str {
        "msgpack.lz4"
    }
}
