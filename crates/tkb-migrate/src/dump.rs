//! Portable history serialization.
//!
//! A dump is the full record stream (optionally with excluded types removed
//! by construction), bincode-serialized, zstd-compressed, and framed with a
//! magic header and a BLAKE3 trailer checksum. Restore verifies the frame,
//! validates the stream's ordering invariants, and replays it through the
//! ingestion path into a fresh store.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use tkb_schema::SchemaRepository;
use tkb_store::{KnowledgeStore, StoreRecord};
use tkb_types::TypeName;

use crate::engine::{validate_stream, MigrationConfig, MigrationEngine, ProcessorSpec};
use crate::error::MigrationError;

const DUMP_MAGIC: &[u8; 4] = b"TKBD";
const DUMP_VERSION: u32 = 1;
const CHECKSUM_LEN: usize = 32;
const ZSTD_LEVEL: i32 = 3;

/// Serialize a store's full history, omitting the excluded types.
///
/// Exclusion runs through the migration engine's type filter, so excluded
/// extents are absent from the stream itself, not merely skipped on read.
pub fn dump(
    store: &KnowledgeStore,
    exclude_types: &BTreeSet<TypeName>,
) -> Result<Vec<u8>, MigrationError> {
    let records = store.records();
    let records = if exclude_types.is_empty() {
        records
    } else {
        let config = MigrationConfig {
            processors: vec![ProcessorSpec::ExcludeTypes {
                types: exclude_types.clone(),
            }],
        };
        MigrationEngine::new(Arc::clone(store.schema()))
            .run(&records, &config)?
            .records
    };

    let payload =
        bincode::serialize(&records).map_err(|e| MigrationError::Serialization(e.to_string()))?;
    let compressed = zstd::encode_all(payload.as_slice(), ZSTD_LEVEL)?;

    let mut out = Vec::with_capacity(compressed.len() + 8 + CHECKSUM_LEN);
    out.extend_from_slice(DUMP_MAGIC);
    out.extend_from_slice(&DUMP_VERSION.to_be_bytes());
    out.extend_from_slice(&compressed);

    let checksum = blake3::hash(&out);
    out.extend_from_slice(checksum.as_bytes());

    info!(
        records = records.len(),
        bytes = out.len(),
        excluded = exclude_types.len(),
        "store dumped"
    );
    Ok(out)
}

/// Reconstruct a store from a dump under the given schema.
pub fn restore(
    bytes: &[u8],
    schema: Arc<SchemaRepository>,
) -> Result<KnowledgeStore, MigrationError> {
    if bytes.len() < 8 + CHECKSUM_LEN {
        return Err(MigrationError::InvalidFormat("dump too short".to_string()));
    }
    if &bytes[..4] != DUMP_MAGIC {
        return Err(MigrationError::InvalidFormat(
            "missing TKBD magic".to_string(),
        ));
    }
    let version = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != DUMP_VERSION {
        return Err(MigrationError::InvalidFormat(format!(
            "unsupported dump version {version}"
        )));
    }

    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let actual = blake3::hash(body);
    if actual.as_bytes() != trailer {
        return Err(MigrationError::ChecksumMismatch {
            expected: hex::encode(trailer),
            actual: hex::encode(actual.as_bytes()),
        });
    }

    let payload = zstd::decode_all(&body[8..])?;
    let records: Vec<StoreRecord> = bincode::deserialize(&payload)
        .map_err(|e| MigrationError::Serialization(e.to_string()))?;

    validate_stream(&records)?;

    let store = KnowledgeStore::new(schema);
    for record in &records {
        store.apply(record)?;
    }
    info!(records = records.len(), "store restored");
    Ok(store)
}
