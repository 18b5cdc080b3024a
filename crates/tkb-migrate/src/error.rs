use std::io;

use tkb_schema::SchemaError;
use tkb_store::StoreError;
use tkb_types::{BranchId, Revision};

/// Errors produced by migration, indexing, and dump/restore.
///
/// All of these abort the operation that triggered them; a migration never
/// surfaces partial output.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("stream invariant violated on branch {branch} at {revision}: {reason}")]
    InvariantViolation {
        branch: BranchId,
        revision: Revision,
        reason: String,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no index registered under name {0}")]
    UnknownIndex(String),

    #[error("invalid dump format: {0}")]
    InvalidFormat(String),

    #[error("dump checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("dump serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
