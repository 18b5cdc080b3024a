use tkb_journal::JournalError;
use tkb_schema::SchemaError;
use tkb_store::StoreError;
use tkb_types::{ObjectId, TypeName};

/// Errors produced by transaction operations.
///
/// `Conflict` is the one recoverable commit failure: nothing was applied,
/// and retrying from a fresh read revision is expected to succeed.
#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    #[error("commit conflict on objects {objects:?}")]
    Conflict { objects: Vec<ObjectId> },

    #[error("type {0} is an association type; use link instead")]
    ExpectedItemType(TypeName),

    #[error("association endpoint {0} does not resolve in this transaction")]
    EndpointNotFound(ObjectId),

    #[error("association endpoint {endpoint} has type {actual}, expected {expected}")]
    EndpointTypeMismatch {
        endpoint: ObjectId,
        expected: TypeName,
        actual: TypeName,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("journal write failed; transaction not committed: {0}")]
    Journal(#[from] JournalError),
}
