use tkb_schema::SchemaError;
use tkb_types::{BranchId, ObjectKey, Revision};

/// Errors produced by store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unknown branch {0}")]
    UnknownBranch(BranchId),

    #[error("no object at {key}")]
    NotFound { key: ObjectKey },

    #[error("revision {found} on branch {branch} is not after head {head}")]
    RevisionOutOfOrder {
        branch: BranchId,
        head: Revision,
        found: Revision,
    },

    #[error("cannot fork branch {parent} at {requested}: head is {head}")]
    ForkBeyondHead {
        parent: BranchId,
        requested: Revision,
        head: Revision,
    },

    #[error("branch {0} already exists")]
    BranchExists(BranchId),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}
