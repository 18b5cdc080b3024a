use std::io;

/// Errors produced by journal operations.
///
/// All of these mean the durability medium failed; the transaction being
/// journaled is treated as not committed.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("journal serialization error: {0}")]
    Serialization(String),
}
