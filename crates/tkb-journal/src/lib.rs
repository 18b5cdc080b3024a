//! Durable commit log for the Temporal Knowledge Base.
//!
//! Commits reach the journal before they become visible; recovery replays
//! the journal front-to-back and drops torn tail entries, so a crash mid-
//! append leaves the transaction "never committed" rather than partially
//! visible.

pub mod error;
pub mod log;

pub use error::JournalError;
pub use log::{CommitLog, JournalConfig, SyncMode};
