//! Transaction coordinator for the Temporal Knowledge Base.
//!
//! This crate provides:
//! - `Transaction` — a staging handle with read-your-writes visibility
//! - Optimistic, first-committer-wins conflict validation
//! - A per-branch commit critical section (revision allocation + validation)
//! - `KnowledgeBase` — the explicitly constructed session/query facade
//!
//! The transaction state machine is encoded in ownership: `commit` and
//! `rollback` consume the handle, and a handle that is simply dropped was
//! never committed.

pub mod config;
pub mod error;
pub mod kb;
pub mod transaction;

pub use config::{StoreConfig, StoreOverrides};
pub use error::TxnError;
pub use kb::KnowledgeBase;
pub use transaction::Transaction;
