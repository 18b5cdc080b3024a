//! Migration engine for the Temporal Knowledge Base.
//!
//! Migration replays the full historic event stream through configured
//! rewriters and re-emits a stream a fresh store ingests to reconstruct
//! equivalent history under a changed schema. A migration either fully
//! succeeds or fails before any output is surfaced.
//!
//! This crate provides:
//! - `EventRewriter` / `RewriteAction` / `RewriteContext` — the rewrite seam
//! - `MigrationEngine` — ordered replay with invariant validation
//! - Built-in processors: duplicate-association cleanup, association
//!   retyping by source type, type exclusion
//! - `Indexer` — migration-scoped secondary key lookup
//! - `dump` / `restore` — portable history serialization

pub mod dedup;
pub mod dump;
pub mod engine;
pub mod error;
pub mod filter;
pub mod indexer;
pub mod retype;
pub mod rewrite;

pub use dedup::DuplicateAssociationCleanup;
pub use dump::{dump, restore};
pub use engine::{
    run_migration, MigrationConfig, MigrationEngine, MigrationOutcome, MigrationReport,
    ProcessorSpec,
};
pub use error::MigrationError;
pub use filter::TypeFilter;
pub use indexer::{Index, IndexSpec, Indexer, KeyMapping};
pub use retype::AssociationRetyper;
pub use rewrite::{EventRewriter, RewriteAction, RewriteContext, RewriteStats};
