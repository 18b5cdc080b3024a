//! Schema repository for the Temporal Knowledge Base (TKB).
//!
//! Types are loaded once at startup and immutable at runtime; changing them
//! requires a migration run. This crate provides:
//! - Item and association type definitions with generalization links
//! - `SchemaBuilder` / `SchemaRepository` — build-once, read-only registry
//! - Attribute validation against the declared schema
//! - Native-name computation for backing stores with identifier-length limits

pub mod error;
pub mod native;
pub mod repository;
pub mod types;

pub use error::SchemaError;
pub use native::native_name;
pub use repository::{SchemaBuilder, SchemaRepository};
pub use types::{AttributeDef, TypeDef, TypeKind, ValueType};
