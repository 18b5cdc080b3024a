//! Foundation types for the Temporal Knowledge Base (TKB).
//!
//! This crate provides the coordinate and value types used throughout the
//! TKB system. Every other TKB crate depends on `tkb-types`.
//!
//! # Key Types
//!
//! - [`BranchId`] — Identifier of a history branch; trunk is branch 0
//! - [`Revision`] — Monotonically increasing commit number on a branch
//! - [`RevisionSpec`] — A concrete revision or "current head"
//! - [`RevisionInfo`] — Commit metadata (author, timestamp, message)
//! - [`ObjectId`] — Stable identity of an object across revisions and branches
//! - [`ObjectKey`] — Full address of a versioned item
//! - [`TypeName`] — Name of a schema type
//! - [`AttrValue`] — One typed attribute value
//! - [`TransactionId`] — UUID v7 transaction identifier

pub mod branch;
pub mod object;
pub mod revision;
pub mod transaction;
pub mod value;

pub use branch::BranchId;
pub use object::{ObjectId, ObjectKey, TypeName};
pub use revision::{Revision, RevisionInfo, RevisionSpec};
pub use transaction::TransactionId;
pub use value::{AttrValue, Attributes};
