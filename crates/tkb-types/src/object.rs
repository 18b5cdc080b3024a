use std::fmt;

use serde::{Deserialize, Serialize};

use crate::branch::BranchId;
use crate::revision::{Revision, RevisionSpec};

/// Stable identity of an object.
///
/// An `ObjectId` is assigned once when the object is first created and stays
/// the same across all revisions and all branches that descend from the same
/// origin. Ids are allocated by the store and never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Name of a schema type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeName(String);

impl TypeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeName({})", self.0)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for TypeName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// The full address of a versioned item: branch, revision coordinate, type,
/// and stable object identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub branch: BranchId,
    pub revision: RevisionSpec,
    pub type_name: TypeName,
    pub id: ObjectId,
}

impl ObjectKey {
    /// Address the newest version on the given branch.
    pub fn current(branch: BranchId, type_name: impl Into<TypeName>, id: ObjectId) -> Self {
        Self {
            branch,
            revision: RevisionSpec::Current,
            type_name: type_name.into(),
            id,
        }
    }

    /// Address a fixed historic revision on the given branch.
    pub fn at(
        branch: BranchId,
        revision: Revision,
        type_name: impl Into<TypeName>,
        id: ObjectId,
    ) -> Self {
        Self {
            branch,
            revision: RevisionSpec::At(revision),
            type_name: type_name.into(),
            id,
        }
    }

    /// The same address pinned to a different revision coordinate.
    pub fn with_revision(&self, revision: RevisionSpec) -> Self {
        Self {
            revision,
            ..self.clone()
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}@b{}/{}",
            self.type_name, self.id, self.branch, self.revision
        )
    }
}
