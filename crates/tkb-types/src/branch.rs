use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a history branch.
///
/// Branches form a tree rooted at the trunk ([`BranchId::TRUNK`]). A branch
/// shares all history with its parent up to its fork revision and diverges
/// afterward.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchId(u64);

impl BranchId {
    /// The trunk branch, root of the branch tree.
    pub const TRUNK: BranchId = BranchId(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the trunk branch.
    pub fn is_trunk(&self) -> bool {
        *self == Self::TRUNK
    }
}

impl fmt::Debug for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BranchId({})", self.0)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BranchId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
