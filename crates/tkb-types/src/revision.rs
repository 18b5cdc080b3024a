use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monotonically increasing commit number on one branch.
///
/// Revisions totally order all commits on a branch. [`Revision::INITIAL`]
/// denotes "nothing committed yet"; the first commit on a branch is
/// revision 1. Revision numbers are never reused and never assigned out of
/// order within a branch.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Revision(u64);

impl Revision {
    /// The state of a branch before its first commit.
    pub const INITIAL: Revision = Revision(0);

    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    pub const fn number(&self) -> u64 {
        self.0
    }

    /// The revision directly following this one.
    pub fn next(&self) -> Revision {
        Revision(self.0 + 1)
    }

    /// Returns `true` if no commit has happened yet at this revision.
    pub fn is_initial(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({})", self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl From<u64> for Revision {
    fn from(number: u64) -> Self {
        Self(number)
    }
}

/// The revision coordinate of an [`crate::ObjectKey`]: either a concrete
/// historic revision or "whatever is newest on this branch as of the reading
/// transaction".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevisionSpec {
    /// The newest committed state on the branch.
    Current,
    /// A fixed historic revision.
    At(Revision),
}

impl RevisionSpec {
    /// Resolve this spec against the given branch head.
    pub fn resolve(&self, head: Revision) -> Revision {
        match self {
            RevisionSpec::Current => head,
            RevisionSpec::At(revision) => *revision,
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, RevisionSpec::Current)
    }
}

impl fmt::Display for RevisionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionSpec::Current => write!(f, "current"),
            RevisionSpec::At(revision) => write!(f, "{revision}"),
        }
    }
}

impl From<Revision> for RevisionSpec {
    fn from(revision: Revision) -> Self {
        RevisionSpec::At(revision)
    }
}

/// Metadata attached to one committed revision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevisionInfo {
    /// Who committed the revision.
    pub author: String,
    /// Wall-clock commit time.
    pub timestamp: DateTime<Utc>,
    /// Optional commit log message.
    pub message: Option<String>,
}

impl RevisionInfo {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            timestamp: Utc::now(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
