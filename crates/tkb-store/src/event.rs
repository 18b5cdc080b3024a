//! The event stream: what one committed transaction looks like on the wire.
//!
//! Every mutating operation is expressed as a [`ChangeEvent`]; one commit
//! bundles its events into a [`CommitRecord`] stamped with the allocated
//! revision. [`StoreRecord`] adds branch forks so the full stream — journal,
//! dump, migration input — reproduces branch topology exactly.

use serde::{Deserialize, Serialize};

use tkb_types::{Attributes, BranchId, ObjectId, Revision, RevisionInfo, TypeName};

/// One change to an item or association, as recorded at a revision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ChangeEvent {
    ItemCreated {
        type_name: TypeName,
        id: ObjectId,
        attributes: Attributes,
    },
    ItemUpdated {
        type_name: TypeName,
        id: ObjectId,
        attributes: Attributes,
    },
    ItemDeleted {
        type_name: TypeName,
        id: ObjectId,
    },
    AssociationCreated {
        type_name: TypeName,
        id: ObjectId,
        source: ObjectId,
        destination: ObjectId,
        order_key: i64,
        attributes: Attributes,
    },
    AssociationDeleted {
        type_name: TypeName,
        id: ObjectId,
    },
}

impl ChangeEvent {
    /// The stable identity of the item or association this event touches.
    pub fn object_id(&self) -> ObjectId {
        match self {
            ChangeEvent::ItemCreated { id, .. }
            | ChangeEvent::ItemUpdated { id, .. }
            | ChangeEvent::ItemDeleted { id, .. }
            | ChangeEvent::AssociationCreated { id, .. }
            | ChangeEvent::AssociationDeleted { id, .. } => *id,
        }
    }

    pub fn type_name(&self) -> &TypeName {
        match self {
            ChangeEvent::ItemCreated { type_name, .. }
            | ChangeEvent::ItemUpdated { type_name, .. }
            | ChangeEvent::ItemDeleted { type_name, .. }
            | ChangeEvent::AssociationCreated { type_name, .. }
            | ChangeEvent::AssociationDeleted { type_name, .. } => type_name,
        }
    }

    pub fn is_association_event(&self) -> bool {
        matches!(
            self,
            ChangeEvent::AssociationCreated { .. } | ChangeEvent::AssociationDeleted { .. }
        )
    }

    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            ChangeEvent::ItemDeleted { .. } | ChangeEvent::AssociationDeleted { .. }
        )
    }
}

/// All events of one committed transaction, stamped with its revision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub branch: BranchId,
    pub revision: Revision,
    pub info: RevisionInfo,
    pub events: Vec<ChangeEvent>,
}

/// The unit of the journal and the dump stream.
///
/// Branch forks are first-class records so a replayed stream reconstructs
/// the branch tree with identical ids and fork points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StoreRecord {
    Commit(CommitRecord),
    Fork {
        branch: BranchId,
        parent: BranchId,
        fork_revision: Revision,
    },
}

impl StoreRecord {
    pub fn as_commit(&self) -> Option<&CommitRecord> {
        match self {
            StoreRecord::Commit(record) => Some(record),
            StoreRecord::Fork { .. } => None,
        }
    }
}
