use tkb_types::{BranchId, ObjectKey, Revision, TypeName};

use crate::error::StoreError;
use crate::event::StoreRecord;
use crate::item::{KnowledgeAssociation, KnowledgeItem};
use crate::memory::KnowledgeStore;

/// Read boundary of the store: key resolution and edge navigation.
pub trait StoreReader: Send + Sync {
    fn resolve(&self, key: &ObjectKey) -> Result<Option<KnowledgeItem>, StoreError>;

    fn outgoing(
        &self,
        key: &ObjectKey,
        assoc_type: &TypeName,
    ) -> Result<Vec<KnowledgeAssociation>, StoreError>;

    fn incoming(
        &self,
        key: &ObjectKey,
        assoc_type: &TypeName,
    ) -> Result<Vec<KnowledgeAssociation>, StoreError>;

    fn head(&self, branch: BranchId) -> Result<Revision, StoreError>;
}

/// Ingestion boundary: the replay path used by journal recovery, restore,
/// and migration output.
pub trait StoreIngest: Send + Sync {
    fn apply(&self, record: &StoreRecord) -> Result<(), StoreError>;
}

impl StoreReader for KnowledgeStore {
    fn resolve(&self, key: &ObjectKey) -> Result<Option<KnowledgeItem>, StoreError> {
        KnowledgeStore::resolve(self, key)
    }

    fn outgoing(
        &self,
        key: &ObjectKey,
        assoc_type: &TypeName,
    ) -> Result<Vec<KnowledgeAssociation>, StoreError> {
        KnowledgeStore::outgoing(self, key, assoc_type)
    }

    fn incoming(
        &self,
        key: &ObjectKey,
        assoc_type: &TypeName,
    ) -> Result<Vec<KnowledgeAssociation>, StoreError> {
        KnowledgeStore::incoming(self, key, assoc_type)
    }

    fn head(&self, branch: BranchId) -> Result<Revision, StoreError> {
        KnowledgeStore::head(self, branch)
    }
}

impl StoreIngest for KnowledgeStore {
    fn apply(&self, record: &StoreRecord) -> Result<(), StoreError> {
        KnowledgeStore::apply(self, record)
    }
}
