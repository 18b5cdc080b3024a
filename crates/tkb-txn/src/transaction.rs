//! The transaction handle: staged writes and read-your-writes visibility.
//!
//! A transaction snapshots its branch head as the read revision at `begin`.
//! All mutating calls only stage; nothing is visible to other readers until
//! the coordinator commits the handle. Reads through the handle overlay the
//! handle's own staged writes on top of the snapshot — never another
//! transaction's.

use std::collections::BTreeMap;
use std::sync::Arc;

use tkb_schema::TypeKind;
use tkb_store::{ChangeEvent, KnowledgeAssociation, KnowledgeItem, KnowledgeStore, StoreError};
use tkb_types::{
    Attributes, BranchId, ObjectId, ObjectKey, Revision, RevisionSpec, TransactionId, TypeName,
};

use crate::error::TxnError;

/// One staged write, keyed by the object id it touches.
#[derive(Clone, Debug)]
pub(crate) enum StagedWrite {
    Item {
        type_name: TypeName,
        attributes: Attributes,
        created: bool,
    },
    ItemDelete {
        type_name: TypeName,
    },
    Link {
        type_name: TypeName,
        source: ObjectId,
        destination: ObjectId,
        order_key: i64,
        attributes: Attributes,
    },
    Unlink {
        type_name: TypeName,
    },
}

impl StagedWrite {
    /// Whether this write targets an object that existed before the
    /// transaction, and therefore participates in conflict validation.
    fn touches_existing(&self) -> bool {
        match self {
            StagedWrite::Item { created, .. } => !created,
            StagedWrite::ItemDelete { .. } | StagedWrite::Unlink { .. } => true,
            StagedWrite::Link { .. } => false,
        }
    }

    fn to_event(&self, id: ObjectId) -> ChangeEvent {
        match self {
            StagedWrite::Item {
                type_name,
                attributes,
                created: true,
            } => ChangeEvent::ItemCreated {
                type_name: type_name.clone(),
                id,
                attributes: attributes.clone(),
            },
            StagedWrite::Item {
                type_name,
                attributes,
                created: false,
            } => ChangeEvent::ItemUpdated {
                type_name: type_name.clone(),
                id,
                attributes: attributes.clone(),
            },
            StagedWrite::ItemDelete { type_name } => ChangeEvent::ItemDeleted {
                type_name: type_name.clone(),
                id,
            },
            StagedWrite::Link {
                type_name,
                source,
                destination,
                order_key,
                attributes,
            } => ChangeEvent::AssociationCreated {
                type_name: type_name.clone(),
                id,
                source: *source,
                destination: *destination,
                order_key: *order_key,
                attributes: attributes.clone(),
            },
            StagedWrite::Unlink { type_name } => ChangeEvent::AssociationDeleted {
                type_name: type_name.clone(),
                id,
            },
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Outgoing,
    Incoming,
}

/// What the coordinator needs from a consumed transaction.
pub(crate) struct TxnParts {
    pub author: String,
    pub message: Option<String>,
    pub events: Vec<ChangeEvent>,
}

/// An open transaction against one branch.
pub struct Transaction {
    id: TransactionId,
    branch: BranchId,
    read_revision: Revision,
    author: String,
    message: Option<String>,
    store: Arc<KnowledgeStore>,
    staged: BTreeMap<ObjectId, StagedWrite>,
}

impl Transaction {
    pub(crate) fn new(
        store: Arc<KnowledgeStore>,
        branch: BranchId,
        read_revision: Revision,
        author: String,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            branch,
            read_revision,
            author,
            message: None,
            store,
            staged: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn branch(&self) -> BranchId {
        self.branch
    }

    /// The branch head snapshotted at `begin`; all reads inside the
    /// transaction observe the store at this revision.
    pub fn read_revision(&self) -> Revision {
        self.read_revision
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    /// Attach a commit log message.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Returns `true` if nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Number of staged writes.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub(crate) fn conflict_candidates(&self) -> Vec<ObjectId> {
        self.staged
            .iter()
            .filter(|(_, write)| write.touches_existing())
            .map(|(id, _)| *id)
            .collect()
    }

    pub(crate) fn into_parts(self) -> TxnParts {
        let events = self
            .staged
            .iter()
            .map(|(id, write)| write.to_event(*id))
            .collect();
        TxnParts {
            author: self.author,
            message: self.message,
            events,
        }
    }

    // ---------------------------------------------------------------
    // Staging
    // ---------------------------------------------------------------

    /// Stage the creation of a new item. Returns an uncommitted preview;
    /// the final revision is assigned at commit.
    pub fn create(
        &mut self,
        type_name: impl Into<TypeName>,
        attributes: Attributes,
    ) -> Result<KnowledgeItem, TxnError> {
        let type_name = type_name.into();
        let schema = self.store.schema();
        let def = schema.resolve_type(&type_name)?;
        if def.is_association() {
            return Err(TxnError::ExpectedItemType(type_name));
        }
        schema.validate_attributes(&type_name, &attributes)?;

        let id = self.store.allocate_object_id();
        self.staged.insert(
            id,
            StagedWrite::Item {
                type_name: type_name.clone(),
                attributes: attributes.clone(),
                created: true,
            },
        );
        Ok(self.item_preview(type_name, id, attributes))
    }

    /// Stage an update of an existing item (or of one created earlier in
    /// this transaction).
    pub fn update(
        &mut self,
        key: &ObjectKey,
        attributes: Attributes,
    ) -> Result<KnowledgeItem, TxnError> {
        self.get(key)?;
        let schema = self.store.schema();
        schema.validate_attributes(&key.type_name, &attributes)?;

        let created = matches!(
            self.staged.get(&key.id),
            Some(StagedWrite::Item { created: true, .. })
        );
        self.staged.insert(
            key.id,
            StagedWrite::Item {
                type_name: key.type_name.clone(),
                attributes: attributes.clone(),
                created,
            },
        );
        Ok(self.item_preview(key.type_name.clone(), key.id, attributes))
    }

    /// Stage a tombstone for an existing item. Deleting an item created in
    /// this same transaction simply unstages it.
    pub fn delete(&mut self, key: &ObjectKey) -> Result<(), TxnError> {
        self.get(key)?;
        if matches!(
            self.staged.get(&key.id),
            Some(StagedWrite::Item { created: true, .. })
        ) {
            self.staged.remove(&key.id);
            return Ok(());
        }
        self.staged.insert(
            key.id,
            StagedWrite::ItemDelete {
                type_name: key.type_name.clone(),
            },
        );
        Ok(())
    }

    /// Stage a new association between two items resolvable in this
    /// transaction. Endpoint items must conform to the association type's
    /// declared endpoint types.
    pub fn link(
        &mut self,
        assoc_type: impl Into<TypeName>,
        source: ObjectId,
        destination: ObjectId,
        order_key: i64,
        attributes: Attributes,
    ) -> Result<KnowledgeAssociation, TxnError> {
        let assoc_type = assoc_type.into();
        let schema = Arc::clone(self.store.schema());
        let def = schema.resolve_association_type(&assoc_type)?;
        let TypeKind::Association {
            source_type,
            dest_type,
        } = def.kind.clone()
        else {
            unreachable!("resolve_association_type returned a non-association");
        };
        schema.validate_attributes(&assoc_type, &attributes)?;

        for (endpoint, expected) in [(source, source_type), (destination, dest_type)] {
            let actual = self
                .endpoint_type(endpoint)?
                .ok_or(TxnError::EndpointNotFound(endpoint))?;
            if !schema.is_subtype_of(&actual, &expected) {
                return Err(TxnError::EndpointTypeMismatch {
                    endpoint,
                    expected,
                    actual,
                });
            }
        }

        let id = self.store.allocate_object_id();
        self.staged.insert(
            id,
            StagedWrite::Link {
                type_name: assoc_type.clone(),
                source,
                destination,
                order_key,
                attributes: attributes.clone(),
            },
        );
        Ok(KnowledgeAssociation {
            branch: self.branch,
            revision: self.read_revision,
            type_name: assoc_type,
            id,
            source,
            destination,
            order_key,
            attributes,
        })
    }

    /// Stage a tombstone for an existing association. Unlinking an
    /// association staged in this transaction simply unstages it.
    pub fn unlink(&mut self, key: &ObjectKey) -> Result<(), TxnError> {
        if matches!(self.staged.get(&key.id), Some(StagedWrite::Link { .. })) {
            self.staged.remove(&key.id);
            return Ok(());
        }
        if matches!(self.staged.get(&key.id), Some(StagedWrite::Unlink { .. })) {
            return Ok(());
        }

        let pinned = self.pinned(key);
        let existing = self.store.resolve_association(&pinned)?;
        if existing.is_none() {
            return Err(StoreError::NotFound { key: key.clone() }.into());
        }
        self.staged.insert(
            key.id,
            StagedWrite::Unlink {
                type_name: key.type_name.clone(),
            },
        );
        Ok(())
    }

    // ---------------------------------------------------------------
    // Reads (read-your-writes)
    // ---------------------------------------------------------------

    /// Resolve a key inside this transaction.
    ///
    /// A `Current` coordinate observes the snapshot plus this handle's own
    /// staged writes; a fixed historic coordinate reads committed history
    /// only, clamped to the read revision.
    pub fn resolve(&self, key: &ObjectKey) -> Result<Option<KnowledgeItem>, TxnError> {
        if key.branch == self.branch && key.revision.is_current() {
            if let Some(write) = self.staged.get(&key.id) {
                return Ok(match write {
                    StagedWrite::Item {
                        type_name,
                        attributes,
                        ..
                    } if *type_name == key.type_name => Some(self.item_preview(
                        type_name.clone(),
                        key.id,
                        attributes.clone(),
                    )),
                    _ => None,
                });
            }
        }
        Ok(self.store.resolve(&self.pinned(key))?)
    }

    /// Like [`resolve`](Self::resolve), but absence is an error.
    pub fn get(&self, key: &ObjectKey) -> Result<KnowledgeItem, TxnError> {
        self.resolve(key)?
            .ok_or_else(|| StoreError::NotFound { key: key.clone() }.into())
    }

    /// Outgoing associations as seen by this transaction: committed edges at
    /// the read revision, minus staged unlinks and edges to staged-deleted
    /// endpoints, plus staged links.
    pub fn outgoing(
        &self,
        key: &ObjectKey,
        assoc_type: &TypeName,
    ) -> Result<Vec<KnowledgeAssociation>, TxnError> {
        self.edges(key, assoc_type, Direction::Outgoing)
    }

    /// Incoming associations as seen by this transaction.
    pub fn incoming(
        &self,
        key: &ObjectKey,
        assoc_type: &TypeName,
    ) -> Result<Vec<KnowledgeAssociation>, TxnError> {
        self.edges(key, assoc_type, Direction::Incoming)
    }

    fn edges(
        &self,
        key: &ObjectKey,
        assoc_type: &TypeName,
        direction: Direction,
    ) -> Result<Vec<KnowledgeAssociation>, TxnError> {
        let pinned = self.pinned(key);
        let base = match direction {
            Direction::Outgoing => self.store.outgoing(&pinned, assoc_type)?,
            Direction::Incoming => self.store.incoming(&pinned, assoc_type)?,
        };
        if key.branch != self.branch {
            return Ok(base);
        }

        let mut edges: Vec<KnowledgeAssociation> = base
            .into_iter()
            .filter(|edge| !matches!(self.staged.get(&edge.id), Some(StagedWrite::Unlink { .. })))
            .filter(|edge| {
                !self.is_staged_deleted(edge.source) && !self.is_staged_deleted(edge.destination)
            })
            .collect();

        if key.revision.is_current() {
            for (id, write) in &self.staged {
                let StagedWrite::Link {
                    type_name,
                    source,
                    destination,
                    order_key,
                    attributes,
                } = write
                else {
                    continue;
                };
                let anchored = match direction {
                    Direction::Outgoing => *source == key.id,
                    Direction::Incoming => *destination == key.id,
                };
                if type_name == assoc_type
                    && anchored
                    && !self.is_staged_deleted(*source)
                    && !self.is_staged_deleted(*destination)
                {
                    edges.push(KnowledgeAssociation {
                        branch: self.branch,
                        revision: self.read_revision,
                        type_name: type_name.clone(),
                        id: *id,
                        source: *source,
                        destination: *destination,
                        order_key: *order_key,
                        attributes: attributes.clone(),
                    });
                }
            }
        }

        edges.sort_by_key(|edge| (edge.order_key, edge.id));
        Ok(edges)
    }

    // ---------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------

    fn item_preview(
        &self,
        type_name: TypeName,
        id: ObjectId,
        attributes: Attributes,
    ) -> KnowledgeItem {
        KnowledgeItem {
            branch: self.branch,
            revision: self.read_revision,
            type_name,
            id,
            attributes,
        }
    }

    fn is_staged_deleted(&self, id: ObjectId) -> bool {
        matches!(self.staged.get(&id), Some(StagedWrite::ItemDelete { .. }))
    }

    /// The type of an endpoint item as seen by this transaction.
    fn endpoint_type(&self, id: ObjectId) -> Result<Option<TypeName>, TxnError> {
        match self.staged.get(&id) {
            Some(StagedWrite::Item { type_name, .. }) => Ok(Some(type_name.clone())),
            Some(StagedWrite::ItemDelete { .. }) => Ok(None),
            Some(StagedWrite::Link { .. }) | Some(StagedWrite::Unlink { .. }) => Ok(None),
            None => Ok(self.store.item_type(
                self.branch,
                RevisionSpec::At(self.read_revision),
                id,
            )?),
        }
    }

    /// Pin a key to this transaction's snapshot: `Current` becomes the read
    /// revision; explicit coordinates are clamped to it. Keys on other
    /// branches pass through unchanged.
    fn pinned(&self, key: &ObjectKey) -> ObjectKey {
        if key.branch != self.branch {
            return key.clone();
        }
        let effective = match key.revision {
            RevisionSpec::Current => self.read_revision,
            RevisionSpec::At(revision) => revision.min(self.read_revision),
        };
        key.with_revision(RevisionSpec::At(effective))
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("branch", &self.branch)
            .field("read_revision", &self.read_revision)
            .field("staged", &self.staged.len())
            .finish()
    }
}
