//! In-memory knowledge store.
//!
//! All state lives behind one `RwLock`; a commit record is published
//! atomically under the write lock, so readers either see all of a
//! revision's effects or none of them. Version chains are per
//! `(branch, object id)` `BTreeMap`s keyed by revision, with `None` entries
//! as tombstones; resolution walks the branch ancestry chain with the
//! revision capped at each fork point.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use tkb_schema::SchemaRepository;
use tkb_types::{
    Attributes, BranchId, ObjectId, ObjectKey, Revision, RevisionSpec, TypeName,
};

use crate::branches::{BranchRecord, BranchTable};
use crate::error::StoreError;
use crate::event::{ChangeEvent, StoreRecord};
use crate::item::{KnowledgeAssociation, KnowledgeItem};

#[derive(Clone, Debug)]
struct ItemVersion {
    type_name: TypeName,
    attributes: Attributes,
}

#[derive(Clone, Debug)]
struct AssocVersion {
    type_name: TypeName,
    source: ObjectId,
    destination: ObjectId,
    order_key: i64,
    attributes: Attributes,
}

/// A version chain: revision to version, `None` marking a tombstone.
type Chain<V> = BTreeMap<Revision, Option<V>>;

#[derive(Debug)]
struct StoreState {
    branches: BranchTable,
    items: HashMap<(BranchId, ObjectId), Chain<ItemVersion>>,
    assocs: HashMap<(BranchId, ObjectId), Chain<AssocVersion>>,
    /// Source object id to association ids, a branch-agnostic superset;
    /// visibility is filtered per query.
    outgoing: HashMap<ObjectId, BTreeSet<ObjectId>>,
    incoming: HashMap<ObjectId, BTreeSet<ObjectId>>,
    /// Every applied record in publication order; the dump and migration
    /// source. Per-branch logs are views onto this sequence.
    journal: Vec<StoreRecord>,
}

/// The in-memory temporal object store.
#[derive(Debug)]
pub struct KnowledgeStore {
    schema: Arc<SchemaRepository>,
    inner: RwLock<StoreState>,
    next_object_id: AtomicU64,
}

impl KnowledgeStore {
    pub fn new(schema: Arc<SchemaRepository>) -> Self {
        Self {
            schema,
            inner: RwLock::new(StoreState {
                branches: BranchTable::new(),
                items: HashMap::new(),
                assocs: HashMap::new(),
                outgoing: HashMap::new(),
                incoming: HashMap::new(),
                journal: Vec::new(),
            }),
            next_object_id: AtomicU64::new(1),
        }
    }

    pub fn schema(&self) -> &Arc<SchemaRepository> {
        &self.schema
    }

    /// Allocate a fresh, never-reused object id.
    pub fn allocate_object_id(&self) -> ObjectId {
        ObjectId::new(self.next_object_id.fetch_add(1, Ordering::Relaxed))
    }

    /// The newest committed revision on a branch.
    pub fn head(&self, branch: BranchId) -> Result<Revision, StoreError> {
        self.read().branches.head(branch)
    }

    /// The revision the next commit on this branch will receive.
    pub fn next_revision(&self, branch: BranchId) -> Result<Revision, StoreError> {
        Ok(self.head(branch)?.next())
    }

    pub fn branch_record(&self, branch: BranchId) -> Result<BranchRecord, StoreError> {
        self.read().branches.record(branch).cloned()
    }

    pub fn branches(&self) -> Vec<BranchRecord> {
        self.read().branches.all()
    }

    /// Fork a new branch off `parent` at `at`. No data is copied; history
    /// below the fork point defers to the parent.
    pub fn fork_branch(&self, parent: BranchId, at: Revision) -> Result<BranchId, StoreError> {
        let mut state = self.write();
        let branch = state.branches.fork(parent, at)?;
        state.journal.push(StoreRecord::Fork {
            branch,
            parent,
            fork_revision: at,
        });
        info!(parent = %parent, branch = %branch, fork = %at, "branch forked");
        Ok(branch)
    }

    /// Publish one record. This is the single write path, shared by the
    /// transaction coordinator, journal recovery, and restore.
    ///
    /// Commit revisions must be strictly increasing per branch; the whole
    /// record becomes visible atomically or not at all.
    pub fn apply(&self, record: &StoreRecord) -> Result<(), StoreError> {
        let mut state = self.write();
        match record {
            StoreRecord::Fork {
                branch,
                parent,
                fork_revision,
            } => {
                state.branches.register_fork(*branch, *parent, *fork_revision)?;
                state.journal.push(record.clone());
                debug!(parent = %parent, branch = %branch, "fork record applied");
            }
            StoreRecord::Commit(commit) => {
                let head = state.branches.head(commit.branch)?;
                if commit.revision <= head {
                    return Err(StoreError::RevisionOutOfOrder {
                        branch: commit.branch,
                        head,
                        found: commit.revision,
                    });
                }
                for event in &commit.events {
                    match event {
                        ChangeEvent::AssociationCreated { type_name, .. } => {
                            self.schema.resolve_association_type(type_name)?;
                        }
                        _ => {
                            self.schema.resolve_type(event.type_name())?;
                        }
                    }
                }

                for event in &commit.events {
                    self.apply_event(&mut state, commit.branch, commit.revision, event);
                }
                state.branches.advance_head(commit.branch, commit.revision)?;
                state.journal.push(record.clone());
                debug!(
                    branch = %commit.branch,
                    revision = %commit.revision,
                    events = commit.events.len(),
                    "commit published"
                );
            }
        }
        Ok(())
    }

    fn apply_event(
        &self,
        state: &mut StoreState,
        branch: BranchId,
        revision: Revision,
        event: &ChangeEvent,
    ) {
        // Keep id allocation ahead of every id seen in replayed streams.
        self.next_object_id
            .fetch_max(event.object_id().as_u64() + 1, Ordering::Relaxed);

        match event {
            ChangeEvent::ItemCreated {
                type_name,
                id,
                attributes,
            }
            | ChangeEvent::ItemUpdated {
                type_name,
                id,
                attributes,
            } => {
                state.items.entry((branch, *id)).or_default().insert(
                    revision,
                    Some(ItemVersion {
                        type_name: type_name.clone(),
                        attributes: attributes.clone(),
                    }),
                );
            }
            ChangeEvent::ItemDeleted { id, .. } => {
                state
                    .items
                    .entry((branch, *id))
                    .or_default()
                    .insert(revision, None);
            }
            ChangeEvent::AssociationCreated {
                type_name,
                id,
                source,
                destination,
                order_key,
                attributes,
            } => {
                state.assocs.entry((branch, *id)).or_default().insert(
                    revision,
                    Some(AssocVersion {
                        type_name: type_name.clone(),
                        source: *source,
                        destination: *destination,
                        order_key: *order_key,
                        attributes: attributes.clone(),
                    }),
                );
                state.outgoing.entry(*source).or_default().insert(*id);
                state.incoming.entry(*destination).or_default().insert(*id);
            }
            ChangeEvent::AssociationDeleted { id, .. } => {
                state
                    .assocs
                    .entry((branch, *id))
                    .or_default()
                    .insert(revision, None);
            }
        }
    }

    /// Resolve an object key to the item version visible at its coordinate,
    /// or `None` if nothing (or a tombstone, or a different type) is there.
    pub fn resolve(&self, key: &ObjectKey) -> Result<Option<KnowledgeItem>, StoreError> {
        let state = self.read();
        let (chain, revision) = Self::coordinates(&state, key.branch, key.revision)?;

        Ok(visible_item(&state, &chain, revision, key.id)
            .filter(|(_, version)| version.type_name == key.type_name)
            .map(|(found, version)| KnowledgeItem {
                branch: key.branch,
                revision: found,
                type_name: version.type_name.clone(),
                id: key.id,
                attributes: version.attributes.clone(),
            }))
    }

    /// Like [`resolve`](Self::resolve), but absence is an error.
    pub fn get(&self, key: &ObjectKey) -> Result<KnowledgeItem, StoreError> {
        self.resolve(key)?
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })
    }

    /// Resolve an association by its own key.
    pub fn resolve_association(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<KnowledgeAssociation>, StoreError> {
        let state = self.read();
        let (chain, revision) = Self::coordinates(&state, key.branch, key.revision)?;

        Ok(visible_assoc(&state, &chain, revision, key.id)
            .filter(|(_, version)| version.type_name == key.type_name)
            .filter(|(_, version)| {
                visible_item(&state, &chain, revision, version.source).is_some()
                    && visible_item(&state, &chain, revision, version.destination).is_some()
            })
            .map(|(found, version)| assoc_at(key.branch, found, key.id, version)))
    }

    /// All associations of the given type leaving the keyed object, resolved
    /// at the key's coordinate. An association is returned only when both of
    /// its endpoints resolve at the same coordinate. Ordered by
    /// `(order_key, association id)`.
    pub fn outgoing(
        &self,
        key: &ObjectKey,
        assoc_type: &TypeName,
    ) -> Result<Vec<KnowledgeAssociation>, StoreError> {
        self.edges(key, assoc_type, Direction::Outgoing)
    }

    /// All associations of the given type arriving at the keyed object.
    pub fn incoming(
        &self,
        key: &ObjectKey,
        assoc_type: &TypeName,
    ) -> Result<Vec<KnowledgeAssociation>, StoreError> {
        self.edges(key, assoc_type, Direction::Incoming)
    }

    fn edges(
        &self,
        key: &ObjectKey,
        assoc_type: &TypeName,
        direction: Direction,
    ) -> Result<Vec<KnowledgeAssociation>, StoreError> {
        self.schema.resolve_association_type(assoc_type)?;
        let state = self.read();
        let (chain, revision) = Self::coordinates(&state, key.branch, key.revision)?;

        let candidates = match direction {
            Direction::Outgoing => state.outgoing.get(&key.id),
            Direction::Incoming => state.incoming.get(&key.id),
        };
        let Some(candidates) = candidates else {
            return Ok(Vec::new());
        };

        let mut edges: Vec<KnowledgeAssociation> = candidates
            .iter()
            .filter_map(|id| {
                visible_assoc(&state, &chain, revision, *id)
                    .filter(|(_, version)| &version.type_name == assoc_type)
                    .filter(|(_, version)| {
                        visible_item(&state, &chain, revision, version.source).is_some()
                            && visible_item(&state, &chain, revision, version.destination)
                                .is_some()
                    })
                    .map(|(found, version)| assoc_at(key.branch, found, *id, version))
            })
            .collect();

        edges.sort_by_key(|edge| (edge.order_key, edge.id));
        Ok(edges)
    }

    /// Returns `true` if any item version is visible for the id at the
    /// coordinate, regardless of its type.
    pub fn item_exists(
        &self,
        branch: BranchId,
        revision: RevisionSpec,
        id: ObjectId,
    ) -> Result<bool, StoreError> {
        Ok(self.item_type(branch, revision, id)?.is_some())
    }

    /// The type of the item visible for the id at the coordinate, if any.
    pub fn item_type(
        &self,
        branch: BranchId,
        revision: RevisionSpec,
        id: ObjectId,
    ) -> Result<Option<TypeName>, StoreError> {
        let state = self.read();
        let (chain, revision) = Self::coordinates(&state, branch, revision)?;
        Ok(visible_item(&state, &chain, revision, id).map(|(_, version)| version.type_name.clone()))
    }

    /// The newest revision at which the object changed, as seen from the
    /// given branch. Tombstones count as changes.
    pub fn latest_change(
        &self,
        branch: BranchId,
        id: ObjectId,
    ) -> Result<Option<Revision>, StoreError> {
        let state = self.read();
        let head = state.branches.head(branch)?;
        let chain = state.branches.ancestry(branch)?;

        for (level, cap) in &chain {
            let limit = cap.map_or(head, |cap| cap.min(head));
            let newest_item = state
                .items
                .get(&(*level, id))
                .and_then(|versions| versions.range(..=limit).next_back())
                .map(|(revision, _)| *revision);
            let newest_assoc = state
                .assocs
                .get(&(*level, id))
                .and_then(|versions| versions.range(..=limit).next_back())
                .map(|(revision, _)| *revision);
            let newest = match (newest_item, newest_assoc) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            if newest.is_some() {
                return Ok(newest);
            }
        }
        Ok(None)
    }

    /// The extent of a type (subtypes included) visible at a coordinate,
    /// ordered by object id.
    pub fn scan_items(
        &self,
        branch: BranchId,
        revision: RevisionSpec,
        type_name: &TypeName,
    ) -> Result<Vec<KnowledgeItem>, StoreError> {
        self.schema.resolve_type(type_name)?;
        let extent: BTreeSet<TypeName> = self.schema.extent_of(type_name).into_iter().collect();

        let state = self.read();
        let (chain, revision) = Self::coordinates(&state, branch, revision)?;
        let levels: BTreeSet<BranchId> = chain.iter().map(|(level, _)| *level).collect();

        let ids: BTreeSet<ObjectId> = state
            .items
            .keys()
            .filter(|(level, _)| levels.contains(level))
            .map(|(_, id)| *id)
            .collect();

        Ok(ids
            .into_iter()
            .filter_map(|id| {
                visible_item(&state, &chain, revision, id)
                    .filter(|(_, version)| extent.contains(&version.type_name))
                    .map(|(found, version)| KnowledgeItem {
                        branch,
                        revision: found,
                        type_name: version.type_name.clone(),
                        id,
                        attributes: version.attributes.clone(),
                    })
            })
            .collect())
    }

    /// The association extent of a type visible at a coordinate, endpoint
    /// visibility included, ordered by `(source, order_key, id)`.
    pub fn scan_associations(
        &self,
        branch: BranchId,
        revision: RevisionSpec,
        type_name: &TypeName,
    ) -> Result<Vec<KnowledgeAssociation>, StoreError> {
        self.schema.resolve_association_type(type_name)?;
        let extent: BTreeSet<TypeName> = self.schema.extent_of(type_name).into_iter().collect();

        let state = self.read();
        let (chain, revision) = Self::coordinates(&state, branch, revision)?;
        let levels: BTreeSet<BranchId> = chain.iter().map(|(level, _)| *level).collect();

        let ids: BTreeSet<ObjectId> = state
            .assocs
            .keys()
            .filter(|(level, _)| levels.contains(level))
            .map(|(_, id)| *id)
            .collect();

        let mut edges: Vec<KnowledgeAssociation> = ids
            .into_iter()
            .filter_map(|id| {
                visible_assoc(&state, &chain, revision, id)
                    .filter(|(_, version)| extent.contains(&version.type_name))
                    .filter(|(_, version)| {
                        visible_item(&state, &chain, revision, version.source).is_some()
                            && visible_item(&state, &chain, revision, version.destination)
                                .is_some()
                    })
                    .map(|(found, version)| assoc_at(branch, found, id, version))
            })
            .collect();

        edges.sort_by_key(|edge| (edge.source, edge.order_key, edge.id));
        Ok(edges)
    }

    /// Every applied record in publication order.
    pub fn records(&self) -> Vec<StoreRecord> {
        self.read().journal.clone()
    }

    fn coordinates(
        state: &StoreState,
        branch: BranchId,
        revision: RevisionSpec,
    ) -> Result<(Vec<(BranchId, Option<Revision>)>, Revision), StoreError> {
        let head = state.branches.head(branch)?;
        let chain = state.branches.ancestry(branch)?;
        Ok((chain, revision.resolve(head)))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        self.inner.read().expect("store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreState> {
        self.inner.write().expect("store lock poisoned")
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Outgoing,
    Incoming,
}

fn assoc_at(
    branch: BranchId,
    revision: Revision,
    id: ObjectId,
    version: &AssocVersion,
) -> KnowledgeAssociation {
    KnowledgeAssociation {
        branch,
        revision,
        type_name: version.type_name.clone(),
        id,
        source: version.source,
        destination: version.destination,
        order_key: version.order_key,
        attributes: version.attributes.clone(),
    }
}

/// The version of an item visible at `revision` along the ancestry chain.
///
/// The first chain level holding any entry at-or-before its cap decides:
/// a value is visible, a tombstone masks everything below.
fn visible_item<'a>(
    state: &'a StoreState,
    chain: &[(BranchId, Option<Revision>)],
    revision: Revision,
    id: ObjectId,
) -> Option<(Revision, &'a ItemVersion)> {
    for (level, cap) in chain {
        let limit = cap.map_or(revision, |cap| cap.min(revision));
        if let Some(versions) = state.items.get(&(*level, id)) {
            if let Some((found, version)) = versions.range(..=limit).next_back() {
                return version.as_ref().map(|v| (*found, v));
            }
        }
    }
    None
}

fn visible_assoc<'a>(
    state: &'a StoreState,
    chain: &[(BranchId, Option<Revision>)],
    revision: Revision,
    id: ObjectId,
) -> Option<(Revision, &'a AssocVersion)> {
    for (level, cap) in chain {
        let limit = cap.map_or(revision, |cap| cap.min(revision));
        if let Some(versions) = state.assocs.get(&(*level, id)) {
            if let Some((found, version)) = versions.range(..=limit).next_back() {
                return version.as_ref().map(|v| (*found, v));
            }
        }
    }
    None
}
