//! The rewrite seam: one event in, zero or more events out.

use std::collections::HashMap;
use std::sync::Arc;

use tkb_schema::SchemaRepository;
use tkb_store::ChangeEvent;
use tkb_types::{ObjectId, TypeName};

use crate::error::MigrationError;
use crate::indexer::{Index, Indexer};

/// What a rewriter decides for one event.
#[derive(Clone, Debug)]
pub enum RewriteAction {
    /// Pass the event through, possibly retyped or retargeted.
    Keep(ChangeEvent),
    /// Substitute the event with a sequence (may be empty).
    Replace(Vec<ChangeEvent>),
    /// Remove the event from the stream.
    Drop,
}

/// Counters a processor reports after the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Events redirected, retyped, or otherwise adjusted in place.
    pub adjusted: u64,
    /// Redundant instances removed from the stream.
    pub deleted: u64,
}

/// Read access handed to rewriters: the target schema, the item types
/// accumulated from the stream so far, and registered secondary indexes.
pub struct RewriteContext {
    schema: Arc<SchemaRepository>,
    item_types: HashMap<ObjectId, TypeName>,
    indexer: Indexer,
}

impl RewriteContext {
    pub fn new(schema: Arc<SchemaRepository>) -> Self {
        Self {
            schema,
            item_types: HashMap::new(),
            indexer: Indexer::new(),
        }
    }

    pub fn with_indexer(mut self, indexer: Indexer) -> Self {
        self.indexer = indexer;
        self
    }

    pub fn schema(&self) -> &SchemaRepository {
        &self.schema
    }

    /// The type of an item as of the stream position, `None` if the item is
    /// not (or no longer) live.
    pub fn item_type(&self, id: ObjectId) -> Option<&TypeName> {
        self.item_types.get(&id)
    }

    /// A secondary index registered for this run.
    pub fn index(&self, name: &str) -> Result<&Index, MigrationError> {
        self.indexer
            .index(name)
            .ok_or_else(|| MigrationError::UnknownIndex(name.to_string()))
    }

    /// Track item lifecycle from the (rewritten) stream.
    pub(crate) fn observe(&mut self, event: &ChangeEvent) {
        match event {
            ChangeEvent::ItemCreated { type_name, id, .. }
            | ChangeEvent::ItemUpdated { type_name, id, .. } => {
                self.item_types.insert(*id, type_name.clone());
            }
            ChangeEvent::ItemDeleted { id, .. } => {
                self.item_types.remove(id);
            }
            ChangeEvent::AssociationCreated { .. } | ChangeEvent::AssociationDeleted { .. } => {}
        }
    }
}

/// One migration processor. Receives every event of the historic stream in
/// revision order and decides what the rewritten stream contains.
pub trait EventRewriter {
    fn rewrite(
        &mut self,
        event: ChangeEvent,
        ctx: &RewriteContext,
    ) -> Result<RewriteAction, MigrationError>;

    /// Counters for the administrative summary.
    fn stats(&self) -> RewriteStats {
        RewriteStats::default()
    }
}
