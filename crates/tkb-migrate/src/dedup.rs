//! Duplicate-association cleanup.
//!
//! Historic bugs introduced repeated `(source, destination)` creates for the
//! same association type. This processor scans association history in
//! revision order and keeps the live destination set per source: a create
//! whose destination is already live is redundant and is removed from the
//! stream, and later events that referenced the redundant instance are
//! redirected onto the first (canonical) instance.
//!
//! Running the processor over already-clean history changes nothing, so a
//! second run reports zero adjustments.

use std::collections::HashMap;

use tracing::debug;

use tkb_store::ChangeEvent;
use tkb_types::{ObjectId, TypeName};

use crate::error::MigrationError;
use crate::rewrite::{EventRewriter, RewriteAction, RewriteContext, RewriteStats};

pub struct DuplicateAssociationCleanup {
    association_type: TypeName,
    /// Live edges per source: destination to canonical association id.
    live: HashMap<ObjectId, HashMap<ObjectId, ObjectId>>,
    /// Live association id to its endpoints.
    edges: HashMap<ObjectId, (ObjectId, ObjectId)>,
    /// Redundant association id to the canonical instance it duplicated.
    redirected: HashMap<ObjectId, ObjectId>,
    stats: RewriteStats,
}

impl DuplicateAssociationCleanup {
    pub fn new(association_type: impl Into<TypeName>) -> Self {
        Self {
            association_type: association_type.into(),
            live: HashMap::new(),
            edges: HashMap::new(),
            redirected: HashMap::new(),
            stats: RewriteStats::default(),
        }
    }

    fn drop_live(&mut self, id: ObjectId) {
        if let Some((source, destination)) = self.edges.remove(&id) {
            if let Some(by_destination) = self.live.get_mut(&source) {
                by_destination.remove(&destination);
            }
        }
    }
}

impl EventRewriter for DuplicateAssociationCleanup {
    fn rewrite(
        &mut self,
        event: ChangeEvent,
        _ctx: &RewriteContext,
    ) -> Result<RewriteAction, MigrationError> {
        match &event {
            ChangeEvent::AssociationCreated {
                type_name,
                id,
                source,
                destination,
                ..
            } if *type_name == self.association_type => {
                let by_destination = self.live.entry(*source).or_default();
                if let Some(&canonical) = by_destination.get(destination) {
                    // A second live edge to the same destination: redundant.
                    self.redirected.insert(*id, canonical);
                    self.stats.adjusted += 1;
                    self.stats.deleted += 1;
                    debug!(
                        assoc = %id,
                        canonical = %canonical,
                        source = %source,
                        destination = %destination,
                        "adjusted duplicate association"
                    );
                    Ok(RewriteAction::Drop)
                } else {
                    by_destination.insert(*destination, *id);
                    self.edges.insert(*id, (*source, *destination));
                    Ok(RewriteAction::Keep(event))
                }
            }
            ChangeEvent::AssociationDeleted { type_name, id }
                if *type_name == self.association_type =>
            {
                if let Some(&canonical) = self.redirected.get(id) {
                    // The delete referenced the redundant instance; redirect
                    // it onto the canonical one if that is still live.
                    if self.edges.contains_key(&canonical) {
                        self.drop_live(canonical);
                        self.stats.adjusted += 1;
                        debug!(assoc = %id, canonical = %canonical, "redirected delete of duplicate");
                        Ok(RewriteAction::Replace(vec![
                            ChangeEvent::AssociationDeleted {
                                type_name: type_name.clone(),
                                id: canonical,
                            },
                        ]))
                    } else {
                        Ok(RewriteAction::Drop)
                    }
                } else {
                    self.drop_live(*id);
                    Ok(RewriteAction::Keep(event))
                }
            }
            _ => Ok(RewriteAction::Keep(event)),
        }
    }

    fn stats(&self) -> RewriteStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tkb_schema::{SchemaBuilder, TypeDef};
    use tkb_types::Attributes;

    fn ctx() -> RewriteContext {
        let schema = Arc::new(
            SchemaBuilder::new()
                .with_type(TypeDef::item("Node"))
                .with_type(TypeDef::association("AB", "Node", "Node"))
                .build()
                .unwrap(),
        );
        RewriteContext::new(schema)
    }

    fn create(id: u64, source: u64, destination: u64) -> ChangeEvent {
        ChangeEvent::AssociationCreated {
            type_name: "AB".into(),
            id: ObjectId::new(id),
            source: ObjectId::new(source),
            destination: ObjectId::new(destination),
            order_key: 0,
            attributes: Attributes::new(),
        }
    }

    fn delete(id: u64) -> ChangeEvent {
        ChangeEvent::AssociationDeleted {
            type_name: "AB".into(),
            id: ObjectId::new(id),
        }
    }

    fn run(processor: &mut DuplicateAssociationCleanup, events: Vec<ChangeEvent>) -> Vec<ChangeEvent> {
        let ctx = ctx();
        let mut out = Vec::new();
        for event in events {
            match processor.rewrite(event, &ctx).unwrap() {
                RewriteAction::Keep(event) => out.push(event),
                RewriteAction::Replace(events) => out.extend(events),
                RewriteAction::Drop => {}
            }
        }
        out
    }

    #[test]
    fn clean_history_passes_unchanged() {
        let mut processor = DuplicateAssociationCleanup::new("AB");
        let events = vec![create(10, 1, 2), create(11, 1, 3), delete(10)];
        let out = run(&mut processor, events.clone());
        assert_eq!(out, events);
        assert_eq!(processor.stats(), RewriteStats::default());
    }

    #[test]
    fn duplicate_create_is_removed_and_counted() {
        let mut processor = DuplicateAssociationCleanup::new("AB");
        let out = run(
            &mut processor,
            vec![create(10, 1, 2), create(11, 1, 2), create(12, 1, 3)],
        );
        assert_eq!(out, vec![create(10, 1, 2), create(12, 1, 3)]);
        assert_eq!(processor.stats(), RewriteStats { adjusted: 1, deleted: 1 });
    }

    #[test]
    fn delete_of_duplicate_redirects_to_canonical() {
        let mut processor = DuplicateAssociationCleanup::new("AB");
        let out = run(
            &mut processor,
            vec![create(10, 1, 2), create(11, 1, 2), delete(11)],
        );
        // The delete referencing the redundant instance lands on the
        // canonical edge instead.
        assert_eq!(out, vec![create(10, 1, 2), delete(10)]);
        assert_eq!(processor.stats(), RewriteStats { adjusted: 2, deleted: 1 });
    }

    #[test]
    fn recreate_after_delete_is_not_a_duplicate() {
        let mut processor = DuplicateAssociationCleanup::new("AB");
        let events = vec![create(10, 1, 2), delete(10), create(11, 1, 2)];
        let out = run(&mut processor, events.clone());
        assert_eq!(out, events);
        assert_eq!(processor.stats(), RewriteStats::default());
    }

    #[test]
    fn same_destination_from_different_sources_is_fine() {
        let mut processor = DuplicateAssociationCleanup::new("AB");
        let events = vec![create(10, 1, 5), create(11, 2, 5)];
        let out = run(&mut processor, events.clone());
        assert_eq!(out, events);
        assert_eq!(processor.stats(), RewriteStats::default());
    }

    #[test]
    fn other_association_types_pass_through() {
        let mut processor = DuplicateAssociationCleanup::new("AB");
        let other = ChangeEvent::AssociationCreated {
            type_name: "CD".into(),
            id: ObjectId::new(20),
            source: ObjectId::new(1),
            destination: ObjectId::new(2),
            order_key: 0,
            attributes: Attributes::new(),
        };
        let out = run(&mut processor, vec![other.clone(), other.clone()]);
        assert_eq!(out.len(), 2);
        assert_eq!(processor.stats(), RewriteStats::default());
    }

    #[test]
    fn second_run_on_cleaned_stream_is_a_no_op() {
        let mut first = DuplicateAssociationCleanup::new("AB");
        let cleaned = run(
            &mut first,
            vec![create(10, 1, 2), create(11, 1, 2), create(12, 1, 3), delete(11)],
        );
        assert!(first.stats().deleted > 0);

        let mut second = DuplicateAssociationCleanup::new("AB");
        let out = run(&mut second, cleaned.clone());
        assert_eq!(out, cleaned);
        assert_eq!(second.stats(), RewriteStats::default());
    }
}
