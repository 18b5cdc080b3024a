//! Association retyping: split a shared association type into narrower
//! types chosen by the source endpoint's item type.
//!
//! Typical schema evolution: a generic `references` association grows into
//! `personReferences` / `documentReferences` once the endpoints' types are
//! distinguished. The processor resolves each create's source type from the
//! stream context and retypes the event; deletes follow whatever type their
//! create was given.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use tkb_store::ChangeEvent;
use tkb_types::{ObjectId, TypeName};

use crate::error::MigrationError;
use crate::rewrite::{EventRewriter, RewriteAction, RewriteContext, RewriteStats};

pub struct AssociationRetyper {
    association_type: TypeName,
    /// Source item type to the narrower association type.
    mapping: BTreeMap<TypeName, TypeName>,
    /// The type each retyped association instance ended up with.
    assigned: HashMap<ObjectId, TypeName>,
    stats: RewriteStats,
}

impl AssociationRetyper {
    pub fn new(
        association_type: impl Into<TypeName>,
        mapping: BTreeMap<TypeName, TypeName>,
    ) -> Self {
        Self {
            association_type: association_type.into(),
            mapping,
            assigned: HashMap::new(),
            stats: RewriteStats::default(),
        }
    }

    /// The narrower type for a source item type, honoring generalization
    /// links: a subtype of a mapped type maps like the mapped type.
    fn target_type(&self, ctx: &RewriteContext, source_type: &TypeName) -> Option<TypeName> {
        self.mapping
            .iter()
            .find(|(mapped, _)| ctx.schema().is_subtype_of(source_type, mapped))
            .map(|(_, target)| target.clone())
    }
}

impl EventRewriter for AssociationRetyper {
    fn rewrite(
        &mut self,
        event: ChangeEvent,
        ctx: &RewriteContext,
    ) -> Result<RewriteAction, MigrationError> {
        match event {
            ChangeEvent::AssociationCreated {
                type_name,
                id,
                source,
                destination,
                order_key,
                attributes,
            } if type_name == self.association_type => {
                let source_type = ctx.item_type(source).cloned();
                let target = source_type
                    .as_ref()
                    .and_then(|source_type| self.target_type(ctx, source_type));

                match target {
                    Some(target) => {
                        self.assigned.insert(id, target.clone());
                        self.stats.adjusted += 1;
                        debug!(assoc = %id, from = %type_name, to = %target, "association retyped");
                        Ok(RewriteAction::Keep(ChangeEvent::AssociationCreated {
                            type_name: target,
                            id,
                            source,
                            destination,
                            order_key,
                            attributes,
                        }))
                    }
                    None => Ok(RewriteAction::Keep(ChangeEvent::AssociationCreated {
                        type_name,
                        id,
                        source,
                        destination,
                        order_key,
                        attributes,
                    })),
                }
            }
            ChangeEvent::AssociationDeleted { type_name, id }
                if type_name == self.association_type =>
            {
                match self.assigned.get(&id) {
                    Some(target) => Ok(RewriteAction::Keep(ChangeEvent::AssociationDeleted {
                        type_name: target.clone(),
                        id,
                    })),
                    None => Ok(RewriteAction::Keep(ChangeEvent::AssociationDeleted {
                        type_name,
                        id,
                    })),
                }
            }
            other => Ok(RewriteAction::Keep(other)),
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
                .with_type(TypeDef::item("Person"))
                .with_type(TypeDef::item("Employee").with_supertype("Person"))
                .with_type(TypeDef::item("Document"))
                .with_type(TypeDef::association("references", "Person", "Document"))
                .with_type(TypeDef::association("personReferences", "Person", "Document"))
                .build()
                .unwrap(),
        );
        RewriteContext::new(schema)
    }

    fn mapping() -> BTreeMap<TypeName, TypeName> {
        let mut mapping = BTreeMap::new();
        mapping.insert(TypeName::from("Person"), TypeName::from("personReferences"));
        mapping
    }

    fn feed(ctx: &mut RewriteContext, event: &ChangeEvent) {
        ctx.observe(event);
    }

    #[test]
    fn create_is_retyped_by_source_type() {
        let mut ctx = ctx();
        let mut processor = AssociationRetyper::new("references", mapping());

        let person = ChangeEvent::ItemCreated {
            type_name: "Person".into(),
            id: ObjectId::new(1),
            attributes: Attributes::new(),
        };
        feed(&mut ctx, &person);

        let event = ChangeEvent::AssociationCreated {
            type_name: "references".into(),
            id: ObjectId::new(10),
            source: ObjectId::new(1),
            destination: ObjectId::new(2),
            order_key: 0,
            attributes: Attributes::new(),
        };
        let action = processor.rewrite(event, &ctx).unwrap();
        match action {
            RewriteAction::Keep(ChangeEvent::AssociationCreated { type_name, .. }) => {
                assert_eq!(type_name.as_str(), "personReferences");
            }
            other => panic!("unexpected action: {other:?}"),
        }
        assert_eq!(processor.stats().adjusted, 1);
    }

    #[test]
    fn subtype_sources_map_like_their_supertype() {
        let mut ctx = ctx();
        let mut processor = AssociationRetyper::new("references", mapping());

        feed(
            &mut ctx,
            &ChangeEvent::ItemCreated {
                type_name: "Employee".into(),
                id: ObjectId::new(1),
                attributes: Attributes::new(),
            },
        );

        let action = processor
            .rewrite(
                ChangeEvent::AssociationCreated {
                    type_name: "references".into(),
                    id: ObjectId::new(10),
                    source: ObjectId::new(1),
                    destination: ObjectId::new(2),
                    order_key: 0,
                    attributes: Attributes::new(),
                },
                &ctx,
            )
            .unwrap();
        match action {
            RewriteAction::Keep(ChangeEvent::AssociationCreated { type_name, .. }) => {
                assert_eq!(type_name.as_str(), "personReferences");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn delete_follows_the_assigned_type() {
        let mut ctx = ctx();
        let mut processor = AssociationRetyper::new("references", mapping());

        feed(
            &mut ctx,
            &ChangeEvent::ItemCreated {
                type_name: "Person".into(),
                id: ObjectId::new(1),
                attributes: Attributes::new(),
            },
        );
        processor
            .rewrite(
                ChangeEvent::AssociationCreated {
                    type_name: "references".into(),
                    id: ObjectId::new(10),
                    source: ObjectId::new(1),
                    destination: ObjectId::new(2),
                    order_key: 0,
                    attributes: Attributes::new(),
                },
                &ctx,
            )
            .unwrap();

        let action = processor
            .rewrite(
                ChangeEvent::AssociationDeleted {
                    type_name: "references".into(),
                    id: ObjectId::new(10),
                },
                &ctx,
            )
            .unwrap();
        match action {
            RewriteAction::Keep(ChangeEvent::AssociationDeleted { type_name, .. }) => {
                assert_eq!(type_name.as_str(), "personReferences");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn unmapped_source_type_passes_through() {
        let mut ctx = ctx();
        let mut processor = AssociationRetyper::new("references", mapping());

        feed(
            &mut ctx,
            &ChangeEvent::ItemCreated {
                type_name: "Document".into(),
                id: ObjectId::new(3),
                attributes: Attributes::new(),
            },
        );

        let event = ChangeEvent::AssociationCreated {
            type_name: "references".into(),
            id: ObjectId::new(11),
            source: ObjectId::new(3),
            destination: ObjectId::new(4),
            order_key: 0,
            attributes: Attributes::new(),
        };
        let action = processor.rewrite(event.clone(), &ctx).unwrap();
        match action {
            RewriteAction::Keep(kept) => assert_eq!(kept, event),
            other => panic!("unexpected action: {other:?}"),
        }
        assert_eq!(processor.stats().adjusted, 0);
    }
}
