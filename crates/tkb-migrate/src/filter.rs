//! Type exclusion: drop every event of the named types.
//!
//! Backs the dump exclude-list, so sensitive extents (credential tables and
//! the like) are absent from a dump by construction.

use std::collections::BTreeSet;

use tkb_store::ChangeEvent;
use tkb_types::TypeName;

use crate::error::MigrationError;
use crate::rewrite::{EventRewriter, RewriteAction, RewriteContext};

pub struct TypeFilter {
    excluded: BTreeSet<TypeName>,
}

impl TypeFilter {
    pub fn new(excluded: BTreeSet<TypeName>) -> Self {
        Self { excluded }
    }
}

impl EventRewriter for TypeFilter {
    fn rewrite(
        &mut self,
        event: ChangeEvent,
        _ctx: &RewriteContext,
    ) -> Result<RewriteAction, MigrationError> {
        if self.excluded.contains(event.type_name()) {
            Ok(RewriteAction::Drop)
        } else {
            Ok(RewriteAction::Keep(event))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tkb_schema::{SchemaBuilder, TypeDef};
    use tkb_types::{Attributes, ObjectId};

    #[test]
    fn excluded_types_are_dropped() {
        let schema = Arc::new(
            SchemaBuilder::new()
                .with_type(TypeDef::item("Person"))
                .with_type(TypeDef::item("Credential"))
                .build()
                .unwrap(),
        );
        let ctx = crate::rewrite::RewriteContext::new(schema);

        let mut filter = TypeFilter::new(BTreeSet::from([TypeName::from("Credential")]));

        let secret = ChangeEvent::ItemCreated {
            type_name: "Credential".into(),
            id: ObjectId::new(1),
            attributes: Attributes::new(),
        };
        assert!(matches!(
            filter.rewrite(secret, &ctx).unwrap(),
            RewriteAction::Drop
        ));

        let person = ChangeEvent::ItemCreated {
            type_name: "Person".into(),
            id: ObjectId::new(2),
            attributes: Attributes::new(),
        };
        assert!(matches!(
            filter.rewrite(person, &ctx).unwrap(),
            RewriteAction::Keep(_)
        ));
    }
}
