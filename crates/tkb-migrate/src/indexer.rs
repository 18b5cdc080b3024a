//! Migration-scoped secondary indexes.
//!
//! An [`Indexer`] is built once per migration run by scanning the
//! then-current extents of the source store and is discarded afterward. It
//! resolves cross-references during rewriting, e.g. mapping a lower-cased
//! person name to that person's key.

use std::collections::HashMap;

use tracing::{debug, warn};

use tkb_store::KnowledgeStore;
use tkb_types::{AttrValue, BranchId, RevisionSpec, TypeName};

use crate::error::MigrationError;

/// How a key attribute value is normalized before lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyMapping {
    /// Use the value's canonical rendering unchanged.
    Verbatim,
    /// Lower-case the rendering; lookups are case-insensitive.
    LowerCase,
}

impl KeyMapping {
    fn normalize(&self, value: &AttrValue) -> String {
        match self {
            KeyMapping::Verbatim => value.to_string(),
            KeyMapping::LowerCase => value.to_string().to_lowercase(),
        }
    }
}

/// What to index: the type's extent, which attributes form the key (with a
/// mapping per key attribute), and which attributes form the value.
///
/// With no value attributes, the indexed value is the item's own id.
#[derive(Clone, Debug)]
pub struct IndexSpec {
    pub type_name: TypeName,
    pub key_attributes: Vec<String>,
    pub key_mappings: Vec<KeyMapping>,
    pub value_attributes: Vec<String>,
}

/// One built index: normalized key tuple to value tuple.
pub struct Index {
    key_mappings: Vec<KeyMapping>,
    entries: HashMap<Vec<String>, Vec<AttrValue>>,
}

impl Index {
    /// Look up a value by key. The probe is normalized with the same
    /// mappings the index was built with, so e.g. a `LowerCase` index
    /// resolves mixed-case probes like their canonical form.
    pub fn get_value(&self, key: &[AttrValue]) -> Option<&Vec<AttrValue>> {
        let normalized: Vec<String> = key
            .iter()
            .zip(self.key_mappings.iter())
            .map(|(value, mapping)| mapping.normalize(value))
            .collect();
        self.entries.get(&normalized)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registry of named indexes for one migration run.
#[derive(Default)]
pub struct Indexer {
    indexes: HashMap<String, Index>,
}

impl Indexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index by scanning the type's extent at the given coordinate.
    ///
    /// Items missing a key attribute are skipped; on key collisions the
    /// first item (in id order) wins.
    pub fn register(
        &mut self,
        name: &str,
        store: &KnowledgeStore,
        branch: BranchId,
        revision: RevisionSpec,
        spec: IndexSpec,
    ) -> Result<&Index, MigrationError> {
        let items = store.scan_items(branch, revision, &spec.type_name)?;
        let mut entries: HashMap<Vec<String>, Vec<AttrValue>> = HashMap::new();

        for item in &items {
            let mut key = Vec::with_capacity(spec.key_attributes.len());
            let mut complete = true;
            for (attribute, mapping) in spec.key_attributes.iter().zip(spec.key_mappings.iter()) {
                match item.attribute(attribute) {
                    Some(value) => key.push(mapping.normalize(value)),
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                debug!(item = %item.id, "skipping item with incomplete index key");
                continue;
            }

            let value = if spec.value_attributes.is_empty() {
                vec![AttrValue::Id(item.id)]
            } else {
                let mut value = Vec::with_capacity(spec.value_attributes.len());
                for attribute in &spec.value_attributes {
                    match item.attribute(attribute) {
                        Some(attr_value) => value.push(attr_value.clone()),
                        None => {
                            complete = false;
                            break;
                        }
                    }
                }
                if !complete {
                    continue;
                }
                value
            };

            if entries.contains_key(&key) {
                warn!(item = %item.id, "duplicate index key; keeping first entry");
                continue;
            }
            entries.insert(key, value);
        }

        debug!(name, entries = entries.len(), "index built");
        self.indexes.insert(
            name.to_string(),
            Index {
                key_mappings: spec.key_mappings,
                entries,
            },
        );
        Ok(self.indexes.get(name).expect("index just inserted"))
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tkb_schema::{AttributeDef, SchemaBuilder, TypeDef, ValueType};
    use tkb_store::{ChangeEvent, CommitRecord, StoreRecord};
    use tkb_types::{Attributes, ObjectId, Revision, RevisionInfo};

    fn store_with_people(people: &[(u64, &str, u64)]) -> KnowledgeStore {
        let schema = Arc::new(
            SchemaBuilder::new()
                .with_type(
                    TypeDef::item("Person")
                        .with_attribute(AttributeDef::new("name", ValueType::Text))
                        .with_attribute(AttributeDef::new("group", ValueType::Id)),
                )
                .build()
                .unwrap(),
        );
        let store = KnowledgeStore::new(schema);
        for (index, (id, name, group)) in people.iter().enumerate() {
            let mut attributes = Attributes::new();
            attributes.insert("name".into(), AttrValue::Text((*name).into()));
            attributes.insert("group".into(), AttrValue::Id(ObjectId::new(*group)));
            store
                .apply(&StoreRecord::Commit(CommitRecord {
                    branch: BranchId::TRUNK,
                    revision: Revision::new(index as u64 + 1),
                    info: RevisionInfo::new("test"),
                    events: vec![ChangeEvent::ItemCreated {
                        type_name: "Person".into(),
                        id: ObjectId::new(*id),
                        attributes,
                    }],
                }))
                .unwrap();
        }
        store
    }

    fn name_spec(value_attributes: Vec<String>) -> IndexSpec {
        IndexSpec {
            type_name: "Person".into(),
            key_attributes: vec!["name".into()],
            key_mappings: vec![KeyMapping::LowerCase],
            value_attributes,
        }
    }

    #[test]
    fn mixed_case_probe_resolves_like_canonical_form() {
        let store = store_with_people(&[(1, "ada lovelace", 100), (2, "grace hopper", 200)]);
        let mut indexer = Indexer::new();
        indexer
            .register(
                "person-by-name",
                &store,
                BranchId::TRUNK,
                RevisionSpec::Current,
                name_spec(vec![]),
            )
            .unwrap();

        let index = indexer.index("person-by-name").unwrap();
        let canonical = index.get_value(&[AttrValue::Text("ada lovelace".into())]);
        let mixed = index.get_value(&[AttrValue::Text("Ada LOVELACE".into())]);
        assert_eq!(canonical, mixed);
        assert_eq!(canonical.unwrap(), &vec![AttrValue::Id(ObjectId::new(1))]);
    }

    #[test]
    fn value_attributes_override_the_default_id_value() {
        let store = store_with_people(&[(1, "ada", 100)]);
        let mut indexer = Indexer::new();
        indexer
            .register(
                "group-by-name",
                &store,
                BranchId::TRUNK,
                RevisionSpec::Current,
                name_spec(vec!["group".into()]),
            )
            .unwrap();

        let index = indexer.index("group-by-name").unwrap();
        assert_eq!(
            index.get_value(&[AttrValue::Text("ADA".into())]).unwrap(),
            &vec![AttrValue::Id(ObjectId::new(100))]
        );
    }

    #[test]
    fn missing_probe_is_none() {
        let store = store_with_people(&[(1, "ada", 100)]);
        let mut indexer = Indexer::new();
        indexer
            .register(
                "person-by-name",
                &store,
                BranchId::TRUNK,
                RevisionSpec::Current,
                name_spec(vec![]),
            )
            .unwrap();

        let index = indexer.index("person-by-name").unwrap();
        assert!(index.get_value(&[AttrValue::Text("nobody".into())]).is_none());
    }

    #[test]
    fn first_entry_wins_on_key_collision() {
        let store = store_with_people(&[(1, "Ada", 100), (2, "ada", 200)]);
        let mut indexer = Indexer::new();
        indexer
            .register(
                "person-by-name",
                &store,
                BranchId::TRUNK,
                RevisionSpec::Current,
                name_spec(vec![]),
            )
            .unwrap();

        let index = indexer.index("person-by-name").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get_value(&[AttrValue::Text("ADA".into())]).unwrap(),
            &vec![AttrValue::Id(ObjectId::new(1))]
        );
    }
}
