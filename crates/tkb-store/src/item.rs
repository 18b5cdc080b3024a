use serde::{Deserialize, Serialize};

use tkb_types::{AttrValue, Attributes, BranchId, ObjectId, ObjectKey, Revision, TypeName};

/// One immutable, versioned instance of an object as resolved at a
/// `(branch, revision)` coordinate.
///
/// `revision` is the revision at which this version was committed, which may
/// lie before the revision the item was resolved at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub branch: BranchId,
    pub revision: Revision,
    pub type_name: TypeName,
    pub id: ObjectId,
    pub attributes: Attributes,
}

impl KnowledgeItem {
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// The address of this exact version.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::at(self.branch, self.revision, self.type_name.clone(), self.id)
    }
}

/// A versioned, typed, directed edge between two items.
///
/// Associations are versioned exactly like items; `order_key` orders
/// multiple associations of the same type sharing a source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeAssociation {
    pub branch: BranchId,
    pub revision: Revision,
    pub type_name: TypeName,
    pub id: ObjectId,
    pub source: ObjectId,
    pub destination: ObjectId,
    pub order_key: i64,
    pub attributes: Attributes,
}

impl KnowledgeAssociation {
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::at(self.branch, self.revision, self.type_name.clone(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_key_addresses_exact_version() {
        let item = KnowledgeItem {
            branch: BranchId::TRUNK,
            revision: Revision::new(4),
            type_name: "Person".into(),
            id: ObjectId::new(7),
            attributes: Attributes::new(),
        };
        let key = item.key();
        assert_eq!(key.branch, BranchId::TRUNK);
        assert_eq!(key.id, ObjectId::new(7));
        assert_eq!(format!("{key}"), "Person#7@b0/r4");
    }

    #[test]
    fn attribute_lookup() {
        let mut attributes = Attributes::new();
        attributes.insert("name".into(), AttrValue::Text("Ada".into()));
        let item = KnowledgeItem {
            branch: BranchId::TRUNK,
            revision: Revision::new(1),
            type_name: "Person".into(),
            id: ObjectId::new(1),
            attributes,
        };
        assert_eq!(item.attribute("name").and_then(AttrValue::as_text), Some("Ada"));
        assert!(item.attribute("age").is_none());
    }
}
