use serde::{Deserialize, Serialize};
use tkb_types::{AttrValue, TypeName};

/// The value type an attribute may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Text,
    Id,
    Timestamp,
}

impl ValueType {
    /// Returns `true` if the given value matches this declared type.
    pub fn accepts(&self, value: &AttrValue) -> bool {
        matches!(
            (self, value),
            (ValueType::Bool, AttrValue::Bool(_))
                | (ValueType::Int, AttrValue::Int(_))
                | (ValueType::Float, AttrValue::Float(_))
                | (ValueType::Text, AttrValue::Text(_))
                | (ValueType::Id, AttrValue::Id(_))
                | (ValueType::Timestamp, AttrValue::Timestamp(_))
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Text => "text",
            ValueType::Id => "id",
            ValueType::Timestamp => "timestamp",
        }
    }
}

/// One typed attribute of a schema type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub value_type: ValueType,
    pub mandatory: bool,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            mandatory: false,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

/// Whether a type's extent holds plain items or directed edges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    /// A plain object type.
    Item,
    /// A directed edge type with declared endpoint types.
    Association {
        source_type: TypeName,
        dest_type: TypeName,
    },
}

/// A named schema element with a table-like extent: attributes, an optional
/// generalization (supertype) link, and an item/association kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: TypeName,
    pub supertype: Option<TypeName>,
    pub attributes: Vec<AttributeDef>,
    pub kind: TypeKind,
}

impl TypeDef {
    /// Define a plain item type.
    pub fn item(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            supertype: None,
            attributes: Vec::new(),
            kind: TypeKind::Item,
        }
    }

    /// Define an association type between the given endpoint types.
    pub fn association(
        name: impl Into<TypeName>,
        source_type: impl Into<TypeName>,
        dest_type: impl Into<TypeName>,
    ) -> Self {
        Self {
            name: name.into(),
            supertype: None,
            attributes: Vec::new(),
            kind: TypeKind::Association {
                source_type: source_type.into(),
                dest_type: dest_type.into(),
            },
        }
    }

    pub fn with_supertype(mut self, supertype: impl Into<TypeName>) -> Self {
        self.supertype = Some(supertype.into());
        self
    }

    pub fn with_attribute(mut self, attribute: AttributeDef) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn is_association(&self) -> bool {
        matches!(self.kind, TypeKind::Association { .. })
    }

    /// Find a directly declared attribute (not including inherited ones).
    pub fn declared_attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }
}
