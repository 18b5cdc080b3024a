use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object::ObjectId;

/// One typed attribute value.
///
/// The value kinds mirror the schema's attribute value types; an attribute
/// bag maps attribute names to these values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Id(ObjectId),
    Timestamp(DateTime<Utc>),
}

/// An attribute bag: attribute name to value, in deterministic order.
pub type Attributes = BTreeMap<String, AttrValue>;

impl AttrValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<ObjectId> {
        match self {
            AttrValue::Id(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            AttrValue::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    /// The name of this value's kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Text(_) => "text",
            AttrValue::Id(_) => "id",
            AttrValue::Timestamp(_) => "timestamp",
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(value) => write!(f, "{value}"),
            AttrValue::Int(value) => write!(f, "{value}"),
            AttrValue::Float(value) => write!(f, "{value}"),
            AttrValue::Text(value) => f.write_str(value),
            AttrValue::Id(value) => write!(f, "{value}"),
            AttrValue::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<ObjectId> for AttrValue {
    fn from(value: ObjectId) -> Self {
        AttrValue::Id(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_kind() {
        assert_eq!(AttrValue::Int(5).as_int(), Some(5));
        assert_eq!(AttrValue::Int(5).as_text(), None);
        assert_eq!(AttrValue::Text("x".into()).as_text(), Some("x"));
        assert_eq!(AttrValue::Bool(true).as_bool(), Some(true));
        assert_eq!(AttrValue::Id(ObjectId::new(3)).as_id(), Some(ObjectId::new(3)));
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(AttrValue::Float(1.5).kind_name(), "float");
        assert_eq!(AttrValue::from("s").kind_name(), "text");
    }

    #[test]
    fn attribute_bag_iterates_in_name_order() {
        let mut attrs = Attributes::new();
        attrs.insert("zeta".into(), AttrValue::Int(1));
        attrs.insert("alpha".into(), AttrValue::Int(2));
        let names: Vec<&str> = attrs.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn serde_roundtrip() {
        let value = AttrValue::Text("hello".into());
        let json = serde_json::to_string(&value).unwrap();
        let parsed: AttrValue = serde_json::from_str(&json).unwrap();
        assert_eq!(value, parsed);
    }
}
