//! Build-once, read-only registry of schema types.
//!
//! A [`SchemaRepository`] is constructed through [`SchemaBuilder`] at startup
//! and shared as an `Arc` afterward. It is never mutated at runtime; schema
//! changes go through a migration run against a fresh repository.

use std::collections::HashMap;

use tracing::debug;

use tkb_types::{AttrValue, Attributes, TypeName};

use crate::error::SchemaError;
use crate::types::{AttributeDef, TypeDef, TypeKind};

/// Collects type definitions and validates cross-references on build.
#[derive(Default)]
pub struct SchemaBuilder {
    types: Vec<TypeDef>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, def: TypeDef) -> Self {
        self.types.push(def);
        self
    }

    /// Validate all definitions and freeze them into a repository.
    ///
    /// Duplicate type names, dangling supertype links, and association
    /// endpoint types that are not defined are build errors.
    pub fn build(self) -> Result<SchemaRepository, SchemaError> {
        let mut types: HashMap<TypeName, TypeDef> = HashMap::new();

        for def in self.types {
            if types.contains_key(&def.name) {
                return Err(SchemaError::DuplicateType(def.name));
            }
            types.insert(def.name.clone(), def);
        }

        for def in types.values() {
            if let Some(supertype) = &def.supertype {
                if !types.contains_key(supertype) {
                    return Err(SchemaError::UnknownSupertype {
                        type_name: def.name.clone(),
                        supertype: supertype.clone(),
                    });
                }
            }
            if let TypeKind::Association {
                source_type,
                dest_type,
            } = &def.kind
            {
                for endpoint in [source_type, dest_type] {
                    if !types.contains_key(endpoint) {
                        return Err(SchemaError::UnknownEndpointType {
                            type_name: def.name.clone(),
                            endpoint: endpoint.clone(),
                        });
                    }
                }
            }
        }

        debug!(types = types.len(), "schema repository built");
        Ok(SchemaRepository { types })
    }
}

/// The loaded, immutable type catalog.
#[derive(Debug)]
pub struct SchemaRepository {
    types: HashMap<TypeName, TypeDef>,
}

impl SchemaRepository {
    /// Resolve a type by name.
    pub fn resolve_type(&self, name: &TypeName) -> Result<&TypeDef, SchemaError> {
        self.types
            .get(name)
            .ok_or_else(|| SchemaError::UnknownType(name.clone()))
    }

    /// Resolve a type by name and require it to be an association type.
    pub fn resolve_association_type(&self, name: &TypeName) -> Result<&TypeDef, SchemaError> {
        let def = self.resolve_type(name)?;
        if !def.is_association() {
            return Err(SchemaError::NotAnAssociationType(name.clone()));
        }
        Ok(def)
    }

    /// Returns `true` if `sub` equals `sup` or descends from it through
    /// generalization links.
    pub fn is_subtype_of(&self, sub: &TypeName, sup: &TypeName) -> bool {
        let mut cursor = Some(sub.clone());
        while let Some(name) = cursor {
            if &name == sup {
                return true;
            }
            cursor = self
                .types
                .get(&name)
                .and_then(|def| def.supertype.clone());
        }
        false
    }

    /// All attributes of a type, inherited ones first. A subtype declaration
    /// overrides an inherited attribute with the same name.
    pub fn attributes_of(&self, name: &TypeName) -> Result<Vec<&AttributeDef>, SchemaError> {
        let mut chain = Vec::new();
        let mut cursor = Some(name.clone());
        while let Some(current) = cursor {
            let def = self.resolve_type(&current)?;
            chain.push(def);
            cursor = def.supertype.clone();
        }

        let mut merged: Vec<&AttributeDef> = Vec::new();
        for def in chain.iter().rev() {
            for attribute in &def.attributes {
                if let Some(slot) = merged.iter_mut().find(|a| a.name == attribute.name) {
                    *slot = attribute;
                } else {
                    merged.push(attribute);
                }
            }
        }
        Ok(merged)
    }

    /// Look up an attribute on a type, including inherited attributes.
    pub fn attribute_of(
        &self,
        name: &TypeName,
        attribute: &str,
    ) -> Result<&AttributeDef, SchemaError> {
        self.attributes_of(name)?
            .into_iter()
            .find(|a| a.name == attribute)
            .ok_or_else(|| SchemaError::UnknownAttribute {
                type_name: name.clone(),
                attribute: attribute.to_string(),
            })
    }

    /// Validate an attribute bag against a type's declared attributes.
    ///
    /// Every present attribute must be declared with a matching value type;
    /// every mandatory attribute must be present.
    pub fn validate_attributes(
        &self,
        name: &TypeName,
        attributes: &Attributes,
    ) -> Result<(), SchemaError> {
        let declared = self.attributes_of(name)?;

        for (attr_name, value) in attributes {
            let def = declared
                .iter()
                .find(|a| &a.name == attr_name)
                .ok_or_else(|| SchemaError::UnknownAttribute {
                    type_name: name.clone(),
                    attribute: attr_name.clone(),
                })?;
            if !def.value_type.accepts(value) {
                return Err(SchemaError::ValueTypeMismatch {
                    type_name: name.clone(),
                    attribute: attr_name.clone(),
                    expected: def.value_type.name(),
                    actual: AttrValue::kind_name(value),
                });
            }
        }

        for def in declared {
            if def.mandatory && !attributes.contains_key(&def.name) {
                return Err(SchemaError::MissingAttribute {
                    type_name: name.clone(),
                    attribute: def.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// All type names whose extent is included when scanning `name`, i.e.
    /// the type itself and all of its declared subtypes.
    pub fn extent_of(&self, name: &TypeName) -> Vec<TypeName> {
        let mut extent: Vec<TypeName> = self
            .types
            .keys()
            .filter(|candidate| self.is_subtype_of(candidate, name))
            .cloned()
            .collect();
        extent.sort();
        extent
    }

    /// Number of loaded types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
