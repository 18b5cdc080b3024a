use tkb_types::TypeName;

/// Errors produced by schema resolution and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("unknown type: {0}")]
    UnknownType(TypeName),

    #[error("type {0} is not an association type")]
    NotAnAssociationType(TypeName),

    #[error("type {type_name} has no attribute {attribute}")]
    UnknownAttribute {
        type_name: TypeName,
        attribute: String,
    },

    #[error(
        "attribute {type_name}.{attribute} expects {expected}, got {actual}"
    )]
    ValueTypeMismatch {
        type_name: TypeName,
        attribute: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("mandatory attribute {type_name}.{attribute} is missing")]
    MissingAttribute {
        type_name: TypeName,
        attribute: String,
    },

    #[error("duplicate type definition: {0}")]
    DuplicateType(TypeName),

    #[error("type {type_name} references unknown supertype {supertype}")]
    UnknownSupertype {
        type_name: TypeName,
        supertype: TypeName,
    },

    #[error("association type {type_name} references unknown endpoint type {endpoint}")]
    UnknownEndpointType {
        type_name: TypeName,
        endpoint: TypeName,
    },
}
