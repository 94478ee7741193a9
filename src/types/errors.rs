use thiserror::Error;

use crate::value::PropertyError;

/// Failures resolving type aliases, property paths and converters while
/// definitions are compiled.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolutionError {
    #[error("unresolved type alias '{0}'")]
    UnknownType(String),

    #[error("class '{class}' has no property '{property}'")]
    UnknownProperty { class: String, property: String },

    #[error("class '{0}' is already registered")]
    DuplicateClass(String),

    #[error("invalid property path '{0}'")]
    InvalidPath(String),

    #[error("unknown type handler '{0}'")]
    UnknownHandler(String),

    #[error("unknown parameter direction '{0}'")]
    UnknownDirection(String),

    #[error("invalid {attribute} '{value}' for property '{property}'")]
    InvalidAttribute {
        property: String,
        attribute: &'static str,
        value: String,
    },

    #[error("type '{0}' cannot be instantiated as a result object")]
    NotInstantiable(String),
}

impl From<PropertyError> for ResolutionError {
    fn from(err: PropertyError) -> Self {
        match err {
            PropertyError::NoSuchProperty {
                type_name,
                property,
            } => ResolutionError::UnknownProperty {
                class: type_name,
                property,
            },
            PropertyError::InvalidPath(path) => ResolutionError::InvalidPath(path),
            other => ResolutionError::InvalidPath(other.to_string()),
        }
    }
}

/// Runtime failure of an instance factory.
#[derive(Debug, Error)]
#[error("cannot instantiate '{class}': {message}")]
pub struct InstantiationError {
    pub class: String,
    pub message: String,
}
