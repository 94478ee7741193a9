use thiserror::Error;

use crate::parameters::InlineParameterError;
use crate::types::ResolutionError;
use crate::value::PropertyError;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error(transparent)]
    InlineParameter(#[from] InlineParameterError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Substitution(#[from] SubstitutionError),

    #[error("<{tag}> needs a compareProperty or compareValue")]
    MissingCompareTarget { tag: &'static str },

    #[error("<{tag}> has an invalid {attribute} '{value}'")]
    InvalidAttribute {
        tag: &'static str,
        attribute: &'static str,
        value: String,
    },

    #[error("cannot read '{property}': {source}")]
    Property {
        property: String,
        #[source]
        source: PropertyError,
    },

    #[error("<iterate> property '{property}' is not a list (found {kind})")]
    NotACollection { property: String, kind: &'static str },
}

impl TemplateError {
    pub(crate) fn property(property: &str, source: PropertyError) -> Self {
        TemplateError::Property {
            property: property.to_string(),
            source,
        }
    }
}

/// Failures of `$name$` substitution.
#[derive(Debug, Error)]
pub enum SubstitutionError {
    #[error("unterminated '$' substitution in '{0}'")]
    Unterminated(String),

    #[error("invalid substitution name '{0}'")]
    InvalidName(String),

    #[error("cannot substitute '{name}': {source}")]
    Property {
        name: String,
        #[source]
        source: PropertyError,
    },
}
