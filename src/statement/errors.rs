use thiserror::Error;

use crate::driver::DriverError;
use crate::type_handlers::ConversionError;
use crate::value::PropertyError;

/// Failures while binding parameters to a driver command.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("statement '{statement}': cannot read parameter '{property}': {source}")]
    Property {
        statement: String,
        property: String,
        #[source]
        source: PropertyError,
    },

    #[error("statement '{statement}': cannot convert parameter '{property}': {source}")]
    Conversion {
        statement: String,
        property: String,
        #[source]
        source: ConversionError,
    },

    #[error("statement '{statement}': driver rejected parameter '{property}': {source}")]
    Rejected {
        statement: String,
        property: String,
        #[source]
        source: DriverError,
    },

    #[error("statement '{statement}': SQL has {placeholders} placeholders but {parameters} parameters are mapped")]
    CountMismatch {
        statement: String,
        placeholders: usize,
        parameters: usize,
    },

    #[error("statement '{statement}': procedure '{procedure}' has no parameter for '{property}'")]
    SignatureMismatch {
        statement: String,
        procedure: String,
        property: String,
    },

    #[error("statement '{statement}': cannot read the signature of '{procedure}': {source}")]
    Signature {
        statement: String,
        procedure: String,
        #[source]
        source: DriverError,
    },

    #[error("statement '{statement}': cannot write output parameter '{property}': {source}")]
    Output {
        statement: String,
        property: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
