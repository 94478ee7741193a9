use thiserror::Error;

use crate::driver::DriverError;
use crate::type_handlers::ConversionError;
use crate::types::{InstantiationError, ResolutionError};
use crate::value::PropertyError;

/// Failures turning rows into objects. Row numbers count from 1 within the
/// current result set.
#[derive(Debug, Error)]
pub enum MaterializationError {
    #[error("statement '{statement}', row {row}: no column '{column}' for property '{property}'")]
    MissingColumn {
        statement: String,
        property: String,
        column: String,
        row: usize,
    },

    #[error("statement '{statement}', row {row}: cannot convert column '{column}' for property '{property}': {source}")]
    Conversion {
        statement: String,
        property: String,
        column: String,
        row: usize,
        #[source]
        source: ConversionError,
    },

    #[error("statement '{statement}', row {row}: cannot set property '{property}': {source}")]
    Property {
        statement: String,
        property: String,
        row: usize,
        #[source]
        source: PropertyError,
    },

    #[error("statement '{statement}', row {row}: {source}")]
    Instantiation {
        statement: String,
        row: usize,
        #[source]
        source: InstantiationError,
    },

    #[error("statement '{statement}': invalid sub-select key '{text}' for property '{property}'")]
    CompositeKey {
        statement: String,
        property: String,
        text: String,
    },

    #[error("statement '{statement}', row {row}: {source}")]
    Driver {
        statement: String,
        row: usize,
        #[source]
        source: DriverError,
    },

    #[error("statement '{statement}': {source}")]
    Resolution {
        statement: String,
        #[source]
        source: ResolutionError,
    },

    #[error("statement '{statement}': result map '{result_map}' is not defined")]
    UnknownResultMap {
        statement: String,
        result_map: String,
    },

    #[error("statement '{statement}': sub-select '{select}' for property '{property}' failed: {source}")]
    SubSelect {
        statement: String,
        select: String,
        property: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("statement '{statement}': sub-selects nested deeper than {limit}")]
    DepthExceeded { statement: String, limit: usize },

    #[error("statement '{statement}': sub-select '{select}' needs a mapper that is still alive")]
    ExecutorDropped { statement: String, select: String },
}
