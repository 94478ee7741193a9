use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::driver::DriverError;
use crate::results::MaterializationError;
use crate::statement::{BindingError, StatementKind};
use crate::template::TemplateError;
use crate::types::ResolutionError;
use crate::value::PropertyError;

/// Errors found while compiling mapping definitions. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error(transparent)]
    Settings(#[from] ConfigError),

    #[error("{kind} '{id}' is invalid: {source}")]
    Validation {
        kind: &'static str,
        id: String,
        #[source]
        source: validator::ValidationErrors,
    },

    #[error("{kind} '{id}': {source}")]
    Resolution {
        kind: &'static str,
        id: String,
        #[source]
        source: ResolutionError,
    },

    #[error("statement '{statement}': {source}")]
    Template {
        statement: String,
        #[source]
        source: TemplateError,
    },

    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("{kind} '{id}' referenced by '{referenced_by}' is not defined")]
    UnknownReference {
        kind: &'static str,
        id: String,
        referenced_by: String,
    },

    #[error("{kind} '{id}' extends itself")]
    CyclicExtends { kind: &'static str, id: String },

    #[error("{kind} '{id}': {message}")]
    Invalid {
        kind: &'static str,
        id: String,
        message: String,
    },
}

/// Errors of statement execution.
#[derive(Debug, Error)]
pub enum DataMapperError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("statement '{0}' is not defined")]
    StatementNotFound(String),

    #[error("statement '{statement}' is a {kind} statement and cannot be used as {expected}")]
    WrongStatementKind {
        statement: String,
        kind: StatementKind,
        expected: &'static str,
    },

    #[error("statement '{statement}': cannot expand SQL: {source}")]
    Expansion {
        statement: String,
        #[source]
        source: TemplateError,
    },

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Materialization(#[from] MaterializationError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("statement '{statement}': {source}")]
    Driver {
        statement: String,
        #[source]
        source: DriverError,
    },

    #[error("statement '{statement}' returned {count} results where at most one was expected")]
    TooManyResults { statement: String, count: usize },

    #[error("statement '{statement}': property '{property}': {source}")]
    Property {
        statement: String,
        property: String,
        #[source]
        source: PropertyError,
    },
}

impl DataMapperError {
    pub(crate) fn driver(statement: &str, source: DriverError) -> Self {
        DataMapperError::Driver {
            statement: statement.to_string(),
            source,
        }
    }
}
