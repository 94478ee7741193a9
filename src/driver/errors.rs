use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DriverError {
    #[error("parameter '{name}' rejected: {reason}")]
    ParameterRejected { name: String, reason: String },

    #[error("no column at index {0}")]
    ColumnOutOfRange(usize),

    #[error("no current row")]
    NoCurrentRow,

    #[error("procedure '{0}' not found")]
    UnknownProcedure(String),

    #[error("command failed: {0}")]
    CommandFailed(String),
}
