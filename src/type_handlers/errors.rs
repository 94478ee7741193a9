use thiserror::Error;

use crate::driver::DriverError;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("cannot convert {kind} value '{value}' to {target}")]
    Incompatible {
        value: String,
        kind: &'static str,
        target: &'static str,
    },

    #[error("cannot parse '{text}' as {target}")]
    Parse { text: String, target: &'static str },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("{0}")]
    Custom(String),
}
