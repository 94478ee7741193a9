use thiserror::Error;

/// Malformed `#...#` inline parameter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InlineParameterError {
    #[error("unterminated inline parameter in '{0}'")]
    Unterminated(String),

    #[error("inline parameter '{0}' has no property name")]
    EmptyName(String),

    #[error("unknown field '{field}' in inline parameter '{token}'")]
    UnknownField { field: String, token: String },

    #[error("field '{field}' in inline parameter '{token}' has no value")]
    MissingValue { field: String, token: String },

    #[error("invalid {field} '{value}' in inline parameter '{token}'")]
    InvalidNumber {
        field: &'static str,
        value: String,
        token: String,
    },

    #[error("too many ':' sections in inline parameter '{0}'")]
    TooManySections(String),
}
