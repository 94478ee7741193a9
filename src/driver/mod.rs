//! Database driver abstraction consumed by the mapper.
//!
//! The mapper never talks to a database directly: it creates commands through
//! a [`DataSource`], binds [`DbParameter`]s and reads rows from a
//! [`RowCursor`]. [`memory::MemoryDataSource`] is a scripted implementation
//! used by the tests.

pub mod errors;
pub mod memory;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::value::Value;

pub use errors::DriverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    Text,
    StoredProcedure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    /// Accepts the usual spellings (`in`, `Input`, `inout`, `InputOutput`, ...).
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "in" | "input" => Some(ParameterDirection::Input),
            "out" | "output" => Some(ParameterDirection::Output),
            "inout" | "inputoutput" => Some(ParameterDirection::InputOutput),
            "return" | "returnvalue" => Some(ParameterDirection::ReturnValue),
            _ => None,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, ParameterDirection::Input | ParameterDirection::InputOutput)
    }

    pub fn is_output(&self) -> bool {
        !matches!(self, ParameterDirection::Input)
    }
}

/// Driver-level bound parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbParameter {
    pub name: String,
    pub value: Value,
    pub direction: ParameterDirection,
    pub db_type: Option<String>,
    pub size: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
}

/// What the driver supports, used by the statement preparer.
#[derive(Debug, Clone, PartialEq, Validate, Serialize, Deserialize)]
#[validate(schema(function = "validate_named_prefix"))]
pub struct DriverCapabilities {
    /// `?` placeholders bound by position; otherwise named placeholders.
    pub use_positional_parameters: bool,

    #[validate(length(max = 4, message = "Parameter prefix is at most 4 characters"))]
    pub parameter_prefix: String,

    /// Prefix written in front of placeholder names in SQL text.
    pub use_prefix_in_sql: bool,

    /// Prefix included in the driver parameter's own name.
    pub use_prefix_in_parameter: bool,

    pub set_db_parameter_size: bool,
    pub set_db_parameter_precision: bool,
    pub set_db_parameter_scale: bool,

    /// Procedure signatures can be read with `derive_parameters`.
    pub use_derive_parameters: bool,
}

fn validate_named_prefix(caps: &DriverCapabilities) -> Result<(), ValidationError> {
    if !caps.use_positional_parameters && caps.use_prefix_in_sql && caps.parameter_prefix.is_empty() {
        let mut err = ValidationError::new("named_placeholder_prefix");
        err.message = Some("Named placeholders in SQL require a parameter prefix".into());
        return Err(err);
    }
    Ok(())
}

impl Default for DriverCapabilities {
    fn default() -> Self {
        Self {
            use_positional_parameters: true,
            parameter_prefix: "@".to_string(),
            use_prefix_in_sql: true,
            use_prefix_in_parameter: true,
            set_db_parameter_size: true,
            set_db_parameter_precision: true,
            set_db_parameter_scale: true,
            use_derive_parameters: false,
        }
    }
}

impl DriverCapabilities {
    /// Named-placeholder driver with the given prefix.
    pub fn named(prefix: &str) -> Self {
        Self {
            use_positional_parameters: false,
            parameter_prefix: prefix.to_string(),
            ..Default::default()
        }
    }

    /// Name given to the driver parameter for placeholder `base`.
    pub fn parameter_name(&self, base: &str) -> String {
        if self.use_prefix_in_parameter {
            format!("{}{}", self.parameter_prefix, base)
        } else {
            base.to_string()
        }
    }

    /// Token written into SQL for a named placeholder.
    pub fn sql_placeholder(&self, base: &str) -> String {
        if self.use_prefix_in_sql {
            format!("{}{}", self.parameter_prefix, base)
        } else {
            base.to_string()
        }
    }
}

pub trait RowCursor {
    /// Advances to the next row of the current result set.
    fn read(&mut self) -> Result<bool, DriverError>;
    fn column_count(&self) -> usize;
    fn column_name(&self, index: usize) -> Option<&str>;
    /// Case-insensitive column lookup.
    fn column_index(&self, name: &str) -> Option<usize>;
    fn get_value(&self, index: usize) -> Result<Value, DriverError>;
    fn is_null(&self, index: usize) -> bool;
    /// Moves to the next result set.
    fn next_result(&mut self) -> Result<bool, DriverError>;
}

pub trait Command {
    fn kind(&self) -> CommandKind;
    fn set_text(&mut self, text: &str);
    fn text(&self) -> &str;

    fn create_parameter(&self) -> DbParameter {
        DbParameter::default()
    }

    fn add_parameter(&mut self, parameter: DbParameter) -> Result<(), DriverError>;

    /// Bound parameters; output values are visible after execution.
    fn parameters(&self) -> &[DbParameter];

    fn execute_query(&mut self) -> Result<Box<dyn RowCursor>, DriverError>;

    /// Returns the number of affected rows.
    fn execute_non_query(&mut self) -> Result<u64, DriverError>;
}

pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;
    fn connection_string(&self) -> &str;
    fn capabilities(&self) -> &DriverCapabilities;
    fn create_command(&self, kind: CommandKind) -> Result<Box<dyn Command>, DriverError>;
    /// Reads a stored procedure's parameter signature.
    fn derive_parameters(&self, procedure: &str) -> Result<Vec<DbParameter>, DriverError>;
}
