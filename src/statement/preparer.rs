//! Binds an expanded statement to a driver command.
//!
//! Positional drivers get one parameter per `?`. Named drivers get the `?`
//! rewritten to `<prefix>param<N>`, where repeated placeholders for the same
//! property share one parameter. Stored procedures bind either the mapped
//! parameters directly or the driver-derived signature.

use std::collections::HashMap;
use std::sync::Arc;

use super::errors::BindingError;
use super::procedure::ProcedureCache;
use crate::driver::{Command, DataSource, DbParameter, DriverCapabilities};
use crate::parameters::ParameterProperty;
use crate::template::Expanded;
use crate::value::Value;

/// One parameter added to the command.
#[derive(Debug, Clone)]
pub struct BoundParameter {
    /// Mapped property; `None` for derived procedure parameters nothing maps.
    pub property: Option<Arc<ParameterProperty>>,
    pub parameter: DbParameter,
}

/// Statement text and parameters as handed to the driver.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub text: String,
    pub parameters: Vec<BoundParameter>,
}

impl PreparedStatement {
    pub fn values(&self) -> Vec<Value> {
        self.parameters
            .iter()
            .map(|b| b.parameter.value.clone())
            .collect()
    }

    /// Copies output parameter values from the executed command into the
    /// parameter object. Returns how many were written.
    pub fn write_outputs(
        &self,
        statement: &str,
        command: &dyn Command,
        target: &Value,
    ) -> Result<usize, BindingError> {
        let mut written = 0;
        for bound in &self.parameters {
            let Some(property) = &bound.property else {
                continue;
            };
            if !bound.parameter.direction.is_output() {
                continue;
            }
            let output_error = |source: Box<dyn std::error::Error + Send + Sync>| {
                BindingError::Output {
                    statement: statement.to_string(),
                    property: property.property_name().to_string(),
                    source,
                }
            };
            let Value::Object(object) = target else {
                return Err(output_error(
                    format!("parameter object is a {}, not an object", target.kind_name()).into(),
                ));
            };
            let Some(executed) = command
                .parameters()
                .iter()
                .find(|p| p.name == bound.parameter.name)
            else {
                continue;
            };
            let value = if executed.value.is_null() {
                Value::Null
            } else {
                property
                    .handler()
                    .from_db(executed.value.clone())
                    .map_err(|e| output_error(e.into()))?
            };
            property
                .accessor()
                .set_on(object, value)
                .map_err(|e| output_error(e.into()))?;
            written += 1;
        }
        Ok(written)
    }
}

/// Byte offsets of `?` placeholders outside quoted literals.
pub(crate) fn placeholder_positions(sql: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut quote: Option<char> = None;
    for (i, c) in sql.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '?' => positions.push(i),
            None => {}
        }
    }
    positions
}

pub struct StatementPreparer<'a> {
    statement: &'a str,
    capabilities: &'a DriverCapabilities,
}

impl<'a> StatementPreparer<'a> {
    pub fn new(statement: &'a str, capabilities: &'a DriverCapabilities) -> Self {
        StatementPreparer {
            statement,
            capabilities,
        }
    }

    /// Sets the command text and adds one driver parameter per placeholder
    /// (positional) or per distinct property (named).
    pub fn prepare(
        &self,
        expanded: &Expanded,
        parameter: &Value,
        command: &mut dyn Command,
    ) -> Result<PreparedStatement, BindingError> {
        let positions = placeholder_positions(&expanded.sql);
        if positions.len() != expanded.parameters.len() {
            return Err(BindingError::CountMismatch {
                statement: self.statement.to_string(),
                placeholders: positions.len(),
                parameters: expanded.parameters.len(),
            });
        }

        let mut bound = Vec::with_capacity(expanded.parameters.len());
        let text = if self.capabilities.use_positional_parameters {
            for (i, property) in expanded.parameters.iter().enumerate() {
                let name = self.capabilities.parameter_name(&format!("param{}", i));
                bound.push(self.bind(property, parameter, name, command)?);
            }
            expanded.sql.clone()
        } else {
            let mut names: HashMap<&str, String> = HashMap::new();
            let mut text = String::with_capacity(expanded.sql.len() + positions.len() * 8);
            let mut last = 0;
            for (position, property) in positions.iter().zip(&expanded.parameters) {
                let base = match names.get(property.property_name()) {
                    Some(base) => base.clone(),
                    None => {
                        let base = format!("param{}", names.len());
                        let name = self.capabilities.parameter_name(&base);
                        bound.push(self.bind(property, parameter, name, command)?);
                        names.insert(property.property_name(), base.clone());
                        base
                    }
                };
                text.push_str(&expanded.sql[last..*position]);
                text.push_str(&self.capabilities.sql_placeholder(&base));
                last = position + 1;
            }
            text.push_str(&expanded.sql[last..]);
            text
        };

        command.set_text(&text);
        log::debug!(
            "Prepared '{}' with {} parameters",
            self.statement,
            bound.len()
        );
        Ok(PreparedStatement {
            text,
            parameters: bound,
        })
    }

    /// Binds a stored procedure call. With derived signatures every signature
    /// parameter is added in signature order and mapped properties are matched
    /// to it by column (or property) name.
    pub fn prepare_procedure(
        &self,
        procedure: &str,
        properties: &[Arc<ParameterProperty>],
        parameter: &Value,
        command: &mut dyn Command,
        source: &dyn DataSource,
        signatures: &ProcedureCache,
    ) -> Result<PreparedStatement, BindingError> {
        command.set_text(procedure);
        let mut bound = Vec::with_capacity(properties.len());

        if !self.capabilities.use_derive_parameters {
            for property in properties {
                let base = property.column_name().unwrap_or(property.property_name());
                let name = self.capabilities.parameter_name(base);
                bound.push(self.bind(property, parameter, name, command)?);
            }
            return Ok(PreparedStatement {
                text: procedure.to_string(),
                parameters: bound,
            });
        }

        let signature = signatures.signature(source, procedure).map_err(|source| {
            BindingError::Signature {
                statement: self.statement.to_string(),
                procedure: procedure.to_string(),
                source,
            }
        })?;
        let prefix = self.capabilities.parameter_prefix.as_str();
        let mut matched: Vec<Option<&Arc<ParameterProperty>>> = vec![None; signature.len()];
        for property in properties {
            let wanted = property.column_name().unwrap_or(property.property_name());
            let slot = signature
                .iter()
                .position(|p| p.name.trim_start_matches(prefix).eq_ignore_ascii_case(wanted))
                .ok_or_else(|| BindingError::SignatureMismatch {
                    statement: self.statement.to_string(),
                    procedure: procedure.to_string(),
                    property: property.property_name().to_string(),
                })?;
            matched[slot] = Some(property);
        }

        for (derived, property) in signature.into_iter().zip(matched) {
            let mut db = derived;
            if let Some(property) = property {
                if db.direction.is_input() {
                    self.set_value(property, parameter, &mut db)?;
                }
            }
            self.add(property, &mut *command, db.clone())?;
            bound.push(BoundParameter {
                property: property.cloned(),
                parameter: db,
            });
        }
        Ok(PreparedStatement {
            text: procedure.to_string(),
            parameters: bound,
        })
    }

    fn bind(
        &self,
        property: &Arc<ParameterProperty>,
        parameter: &Value,
        name: String,
        command: &mut dyn Command,
    ) -> Result<BoundParameter, BindingError> {
        let mut db = command.create_parameter();
        db.name = name;
        db.direction = property.direction();
        db.db_type = property.db_type().map(str::to_string);
        if self.capabilities.set_db_parameter_size {
            db.size = property.size();
        }
        if self.capabilities.set_db_parameter_precision {
            db.precision = property.precision();
        }
        if self.capabilities.set_db_parameter_scale {
            db.scale = property.scale();
        }
        if property.direction().is_input() {
            self.set_value(property, parameter, &mut db)?;
        }
        self.add(Some(property), command, db.clone())?;
        Ok(BoundParameter {
            property: Some(property.clone()),
            parameter: db,
        })
    }

    fn set_value(
        &self,
        property: &ParameterProperty,
        parameter: &Value,
        db: &mut DbParameter,
    ) -> Result<(), BindingError> {
        let value = property
            .bind_value(parameter)
            .map_err(|source| BindingError::Property {
                statement: self.statement.to_string(),
                property: property.property_name().to_string(),
                source,
            })?;
        property
            .handler()
            .set_parameter(db, &value)
            .map_err(|source| BindingError::Conversion {
                statement: self.statement.to_string(),
                property: property.property_name().to_string(),
                source,
            })
    }

    fn add(
        &self,
        property: Option<&Arc<ParameterProperty>>,
        command: &mut dyn Command,
        db: DbParameter,
    ) -> Result<(), BindingError> {
        let name = property.map_or_else(|| db.name.clone(), |p| p.property_name().to_string());
        log::trace!("Binding {} = {:?}", db.name, db.value);
        command
            .add_parameter(db)
            .map_err(|source| BindingError::Rejected {
                statement: self.statement.to_string(),
                property: name,
                source,
            })
    }
}
