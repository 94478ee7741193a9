//! Value converters between application values and driver values.

pub mod builtin;
pub mod errors;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::driver::{DbParameter, RowCursor};
use crate::types::{PropertyType, ResolutionError, ScalarType};
use crate::value::Value;

pub use builtin::{coerce, ScalarHandler, UnknownTypeHandler};
pub use errors::ConversionError;

pub trait TypeHandler: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Driver value to application value.
    fn from_db(&self, raw: Value) -> Result<Value, ConversionError>;

    /// Application value to driver value. Never called with null.
    fn to_db(&self, value: &Value) -> Result<Value, ConversionError>;

    /// Parses a literal from configuration text (null values, compare values).
    fn value_of(&self, text: &str) -> Result<Value, ConversionError>;

    fn get_value(&self, row: &dyn RowCursor, index: usize) -> Result<Value, ConversionError> {
        if row.is_null(index) {
            return Ok(Value::Null);
        }
        let raw = row.get_value(index)?;
        self.from_db(raw)
    }

    fn set_parameter(
        &self,
        parameter: &mut DbParameter,
        value: &Value,
    ) -> Result<(), ConversionError> {
        parameter.value = if value.is_null() {
            Value::Null
        } else {
            self.to_db(value)?
        };
        Ok(())
    }

    /// False for late-bound handlers whose target type is not known up front.
    fn is_simple(&self) -> bool {
        true
    }
}

/// Converter registry owned by one configuration.
#[derive(Debug, Clone)]
pub struct TypeHandlerRegistry {
    by_type: HashMap<(ScalarType, Option<String>), Arc<dyn TypeHandler>>,
    named: HashMap<String, Arc<dyn TypeHandler>>,
}

impl Default for TypeHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeHandlerRegistry {
    pub fn new() -> Self {
        let mut by_type: HashMap<(ScalarType, Option<String>), Arc<dyn TypeHandler>> =
            HashMap::new();
        for ty in ScalarType::ALL {
            if ty != ScalarType::Any {
                by_type.insert((ty, None), Arc::new(ScalarHandler::new(ty)));
            }
        }
        TypeHandlerRegistry {
            by_type,
            named: HashMap::new(),
        }
    }

    /// Registers a handler for `ty`, optionally only for one database type.
    pub fn register(&mut self, ty: ScalarType, db_type: Option<&str>, handler: Arc<dyn TypeHandler>) {
        self.by_type
            .insert((ty, db_type.map(str::to_lowercase)), handler);
    }

    /// Registers a handler referenced by name from `handler=` attributes.
    pub fn register_named(&mut self, name: impl Into<String>, handler: Arc<dyn TypeHandler>) {
        self.named.insert(name.into(), handler);
    }

    pub fn handler(&self, ty: ScalarType, db_type: Option<&str>) -> Arc<dyn TypeHandler> {
        if ty == ScalarType::Any {
            return self.unknown();
        }
        if let Some(db_type) = db_type {
            if let Some(handler) = self.by_type.get(&(ty, Some(db_type.to_lowercase()))) {
                return handler.clone();
            }
        }
        match self.by_type.get(&(ty, None)) {
            Some(handler) => handler.clone(),
            None => self.unknown(),
        }
    }

    pub fn named(&self, name: &str) -> Result<Arc<dyn TypeHandler>, ResolutionError> {
        self.named
            .get(name)
            .cloned()
            .ok_or_else(|| ResolutionError::UnknownHandler(name.to_string()))
    }

    /// Late-bound handler dispatching on the runtime type, using the default
    /// handlers registered so far.
    pub fn unknown(&self) -> Arc<dyn TypeHandler> {
        let defaults = self
            .by_type
            .iter()
            .filter(|((_, db_type), _)| db_type.is_none())
            .map(|((ty, _), handler)| (*ty, handler.clone()))
            .collect();
        Arc::new(UnknownTypeHandler::new(defaults))
    }

    pub fn for_property_type(
        &self,
        ty: Option<&PropertyType>,
        db_type: Option<&str>,
    ) -> Arc<dyn TypeHandler> {
        match ty {
            Some(PropertyType::Scalar(scalar)) => self.handler(*scalar, db_type),
            _ => self.unknown(),
        }
    }
}
