//! Parameter descriptors: how one value is read from the parameter object and
//! bound to the driver.

pub mod errors;
pub mod inline_parser;
pub mod parameter_map;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::driver::ParameterDirection;
use crate::type_handlers::{TypeHandler, TypeHandlerRegistry};
use crate::types::{PropertyAccessor, ResolutionError, TypeKind, TypeRegistry};
use crate::value::{PropertyError, Value};

pub use errors::InlineParameterError;
pub use inline_parser::{parse_inline_parameters, InlineParsed, PLACEHOLDER};
pub use parameter_map::{ParameterMap, ParameterMapDef};

/// Unresolved parameter description, as written in a parameter map or an
/// inline `#...#` token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterPropertyDef {
    pub property: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub db_type: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub null_value: Option<String>,
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub precision: Option<u8>,
    #[serde(default)]
    pub scale: Option<u8>,
}

impl ParameterPropertyDef {
    pub fn new(property: impl Into<String>) -> Self {
        ParameterPropertyDef {
            property: property.into(),
            ..Default::default()
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn db_type(mut self, db_type: impl Into<String>) -> Self {
        self.db_type = Some(db_type.into());
        self
    }

    pub fn direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = Some(direction.into());
        self
    }

    pub fn null_value(mut self, null_value: impl Into<String>) -> Self {
        self.null_value = Some(null_value.into());
        self
    }

    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }
}

/// Types and converters a definition is resolved against.
#[derive(Clone, Copy)]
pub struct Registries<'a> {
    pub types: &'a TypeRegistry,
    pub handlers: &'a TypeHandlerRegistry,
}

/// Resolved parameter descriptor. Identity is the property path.
#[derive(Clone)]
pub struct ParameterProperty {
    accessor: PropertyAccessor,
    column: Option<String>,
    type_name: Option<String>,
    db_type: Option<String>,
    direction: ParameterDirection,
    size: Option<u32>,
    precision: Option<u8>,
    scale: Option<u8>,
    null_value: Option<Value>,
    handler: Arc<dyn TypeHandler>,
}

impl ParameterProperty {
    /// Resolves `def` for parameter objects of kind `owner` (`None` when the
    /// statement declares no parameter class).
    pub fn resolve(
        def: &ParameterPropertyDef,
        owner: Option<&TypeKind>,
        registries: Registries<'_>,
    ) -> Result<Self, ResolutionError> {
        let property = def.property.trim();
        let accessor = match owner {
            // A simple parameter class binds the whole value; the name is a label.
            Some(TypeKind::Simple(_)) => registries.types.accessor(None, property)?,
            _ => registries.types.accessor(owner, property)?,
        };

        let direction = match &def.direction {
            Some(text) => ParameterDirection::parse(text)
                .ok_or_else(|| ResolutionError::UnknownDirection(text.clone()))?,
            None => ParameterDirection::Input,
        };

        let handler = if let Some(name) = &def.handler {
            registries.handlers.named(name)?
        } else if let Some(type_name) = &def.type_name {
            let kind = registries.types.resolve(type_name)?;
            registries.handlers.handler(kind.scalar(), def.db_type.as_deref())
        } else {
            match owner {
                Some(TypeKind::Simple(scalar)) => {
                    registries.handlers.handler(*scalar, def.db_type.as_deref())
                }
                Some(TypeKind::Class(_)) => registries
                    .handlers
                    .for_property_type(accessor.member_type(), def.db_type.as_deref()),
                _ => registries.handlers.unknown(),
            }
        };

        let null_value = match &def.null_value {
            Some(text) => Some(handler.value_of(text).map_err(|e| {
                ResolutionError::InvalidAttribute {
                    property: property.to_string(),
                    attribute: "nullValue",
                    value: format!("{} ({})", text, e),
                }
            })?),
            None => None,
        };

        Ok(ParameterProperty {
            accessor,
            column: def.column.clone(),
            type_name: def.type_name.clone(),
            db_type: def.db_type.clone(),
            direction,
            size: def.size,
            precision: def.precision,
            scale: def.scale,
            null_value,
            handler,
        })
    }

    pub fn property_name(&self) -> &str {
        self.accessor.name()
    }

    pub fn accessor(&self) -> &PropertyAccessor {
        &self.accessor
    }

    pub fn column_name(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn db_type(&self) -> Option<&str> {
        self.db_type.as_deref()
    }

    pub fn direction(&self) -> ParameterDirection {
        self.direction
    }

    pub fn size(&self) -> Option<u32> {
        self.size
    }

    pub fn precision(&self) -> Option<u8> {
        self.precision
    }

    pub fn scale(&self) -> Option<u8> {
        self.scale
    }

    pub fn null_value(&self) -> Option<&Value> {
        self.null_value.as_ref()
    }

    pub fn handler(&self) -> &Arc<dyn TypeHandler> {
        &self.handler
    }

    /// Reads this property from the parameter object. A scalar parameter
    /// object is bound as a whole.
    pub fn value_of(&self, parameter_object: &Value) -> Result<Value, PropertyError> {
        if parameter_object.is_scalar() && !parameter_object.is_null() {
            return Ok(parameter_object.clone());
        }
        self.accessor.get(parameter_object)
    }

    /// Value to bind: the property value with null-value substitution applied.
    pub fn bind_value(&self, parameter_object: &Value) -> Result<Value, PropertyError> {
        let value = self.value_of(parameter_object)?;
        if self.matches_null_value(&value) {
            return Ok(Value::Null);
        }
        Ok(value)
    }

    fn matches_null_value(&self, value: &Value) -> bool {
        match &self.null_value {
            Some(sentinel) if value == sentinel => true,
            Some(sentinel) => {
                value.is_scalar()
                    && !value.is_null()
                    && value.kind_name() != sentinel.kind_name()
                    && value.to_string() == sentinel.to_string()
            }
            None => false,
        }
    }
}

impl fmt::Debug for ParameterProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterProperty")
            .field("property", &self.property_name())
            .field("column", &self.column)
            .field("db_type", &self.db_type)
            .field("direction", &self.direction)
            .field("handler", &self.handler.name())
            .finish()
    }
}
