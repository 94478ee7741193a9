//! Built-in converters for the scalar types.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::DateTime;

use super::{ConversionError, TypeHandler};
use crate::types::ScalarType;
use crate::value::{parse_timestamp, Value};

fn target_name(ty: ScalarType) -> &'static str {
    match ty {
        ScalarType::Bool => "bool",
        ScalarType::Int => "int",
        ScalarType::Float => "float",
        ScalarType::Text => "text",
        ScalarType::Timestamp => "timestamp",
        ScalarType::Bytes => "bytes",
        ScalarType::Any => "any",
    }
}

fn incompatible(value: &Value, ty: ScalarType) -> ConversionError {
    ConversionError::Incompatible {
        value: value.to_string(),
        kind: value.kind_name(),
        target: target_name(ty),
    }
}

fn unparsable(text: &str, ty: ScalarType) -> ConversionError {
    ConversionError::Parse {
        text: text.to_string(),
        target: target_name(ty),
    }
}

/// Converts `value` into `ty`. Null stays null.
pub fn coerce(ty: ScalarType, value: Value) -> Result<Value, ConversionError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match (ty, value) {
        (ScalarType::Any, v) => Ok(v),

        (ScalarType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
        (ScalarType::Bool, Value::Int(i)) => Ok(Value::Bool(i != 0)),
        (ScalarType::Bool, Value::Text(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "y" | "yes" => Ok(Value::Bool(true)),
            "false" | "0" | "n" | "no" => Ok(Value::Bool(false)),
            _ => Err(unparsable(&s, ty)),
        },

        (ScalarType::Int, Value::Int(i)) => Ok(Value::Int(i)),
        (ScalarType::Int, Value::Bool(b)) => Ok(Value::Int(i64::from(b))),
        (ScalarType::Int, Value::Float(x))
            if x.fract() == 0.0 && x >= i64::MIN as f64 && x <= i64::MAX as f64 =>
        {
            Ok(Value::Int(x as i64))
        }
        (ScalarType::Int, Value::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| unparsable(&s, ty)),

        (ScalarType::Float, Value::Float(x)) => Ok(Value::Float(x)),
        (ScalarType::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
        (ScalarType::Float, Value::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| unparsable(&s, ty)),

        (ScalarType::Text, Value::Text(s)) => Ok(Value::Text(s)),
        (ScalarType::Text, Value::Bytes(b)) => String::from_utf8(b)
            .map(Value::Text)
            .map_err(|e| incompatible(&Value::Bytes(e.into_bytes()), ty)),
        (ScalarType::Text, v) if v.is_scalar() => Ok(Value::Text(v.to_string())),

        (ScalarType::Timestamp, Value::Timestamp(t)) => Ok(Value::Timestamp(t)),
        (ScalarType::Timestamp, Value::Text(s)) => parse_timestamp(&s)
            .map(Value::Timestamp)
            .ok_or_else(|| unparsable(&s, ty)),
        (ScalarType::Timestamp, Value::Int(secs)) => DateTime::from_timestamp(secs, 0)
            .map(|d| Value::Timestamp(d.naive_utc()))
            .ok_or_else(|| incompatible(&Value::Int(secs), ty)),

        (ScalarType::Bytes, Value::Bytes(b)) => Ok(Value::Bytes(b)),
        (ScalarType::Bytes, Value::Text(s)) => Ok(Value::Bytes(s.into_bytes())),

        (ty, v) => Err(incompatible(&v, ty)),
    }
}

/// Handler for one scalar type.
#[derive(Debug, Clone)]
pub struct ScalarHandler {
    ty: ScalarType,
}

impl ScalarHandler {
    pub fn new(ty: ScalarType) -> Self {
        ScalarHandler { ty }
    }
}

impl TypeHandler for ScalarHandler {
    fn name(&self) -> &str {
        target_name(self.ty)
    }

    fn from_db(&self, raw: Value) -> Result<Value, ConversionError> {
        coerce(self.ty, raw)
    }

    fn to_db(&self, value: &Value) -> Result<Value, ConversionError> {
        coerce(self.ty, value.clone())
    }

    fn value_of(&self, text: &str) -> Result<Value, ConversionError> {
        match self.ty {
            ScalarType::Any => Ok(Value::Text(text.to_string())),
            ty => coerce(ty, Value::Text(text.to_string())),
        }
    }
}

/// Late-bound handler: picks the handler registered for the runtime type of
/// each value it sees.
#[derive(Debug, Clone)]
pub struct UnknownTypeHandler {
    by_type: HashMap<ScalarType, Arc<dyn TypeHandler>>,
}

impl UnknownTypeHandler {
    pub fn new(by_type: HashMap<ScalarType, Arc<dyn TypeHandler>>) -> Self {
        UnknownTypeHandler { by_type }
    }

    fn dispatch(&self, value: &Value) -> Option<&Arc<dyn TypeHandler>> {
        match ScalarType::of(value) {
            ScalarType::Any => None,
            ty => self.by_type.get(&ty),
        }
    }
}

impl TypeHandler for UnknownTypeHandler {
    fn name(&self) -> &str {
        "unknown"
    }

    fn from_db(&self, raw: Value) -> Result<Value, ConversionError> {
        match self.dispatch(&raw) {
            Some(handler) => handler.from_db(raw),
            None => Ok(raw),
        }
    }

    fn to_db(&self, value: &Value) -> Result<Value, ConversionError> {
        if let Some(handler) = self.dispatch(value) {
            return handler.to_db(value);
        }
        match value {
            Value::List(_) | Value::Map(_) | Value::Object(_) | Value::Lazy(_) => Err(
                ConversionError::Incompatible {
                    value: value.to_string(),
                    kind: value.kind_name(),
                    target: "a parameter value",
                },
            ),
            other => Ok(other.clone()),
        }
    }

    fn value_of(&self, text: &str) -> Result<Value, ConversionError> {
        Ok(Value::Text(text.to_string()))
    }

    fn is_simple(&self) -> bool {
        false
    }
}
