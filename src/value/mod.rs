//! Dynamic value model shared by parameter objects, driver rows and
//! materialized results.
//!
//! Parameter objects are usually built from `serde_json::Value` (see the
//! `From` impl below). Materialized objects are [`ObjectRef`]s: shared,
//! interior-mutable records, so that a group-by pass can keep appending into a
//! collection of an object that was already handed out in the result list.
//! Lazy sub-selects install a [`LazyValue`] stand-in that loads on first read.

pub mod errors;
pub mod path;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use errors::{LazyLoadError, PropertyError};
pub use path::{Index, PropertyPath, Segment};

/// A dynamically typed value.
#[derive(Clone, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Object(ObjectRef),
    /// Deferred sub-select; cannot be serialized.
    #[serde(skip_deserializing, serialize_with = "serialize_lazy")]
    Lazy(LazyValue),
}

pub(crate) static NULL: Value = Value::Null;

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Lazy(_) => "lazy",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for values that carry no properties (anything but collections,
    /// objects and lazy stand-ins).
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            Value::List(_) | Value::Map(_) | Value::Object(_) | Value::Lazy(_)
        )
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Loads a lazy stand-in; any other value is returned unchanged.
    pub fn resolved(self) -> Result<Value, LazyLoadError> {
        match self {
            Value::Lazy(lazy) => lazy.resolve(),
            other => Ok(other),
        }
    }

    /// Number of elements of a list or map, `None` for anything else.
    pub fn collection_len(&self) -> Option<usize> {
        match self {
            Value::List(items) => Some(items.len()),
            Value::Map(map) => Some(map.len()),
            _ => None,
        }
    }
}

fn serialize_lazy<S: Serializer>(lazy: &LazyValue, _serializer: S) -> Result<S::Ok, S::Error> {
    Err(serde::ser::Error::custom(format!(
        "lazy value for '{}' cannot be serialized",
        lazy.statement()
    )))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Lazy(a), Value::Lazy(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Text(s) => write!(f, "Text({:?})", s),
            Value::Timestamp(t) => write!(f, "Timestamp({})", t),
            Value::Bytes(b) => write!(f, "Bytes({:?})", b),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Object(obj) => obj.fmt(f),
            Value::Lazy(lazy) => lazy.fmt(f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(t) => write!(f, "{}", t),
            Value::Bytes(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Object(obj) => {
                let data = obj.read();
                write!(f, "{}{{", data.type_name)?;
                for (i, (k, v)) in data.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Lazy(lazy) => write!(f, "<lazy {}>", lazy.statement()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(t: NaiveDateTime) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Parses the timestamp layouts drivers and literals commonly use.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for layout in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, layout) {
            return Some(ts);
        }
    }
    chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Backing record of an [`ObjectRef`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataObject {
    pub type_name: String,
    pub fields: IndexMap<String, Value>,
    /// Open objects accept any property name (map semantics).
    pub open: bool,
}

/// Shared handle to a materialized object.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<DataObject>>);

impl ObjectRef {
    /// Object with a fixed property set, every property initialised to null.
    pub fn new<I, S>(type_name: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = properties
            .into_iter()
            .map(|p| (p.into(), Value::Null))
            .collect();
        Self::from_data(DataObject {
            type_name: type_name.into(),
            fields,
            open: false,
        })
    }

    pub fn open(type_name: impl Into<String>) -> Self {
        Self::from_data(DataObject {
            type_name: type_name.into(),
            fields: IndexMap::new(),
            open: true,
        })
    }

    pub fn from_data(data: DataObject) -> Self {
        ObjectRef(Arc::new(RwLock::new(data)))
    }

    fn read(&self) -> RwLockReadGuard<'_, DataObject> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DataObject> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn type_name(&self) -> String {
        self.read().type_name.clone()
    }

    pub fn is_open(&self) -> bool {
        self.read().open
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.read().fields.contains_key(name)
    }

    pub fn property_names(&self) -> Vec<String> {
        self.read().fields.keys().cloned().collect()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Copy of the current field values (lazy stand-ins are not loaded).
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.read().fields.clone()
    }

    /// Reads a property without loading lazy stand-ins.
    pub fn get_raw(&self, name: &str) -> Result<Value, PropertyError> {
        let data = self.read();
        match data.fields.get(name) {
            Some(v) => Ok(v.clone()),
            None if data.open => Ok(Value::Null),
            None => Err(PropertyError::NoSuchProperty {
                type_name: data.type_name.clone(),
                property: name.to_string(),
            }),
        }
    }

    /// Reads a property, loading (and caching in place) a lazy stand-in.
    pub fn get(&self, name: &str) -> Result<Value, PropertyError> {
        match self.get_raw(name)? {
            Value::Lazy(lazy) => {
                // Load outside the lock: the loader runs a whole statement.
                let loaded = lazy.resolve()?;
                let mut data = self.write();
                if let Some(slot) = data.fields.get_mut(name) {
                    if matches!(slot, Value::Lazy(current) if current.ptr_eq(&lazy)) {
                        *slot = loaded.clone();
                    }
                }
                Ok(loaded)
            }
            other => Ok(other),
        }
    }

    pub fn set(&self, name: &str, value: Value) -> Result<(), PropertyError> {
        self.modify(name, |slot| *slot = value)
    }

    /// Runs `f` against the property slot under the write lock.
    pub fn modify<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Value) -> R,
    ) -> Result<R, PropertyError> {
        let mut data = self.write();
        if !data.open && !data.fields.contains_key(name) {
            return Err(PropertyError::NoSuchProperty {
                type_name: data.type_name.clone(),
                property: name.to_string(),
            });
        }
        let slot = data
            .fields
            .entry(name.to_string())
            .or_insert(Value::Null);
        Ok(f(slot))
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let (a, b) = (self.read(), other.read());
        a.type_name == b.type_name && a.fields == b.fields
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.read();
        write!(f, "{} ", data.type_name)?;
        f.debug_map().entries(data.fields.iter()).finish()
    }
}

impl Serialize for ObjectRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ObjectRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        DataObject::deserialize(deserializer).map(ObjectRef::from_data)
    }
}

type Loader = dyn Fn() -> Result<Value, LazyLoadError> + Send + Sync;

struct LazyInner {
    statement: String,
    loader: Box<Loader>,
    loaded: OnceLock<Value>,
    load_lock: Mutex<()>,
}

/// Stand-in for a property whose value comes from a sub-select run on first
/// access. Failed loads are not cached; the next access retries.
#[derive(Clone)]
pub struct LazyValue(Arc<LazyInner>);

impl LazyValue {
    pub fn new(
        statement: impl Into<String>,
        loader: impl Fn() -> Result<Value, LazyLoadError> + Send + Sync + 'static,
    ) -> Self {
        LazyValue(Arc::new(LazyInner {
            statement: statement.into(),
            loader: Box::new(loader),
            loaded: OnceLock::new(),
            load_lock: Mutex::new(()),
        }))
    }

    pub fn statement(&self) -> &str {
        &self.0.statement
    }

    pub fn is_loaded(&self) -> bool {
        self.0.loaded.get().is_some()
    }

    pub fn resolve(&self) -> Result<Value, LazyLoadError> {
        if let Some(value) = self.0.loaded.get() {
            return Ok(value.clone());
        }
        let _guard = self
            .0
            .load_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = self.0.loaded.get() {
            return Ok(value.clone());
        }
        log::debug!("lazy load of '{}'", self.0.statement);
        let value = (self.0.loader)()?;
        let _ = self.0.loaded.set(value.clone());
        Ok(value)
    }

    pub fn ptr_eq(&self, other: &LazyValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("statement", &self.0.statement)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
