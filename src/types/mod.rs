//! Type aliases, class definitions and pre-resolved property accessors.
//!
//! Classes are described declaratively with [`ClassDef`]; instances are
//! [`ObjectRef`]s whose property set is the class's declared properties.
//! Property paths are resolved against class definitions once, at
//! configuration time, into [`PropertyAccessor`]s.

pub mod errors;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::{Index, ObjectRef, PropertyError, PropertyPath, Value};

pub use errors::{InstantiationError, ResolutionError};

/// Application-side scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Bool,
    Int,
    Float,
    Text,
    Timestamp,
    Bytes,
    /// Unknown until the runtime value is seen.
    Any,
}

impl ScalarType {
    pub const ALL: [ScalarType; 7] = [
        ScalarType::Bool,
        ScalarType::Int,
        ScalarType::Float,
        ScalarType::Text,
        ScalarType::Timestamp,
        ScalarType::Bytes,
        ScalarType::Any,
    ];

    pub fn of(value: &Value) -> ScalarType {
        match value {
            Value::Bool(_) => ScalarType::Bool,
            Value::Int(_) => ScalarType::Int,
            Value::Float(_) => ScalarType::Float,
            Value::Text(_) => ScalarType::Text,
            Value::Timestamp(_) => ScalarType::Timestamp,
            Value::Bytes(_) => ScalarType::Bytes,
            _ => ScalarType::Any,
        }
    }
}

/// Declared type of a class property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyType {
    Scalar(ScalarType),
    Class(String),
    List(Box<PropertyType>),
    Map,
}

impl PropertyType {
    pub fn list_of(element: PropertyType) -> Self {
        PropertyType::List(Box::new(element))
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, PropertyType::List(_))
    }
}

/// What a type alias or class name resolves to.
#[derive(Debug, Clone)]
pub enum TypeKind {
    Simple(ScalarType),
    Map,
    List,
    Class(Arc<ClassDef>),
}

impl TypeKind {
    pub fn name(&self) -> String {
        match self {
            TypeKind::Simple(t) => format!("{:?}", t).to_lowercase(),
            TypeKind::Map => "map".to_string(),
            TypeKind::List => "list".to_string(),
            TypeKind::Class(class) => class.name().to_string(),
        }
    }

    pub fn scalar(&self) -> ScalarType {
        match self {
            TypeKind::Simple(t) => *t,
            _ => ScalarType::Any,
        }
    }
}

/// Custom constructor: receives the class and the constructor arguments as
/// `(name, value)` pairs in declared order.
pub type ConstructorFn =
    dyn Fn(&ClassDef, &[(String, Value)]) -> Result<ObjectRef, String> + Send + Sync;

#[derive(Clone)]
pub struct ClassDef {
    name: String,
    properties: IndexMap<String, PropertyType>,
    constructor: Option<Arc<ConstructorFn>>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        ClassDef {
            name: name.into(),
            properties: IndexMap::new(),
            constructor: None,
        }
    }

    pub fn property(mut self, name: impl Into<String>, ty: PropertyType) -> Self {
        self.properties.insert(name.into(), ty);
        self
    }

    pub fn scalar(self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.property(name, PropertyType::Scalar(ty))
    }

    pub fn with_constructor(
        mut self,
        ctor: impl Fn(&ClassDef, &[(String, Value)]) -> Result<ObjectRef, String>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.constructor = Some(Arc::new(ctor));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property_type(&self, name: &str) -> Option<&PropertyType> {
        self.properties.get(name)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Case-insensitive lookup used by auto-mapping.
    pub fn find_property_ignore_case(&self, column: &str) -> Option<(&str, &PropertyType)> {
        self.properties
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(name, ty)| (name.as_str(), ty))
    }

    /// Fresh instance with every property null.
    pub fn blank(&self) -> ObjectRef {
        ObjectRef::new(self.name.clone(), self.properties.keys().cloned())
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("constructor", &self.constructor.is_some())
            .finish()
    }
}

lazy_static::lazy_static! {
    static ref BUILTIN_ALIASES: HashMap<&'static str, BuiltinKind> = {
        use BuiltinKind::*;
        let mut m = HashMap::new();
        for alias in ["bool", "boolean"] {
            m.insert(alias, Scalar(ScalarType::Bool));
        }
        for alias in ["int", "int16", "int32", "int64", "integer", "long", "short", "byte"] {
            m.insert(alias, Scalar(ScalarType::Int));
        }
        for alias in ["float", "double", "single", "decimal"] {
            m.insert(alias, Scalar(ScalarType::Float));
        }
        for alias in ["string", "text", "char", "varchar"] {
            m.insert(alias, Scalar(ScalarType::Text));
        }
        for alias in ["date", "datetime", "timestamp"] {
            m.insert(alias, Scalar(ScalarType::Timestamp));
        }
        for alias in ["binary", "bytes", "byte[]"] {
            m.insert(alias, Scalar(ScalarType::Bytes));
        }
        for alias in ["object", "any"] {
            m.insert(alias, Scalar(ScalarType::Any));
        }
        for alias in ["map", "hashmap", "hashtable", "dictionary"] {
            m.insert(alias, Map);
        }
        for alias in ["list", "array", "arraylist", "ilist"] {
            m.insert(alias, List);
        }
        m
    };
}

#[derive(Debug, Clone, Copy)]
enum BuiltinKind {
    Scalar(ScalarType),
    Map,
    List,
}

/// Class definitions and aliases owned by one configuration.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    classes: HashMap<String, Arc<ClassDef>>,
    aliases: HashMap<String, String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_class(&mut self, class: ClassDef) -> Result<(), ResolutionError> {
        if self.classes.contains_key(class.name()) {
            return Err(ResolutionError::DuplicateClass(class.name().to_string()));
        }
        self.classes.insert(class.name().to_string(), Arc::new(class));
        Ok(())
    }

    pub fn register_alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.aliases.insert(alias.into().to_lowercase(), target.into());
    }

    pub fn class(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.classes.get(name).cloned()
    }

    /// Resolves a class name, a user alias or a built-in alias
    /// (case-insensitive for aliases).
    pub fn resolve(&self, name: &str) -> Result<TypeKind, ResolutionError> {
        let name = name.trim();
        if let Some(class) = self.classes.get(name) {
            return Ok(TypeKind::Class(class.clone()));
        }
        let lower = name.to_lowercase();
        if let Some(target) = self.aliases.get(&lower) {
            if target != name {
                return self.resolve(target);
            }
        }
        match BUILTIN_ALIASES.get(lower.as_str()) {
            Some(BuiltinKind::Scalar(t)) => Ok(TypeKind::Simple(*t)),
            Some(BuiltinKind::Map) => Ok(TypeKind::Map),
            Some(BuiltinKind::List) => Ok(TypeKind::List),
            None => Err(ResolutionError::UnknownType(name.to_string())),
        }
    }

    /// Accessor for `path` on instances of `owner`. On a class owner every
    /// segment is checked against the declared properties.
    pub fn accessor(
        &self,
        owner: Option<&TypeKind>,
        path: &str,
    ) -> Result<PropertyAccessor, ResolutionError> {
        let path = PropertyPath::parse(path)?;
        let Some(TypeKind::Class(root)) = owner else {
            return Ok(PropertyAccessor::untyped(path));
        };

        let mut intermediates = vec![Some(root.clone())];
        let mut current: Option<Arc<ClassDef>> = Some(root.clone());
        let mut member_type = None;
        for (depth, segment) in path.segments().iter().enumerate() {
            let mut ty = match &current {
                Some(class) if !segment.name.is_empty() => Some(
                    class
                        .property_type(&segment.name)
                        .cloned()
                        .ok_or_else(|| ResolutionError::UnknownProperty {
                            class: class.name().to_string(),
                            property: segment.name.clone(),
                        })?,
                ),
                _ => None,
            };
            for _ in &segment.indexes {
                ty = match ty {
                    Some(PropertyType::List(element)) => Some(*element),
                    _ => None,
                };
            }
            current = match &ty {
                Some(PropertyType::Class(name)) => self.class(name),
                _ => None,
            };
            if depth + 1 < path.segments().len() {
                intermediates.push(current.clone());
            }
            member_type = ty;
        }
        Ok(PropertyAccessor {
            path,
            member_type,
            intermediates,
        })
    }

    /// Factory producing instances of `kind`, receiving `ctor_args` in order.
    pub fn instance_factory(
        &self,
        kind: &TypeKind,
        ctor_args: &[String],
    ) -> Result<InstanceFactory, ResolutionError> {
        let target = match kind {
            TypeKind::Class(class) => {
                if class.constructor.is_none() {
                    for arg in ctor_args {
                        if class.property_type(arg).is_none() {
                            return Err(ResolutionError::UnknownProperty {
                                class: class.name().to_string(),
                                property: arg.clone(),
                            });
                        }
                    }
                }
                FactoryTarget::Class(class.clone())
            }
            TypeKind::Map => FactoryTarget::Open("map".to_string()),
            other => return Err(ResolutionError::NotInstantiable(other.name())),
        };
        Ok(InstanceFactory {
            target,
            arg_names: ctor_args.to_vec(),
        })
    }
}

/// Pre-resolved access to one property path.
#[derive(Debug, Clone)]
pub struct PropertyAccessor {
    path: PropertyPath,
    member_type: Option<PropertyType>,
    /// Class owning each segment, when known; used to materialize null
    /// intermediates on write.
    intermediates: Vec<Option<Arc<ClassDef>>>,
}

impl PropertyAccessor {
    pub fn untyped(path: PropertyPath) -> Self {
        PropertyAccessor {
            path,
            member_type: None,
            intermediates: Vec::new(),
        }
    }

    pub fn path(&self) -> &PropertyPath {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path.as_str()
    }

    pub fn member_type(&self) -> Option<&PropertyType> {
        self.member_type.as_ref()
    }

    pub fn is_collection(&self) -> bool {
        self.member_type
            .as_ref()
            .is_some_and(PropertyType::is_collection)
    }

    /// Element type of a collection member.
    pub fn element_type(&self) -> Option<&PropertyType> {
        match &self.member_type {
            Some(PropertyType::List(element)) => Some(element),
            _ => None,
        }
    }

    pub fn get(&self, target: &Value) -> Result<Value, PropertyError> {
        self.path.get(target)
    }

    pub fn set(&self, target: &mut Value, value: Value) -> Result<(), PropertyError> {
        self.modify(target, |slot| *slot = value)
    }

    pub fn modify<R>(
        &self,
        target: &mut Value,
        f: impl FnOnce(&mut Value) -> R,
    ) -> Result<R, PropertyError> {
        let create = |depth: usize| match self.intermediates.get(depth) {
            Some(Some(class)) => Value::Object(class.blank()),
            _ => Value::Object(ObjectRef::open("map")),
        };
        self.path.modify(target, &create, f)
    }

    /// Sets on a shared object handle.
    pub fn set_on(&self, object: &ObjectRef, value: Value) -> Result<(), PropertyError> {
        let mut target = Value::Object(object.clone());
        self.set(&mut target, value)
    }

    /// Whether any segment still carries a `[]` placeholder.
    pub fn is_indexed(&self) -> bool {
        self.path
            .segments()
            .iter()
            .any(|s| s.indexes.iter().any(|i| matches!(i, Index::Pending)))
    }
}

#[derive(Clone)]
enum FactoryTarget {
    Class(Arc<ClassDef>),
    Open(String),
}

/// Builds result objects. Constructor arguments are consumed positionally,
/// before any setter-based property is applied by the caller.
#[derive(Clone)]
pub struct InstanceFactory {
    target: FactoryTarget,
    arg_names: Vec<String>,
}

impl InstanceFactory {
    pub fn type_name(&self) -> &str {
        match &self.target {
            FactoryTarget::Class(class) => class.name(),
            FactoryTarget::Open(name) => name,
        }
    }

    pub fn arg_names(&self) -> &[String] {
        &self.arg_names
    }

    pub fn new_instance(&self, args: Vec<Value>) -> Result<ObjectRef, InstantiationError> {
        let fail = |message: String| InstantiationError {
            class: self.type_name().to_string(),
            message,
        };
        if args.len() != self.arg_names.len() {
            return Err(fail(format!(
                "expected {} constructor arguments, got {}",
                self.arg_names.len(),
                args.len()
            )));
        }
        let pairs: Vec<(String, Value)> = self.arg_names.iter().cloned().zip(args).collect();
        let object = match &self.target {
            FactoryTarget::Class(class) => match &class.constructor {
                Some(ctor) => return ctor(class, &pairs).map_err(fail),
                None => class.blank(),
            },
            FactoryTarget::Open(name) => ObjectRef::open(name.clone()),
        };
        for (name, value) in pairs {
            object
                .set(&name, value)
                .map_err(|e| fail(e.to_string()))?;
        }
        Ok(object)
    }
}

impl fmt::Debug for InstanceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceFactory")
            .field("type_name", &self.type_name())
            .field("arg_names", &self.arg_names)
            .finish()
    }
}
