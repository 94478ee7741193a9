//! Row-to-object strategies.
//!
//! Each row is turned into a value according to the statement's result
//! target. Declared result maps go through the discriminator first, then
//! constructor arguments, instantiation and the per-property strategies.
//! Rows whose group key is already known only contribute to the collection
//! properties of the existing object.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use super::auto_map::AutoResultMap;
use super::errors::MaterializationError;
use super::group_by::GroupKey;
use super::request_scope::RequestScope;
use super::result_map::{DiscriminatorError, ResultMap};
use super::result_property::{PropertyStrategy, ResultProperty};
use super::sub_select::{self, StatementExecutor};
use crate::driver::RowCursor;
use crate::parameters::Registries;
use crate::type_handlers::TypeHandler;
use crate::types::{ScalarType, TypeKind};
use crate::value::{ObjectRef, PropertyError, Value};

/// How rows of one result set become values.
pub enum ResultTarget<'a> {
    /// No result class: the single column's value, or a list of all values.
    Untyped,
    /// First column converted to a scalar type.
    Simple(ScalarType),
    /// Column name to value.
    Map,
    /// One element per column.
    List,
    /// Class without a result map, mapped by column names.
    Auto(&'a AutoResultMap),
    ResultMap(Arc<ResultMap>),
}

impl<'a> ResultTarget<'a> {
    /// Target for a statement's result class. `auto` is used for classes.
    pub fn for_class(class: Option<&TypeKind>, auto: Option<&'a AutoResultMap>) -> Self {
        match (class, auto) {
            (None, _) => ResultTarget::Untyped,
            (Some(TypeKind::Simple(ty)), _) => ResultTarget::Simple(*ty),
            (Some(TypeKind::Map), _) => ResultTarget::Map,
            (Some(TypeKind::List), _) => ResultTarget::List,
            (Some(TypeKind::Class(_)), Some(auto)) => ResultTarget::Auto(auto),
            (Some(TypeKind::Class(_)), None) => ResultTarget::Untyped,
        }
    }
}

/// What the materializer needs from the mapper for one execution.
pub struct MaterializeContext<'a> {
    pub statement: &'a str,
    pub result_maps: &'a HashMap<String, Arc<ResultMap>>,
    pub registries: Registries<'a>,
    pub executor: Option<Weak<dyn StatementExecutor>>,
    pub lazy_loading: bool,
    pub max_sub_select_depth: usize,
}

pub struct Materializer<'a> {
    ctx: MaterializeContext<'a>,
    unknown: Arc<dyn TypeHandler>,
}

impl<'a> Materializer<'a> {
    pub fn new(ctx: MaterializeContext<'a>) -> Self {
        let unknown = ctx.registries.handlers.unknown();
        Materializer { ctx, unknown }
    }

    /// Value for the current row, or `None` when the row was merged into an
    /// object created by an earlier row. `existing` is filled instead of a
    /// new instance when given.
    pub fn materialize(
        &self,
        target: &ResultTarget<'_>,
        row: &dyn RowCursor,
        scope: &mut RequestScope,
        existing: Option<&Value>,
    ) -> Result<Option<Value>, MaterializationError> {
        log::trace!("Materializing row {} of '{}'", scope.row(), self.ctx.statement);
        let value = match target {
            ResultTarget::Untyped => {
                if row.column_count() == 1 {
                    self.raw(row, 0, scope)?
                } else {
                    Value::List(self.all_columns(row, scope)?)
                }
            }
            ResultTarget::Simple(ty) => {
                let handler = self.ctx.registries.handlers.handler(*ty, None);
                self.convert(handler.as_ref(), row, 0, "value", scope)?
            }
            ResultTarget::Map => self.map_columns(row, scope, existing)?,
            ResultTarget::List => Value::List(self.all_columns(row, scope)?),
            ResultTarget::Auto(auto) => self.auto_map(auto, row, scope, existing)?,
            ResultTarget::ResultMap(map) => return self.map_row(map, row, scope, existing),
        };
        Ok(Some(value))
    }

    /// Runs the sub-selects deferred while reading the rows.
    pub fn finish(&self, scope: &mut RequestScope) -> Result<(), MaterializationError> {
        sub_select::run_deferred(
            scope,
            self.ctx.executor.as_ref(),
            self.ctx.max_sub_select_depth,
        )
    }

    fn raw(&self, row: &dyn RowCursor, index: usize, scope: &RequestScope) -> Result<Value, MaterializationError> {
        let column = row.column_name(index).unwrap_or_default().to_string();
        self.convert(self.unknown.as_ref(), row, index, &column, scope)
    }

    fn all_columns(&self, row: &dyn RowCursor, scope: &RequestScope) -> Result<Vec<Value>, MaterializationError> {
        (0..row.column_count())
            .map(|i| self.raw(row, i, scope))
            .collect()
    }

    fn convert(
        &self,
        handler: &dyn TypeHandler,
        row: &dyn RowCursor,
        index: usize,
        property: &str,
        scope: &RequestScope,
    ) -> Result<Value, MaterializationError> {
        handler
            .get_value(row, index)
            .map_err(|source| MaterializationError::Conversion {
                statement: scope.statement().to_string(),
                property: property.to_string(),
                column: row
                    .column_name(index)
                    .map_or_else(|| format!("#{}", index), str::to_string),
                row: scope.row(),
                source,
            })
    }

    fn map_columns(
        &self,
        row: &dyn RowCursor,
        scope: &RequestScope,
        existing: Option<&Value>,
    ) -> Result<Value, MaterializationError> {
        if let Some(Value::Object(object)) = existing {
            for i in 0..row.column_count() {
                let name = row.column_name(i).unwrap_or_default().to_string();
                let value = self.raw(row, i, scope)?;
                object
                    .set(&name, value)
                    .map_err(|source| self.property_error(&name, source, scope))?;
            }
            return Ok(Value::Object(object.clone()));
        }
        let mut map = IndexMap::with_capacity(row.column_count());
        for i in 0..row.column_count() {
            let name = row.column_name(i).unwrap_or_default().to_string();
            map.insert(name, self.raw(row, i, scope)?);
        }
        Ok(Value::Map(map))
    }

    fn auto_map(
        &self,
        auto: &AutoResultMap,
        row: &dyn RowCursor,
        scope: &RequestScope,
        existing: Option<&Value>,
    ) -> Result<Value, MaterializationError> {
        let resolution = |source| MaterializationError::Resolution {
            statement: scope.statement().to_string(),
            source,
        };
        let mappings = auto.mappings(row, self.ctx.registries).map_err(resolution)?;
        let object = match existing {
            Some(Value::Object(object)) => object.clone(),
            _ => self
                .ctx
                .registries
                .types
                .instance_factory(auto.class(), &[])
                .map_err(resolution)?
                .new_instance(Vec::new())
                .map_err(|source| MaterializationError::Instantiation {
                    statement: scope.statement().to_string(),
                    row: scope.row(),
                    source,
                })?,
        };
        for mapping in mappings.iter() {
            let value = self.convert(
                mapping.handler.as_ref(),
                row,
                mapping.column,
                mapping.accessor.name(),
                scope,
            )?;
            mapping
                .accessor
                .set_on(&object, value)
                .map_err(|source| self.property_error(mapping.accessor.name(), source, scope))?;
        }
        Ok(Value::Object(object))
    }

    fn map_row(
        &self,
        map: &Arc<ResultMap>,
        row: &dyn RowCursor,
        scope: &mut RequestScope,
        existing: Option<&Value>,
    ) -> Result<Option<Value>, MaterializationError> {
        let map = self.discriminate(map.clone(), row, scope)?;
        let key = if map.has_group_by() {
            let key = self.group_key(&map, row, scope, "")?;
            if let Some(object) = scope.group(map.id(), &key) {
                log::trace!("Row {} merged into group {}", scope.row(), key.as_str());
                self.apply_collections(&map, &object, row, scope, key.as_str())?;
                return Ok(None);
            }
            Some(key)
        } else {
            None
        };

        let existing = match existing {
            Some(Value::Object(object)) => Some(object.clone()),
            _ => None,
        };
        let scope_key = key.as_ref().map_or("", GroupKey::as_str).to_string();
        let object = self
            .build_object(&map, row, scope, existing, &scope_key, false)?
            .map_or(Value::Null, Value::Object);
        if let (Some(key), Value::Object(object)) = (key, &object) {
            scope.register_group(map.id(), key, object.clone());
        }
        Ok(Some(object))
    }

    /// Builds one object of `map` from the row. Nested objects (`nested`)
    /// with no non-null column, or whose constructor arguments are all null,
    /// come back as `None`.
    fn build_object(
        &self,
        map: &Arc<ResultMap>,
        row: &dyn RowCursor,
        scope: &mut RequestScope,
        existing: Option<ObjectRef>,
        scope_key: &str,
        nested: bool,
    ) -> Result<Option<ObjectRef>, MaterializationError> {
        let mut found = false;
        let mut args = Vec::with_capacity(map.arguments().len());
        for arg in map.arguments() {
            let value = match arg.strategy() {
                PropertyStrategy::NestedMap => self.nested_object(arg, row, scope, scope_key)?,
                _ => self.read_column(arg, row, scope)?,
            };
            found |= !value.is_null();
            args.push(value);
        }
        if nested && !map.arguments().is_empty() && !found {
            return Ok(None);
        }

        let object = match existing {
            Some(object) => object,
            None => map.factory().new_instance(args).map_err(|source| {
                MaterializationError::Instantiation {
                    statement: scope.statement().to_string(),
                    row: scope.row(),
                    source,
                }
            })?,
        };

        for property in map.properties() {
            match property.strategy() {
                PropertyStrategy::Plain => {
                    let value = self.read_column(property, row, scope)?;
                    found |= !value.is_null();
                    self.set(property, &object, value, scope)?;
                }
                PropertyStrategy::NestedMap => {
                    let value = self.nested_object(property, row, scope, scope_key)?;
                    found |= !value.is_null();
                    self.set(property, &object, value, scope)?;
                }
                PropertyStrategy::GroupBy => {
                    found |= self.append_element(property, &object, row, scope, scope_key)?;
                }
                PropertyStrategy::SubSelect => {
                    let key = sub_select::key_value(property, row, scope)?;
                    found |= !key.is_null();
                    sub_select::install(
                        property,
                        &object,
                        key,
                        self.ctx.lazy_loading,
                        self.ctx.executor.as_ref(),
                        scope,
                    )?;
                }
            }
        }

        if found {
            scope.mark_row_data();
        }
        if nested && !found {
            return Ok(None);
        }
        Ok(Some(object))
    }

    /// Object for a nested-map property, reusing a grouped instance when the
    /// nested map has group-by properties.
    fn nested_object(
        &self,
        property: &ResultProperty,
        row: &dyn RowCursor,
        scope: &mut RequestScope,
        parent_key: &str,
    ) -> Result<Value, MaterializationError> {
        let map = self.nested_map(property, row, scope)?;
        if !map.has_group_by() {
            return Ok(self
                .build_object(&map, row, scope, None, parent_key, true)?
                .map_or(Value::Null, Value::Object));
        }
        let key = self.group_key(&map, row, scope, parent_key)?;
        if let Some(object) = scope.group(map.id(), &key) {
            self.apply_collections(&map, &object, row, scope, key.as_str())?;
            return Ok(Value::Object(object));
        }
        match self.build_object(&map, row, scope, None, key.as_str(), true)? {
            Some(object) => {
                scope.register_group(map.id(), key, object.clone());
                Ok(Value::Object(object))
            }
            None => Ok(Value::Null),
        }
    }

    /// Adds the row's element to a collection property. Returns whether a
    /// new element was appended.
    fn append_element(
        &self,
        property: &ResultProperty,
        parent: &ObjectRef,
        row: &dyn RowCursor,
        scope: &mut RequestScope,
        parent_key: &str,
    ) -> Result<bool, MaterializationError> {
        self.push_element(property, parent, None, scope)?;
        let map = self.nested_map(property, row, scope)?;
        let element = if map.has_group_by() {
            let key = self.group_key(&map, row, scope, parent_key)?;
            if let Some(known) = scope.group(map.id(), &key) {
                self.apply_collections(&map, &known, row, scope, key.as_str())?;
                return Ok(false);
            }
            match self.build_object(&map, row, scope, None, key.as_str(), true)? {
                Some(object) => {
                    scope.register_group(map.id(), key, object.clone());
                    object
                }
                None => return Ok(false),
            }
        } else {
            match self.build_object(&map, row, scope, None, parent_key, true)? {
                Some(object) => object,
                None => return Ok(false),
            }
        };
        self.push_element(property, parent, Some(Value::Object(element)), scope)?;
        Ok(true)
    }

    /// Appends `element` to the collection, creating an empty list first.
    fn push_element(
        &self,
        property: &ResultProperty,
        parent: &ObjectRef,
        element: Option<Value>,
        scope: &RequestScope,
    ) -> Result<(), MaterializationError> {
        let mut target = Value::Object(parent.clone());
        let outcome = property.accessor().modify(&mut target, |slot| {
            if slot.is_null() {
                *slot = Value::List(Vec::new());
            }
            match slot {
                Value::List(items) => {
                    items.extend(element);
                    Ok(())
                }
                other => Err(other.kind_name()),
            }
        });
        let name = property.property_name();
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(kind)) => Err(self.property_error(
                name,
                PropertyError::NotAList {
                    property: name.to_string(),
                    kind,
                },
                scope,
            )),
            Err(source) => Err(self.property_error(name, source, scope)),
        }
    }

    fn apply_collections(
        &self,
        map: &Arc<ResultMap>,
        object: &ObjectRef,
        row: &dyn RowCursor,
        scope: &mut RequestScope,
        key: &str,
    ) -> Result<(), MaterializationError> {
        for property in map.collection_properties() {
            self.append_element(property, object, row, scope, key)?;
        }
        Ok(())
    }

    fn nested_map(
        &self,
        property: &ResultProperty,
        row: &dyn RowCursor,
        scope: &RequestScope,
    ) -> Result<Arc<ResultMap>, MaterializationError> {
        let id = property.nested_map().unwrap_or_default();
        let map = self.lookup(id, scope)?;
        self.discriminate(map, row, scope)
    }

    fn lookup(&self, id: &str, scope: &RequestScope) -> Result<Arc<ResultMap>, MaterializationError> {
        self.ctx
            .result_maps
            .get(id)
            .cloned()
            .ok_or_else(|| MaterializationError::UnknownResultMap {
                statement: scope.statement().to_string(),
                result_map: id.to_string(),
            })
    }

    /// Follows discriminator cases until a map without a matching case.
    fn discriminate(
        &self,
        map: Arc<ResultMap>,
        row: &dyn RowCursor,
        scope: &RequestScope,
    ) -> Result<Arc<ResultMap>, MaterializationError> {
        let mut current = map;
        for _ in 0..=self.ctx.result_maps.len() {
            let Some(discriminator) = current.discriminator() else {
                break;
            };
            let value = discriminator
                .value(row)
                .map_err(|e| self.discriminator_error(current.id(), e, scope))?;
            let Some(sub) = value.as_deref().and_then(|v| discriminator.sub_map(v)) else {
                break;
            };
            if sub == current.id() {
                break;
            }
            let next = self.lookup(sub, scope)?;
            log::trace!("Row {}: '{}' -> '{}'", scope.row(), current.id(), next.id());
            current = next;
        }
        Ok(current)
    }

    fn discriminator_error(
        &self,
        map: &str,
        err: DiscriminatorError,
        scope: &RequestScope,
    ) -> MaterializationError {
        let property = format!("{}.discriminator", map);
        match err {
            DiscriminatorError::MissingColumn(column) => MaterializationError::MissingColumn {
                statement: scope.statement().to_string(),
                property,
                column,
                row: scope.row(),
            },
            DiscriminatorError::Conversion(column, source) => MaterializationError::Conversion {
                statement: scope.statement().to_string(),
                property,
                column,
                row: scope.row(),
                source,
            },
            DiscriminatorError::Driver(source) => MaterializationError::Driver {
                statement: scope.statement().to_string(),
                row: scope.row(),
                source,
            },
        }
    }

    fn group_key(
        &self,
        map: &ResultMap,
        row: &dyn RowCursor,
        scope: &RequestScope,
        parent: &str,
    ) -> Result<GroupKey, MaterializationError> {
        let mut values = Vec::new();
        for property in map.group_by_properties() {
            values.push(match property.strategy() {
                PropertyStrategy::Plain => self.read_column(property, row, scope)?,
                _ => Value::Null,
            });
        }
        Ok(GroupKey::from_parts(parent, map.id(), &values))
    }

    fn read_column(
        &self,
        property: &ResultProperty,
        row: &dyn RowCursor,
        scope: &RequestScope,
    ) -> Result<Value, MaterializationError> {
        let Some(column) = property.column() else {
            return Ok(Value::Null);
        };
        let index = column
            .locate(row)
            .ok_or_else(|| MaterializationError::MissingColumn {
                statement: scope.statement().to_string(),
                property: property.property_name().to_string(),
                column: column.label(),
                row: scope.row(),
            })?;
        let value = property
            .handler()
            .get_value(row, index)
            .map_err(|source| MaterializationError::Conversion {
                statement: scope.statement().to_string(),
                property: property.property_name().to_string(),
                column: column.label(),
                row: scope.row(),
                source,
            })?;
        match (value, property.null_value()) {
            (Value::Null, Some(substitute)) => Ok(substitute.clone()),
            (value, _) => Ok(value),
        }
    }

    fn set(
        &self,
        property: &ResultProperty,
        object: &ObjectRef,
        value: Value,
        scope: &RequestScope,
    ) -> Result<(), MaterializationError> {
        property
            .accessor()
            .set_on(object, value)
            .map_err(|source| self.property_error(property.property_name(), source, scope))
    }

    fn property_error(&self, property: &str, source: PropertyError, scope: &RequestScope) -> MaterializationError {
        MaterializationError::Property {
            statement: scope.statement().to_string(),
            property: property.to_string(),
            row: scope.row(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::{MemoryDataSource, Response, ResultSet};
    use crate::driver::{CommandKind, DataSource};
    use crate::results::result_map::{DiscriminatorDef, ResultMapDef};
    use crate::results::result_property::ResultPropertyDef;
    use crate::type_handlers::TypeHandlerRegistry;
    use crate::types::{ClassDef, PropertyType, TypeRegistry};
    use serde_json::json;

    fn types() -> TypeRegistry {
        let mut types = TypeRegistry::new();
        types
            .register_class(
                ClassDef::new("Order")
                    .scalar("id", ScalarType::Int)
                    .property("lines", PropertyType::list_of(PropertyType::Class("Line".into()))),
            )
            .unwrap();
        types
            .register_class(
                ClassDef::new("Line")
                    .scalar("sku", ScalarType::Text)
                    .scalar("qty", ScalarType::Int),
            )
            .unwrap();
        types
    }

    fn compile(defs: Vec<ResultMapDef>, registries: Registries<'_>) -> HashMap<String, Arc<ResultMap>> {
        defs.iter()
            .map(|d| (d.id.clone(), Arc::new(ResultMap::build(d, registries).unwrap())))
            .collect()
    }

    /// Materializes every row of `set` with `target`.
    fn run(
        set: ResultSet,
        target: &ResultTarget<'_>,
        maps: &HashMap<String, Arc<ResultMap>>,
        registries: Registries<'_>,
    ) -> Result<Vec<Value>, MaterializationError> {
        let source = MemoryDataSource::new("db");
        source.on("select", Response::rows(set));
        let mut command = source.create_command(CommandKind::Text).unwrap();
        command.set_text("select 1");
        let mut cursor = command.execute_query().unwrap();

        let materializer = Materializer::new(MaterializeContext {
            statement: "test",
            result_maps: maps,
            registries,
            executor: None,
            lazy_loading: false,
            max_sub_select_depth: 4,
        });
        let mut scope = RequestScope::new("test", 0);
        let mut out = Vec::new();
        while cursor.read().unwrap() {
            scope.next_row();
            if let Some(value) = materializer.materialize(target, cursor.as_ref(), &mut scope, None)? {
                out.push(value);
            }
        }
        materializer.finish(&mut scope)?;
        Ok(out)
    }

    #[test]
    fn test_group_by_collapses_rows() {
        let types = types();
        let handlers = TypeHandlerRegistry::new();
        let registries = Registries {
            types: &types,
            handlers: &handlers,
        };
        let maps = compile(
            vec![
                ResultMapDef::new("order", "Order")
                    .group_by("id")
                    .result(ResultPropertyDef::new("id").column("ID"))
                    .result(ResultPropertyDef::new("lines").result_map("line")),
                ResultMapDef::new("line", "Line")
                    .result(ResultPropertyDef::new("sku").column("SKU"))
                    .result(ResultPropertyDef::new("qty").column("QTY")),
            ],
            registries,
        );
        let set = ResultSet::new(&["ID", "SKU", "QTY"])
            .with_json_rows(json!([[1, "a", 2], [1, "b", 3], [2, null, null]]));
        let target = ResultTarget::ResultMap(maps["order"].clone());
        let orders = run(set, &target, &maps, registries).unwrap();

        assert_eq!(orders.len(), 2);
        let first = orders[0].as_object().unwrap();
        let lines = first.get("lines").unwrap();
        let lines = lines.as_list().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].as_object().unwrap().get("sku").unwrap(), Value::from("b"));
        let second = orders[1].as_object().unwrap();
        assert_eq!(second.get("lines").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_discriminator_selects_sub_map() {
        let types = TypeRegistry::new();
        let handlers = TypeHandlerRegistry::new();
        let registries = Registries {
            types: &types,
            handlers: &handlers,
        };
        let maps = compile(
            vec![
                ResultMapDef::new("vehicle", "map")
                    .result(ResultPropertyDef::new("kind").column("KIND"))
                    .discriminator(DiscriminatorDef::column("KIND").case("car", "car")),
                ResultMapDef::new("car", "map")
                    .result(ResultPropertyDef::new("kind").column("KIND"))
                    .result(ResultPropertyDef::new("doors").column("DOORS")),
            ],
            registries,
        );
        let set = ResultSet::new(&["KIND", "DOORS"]).with_json_rows(json!([["car", 4], ["bike", null]]));
        let target = ResultTarget::ResultMap(maps["vehicle"].clone());
        let rows = run(set, &target, &maps, registries).unwrap();

        let car = rows[0].as_object().unwrap();
        assert_eq!(car.get("doors").unwrap(), Value::Int(4));
        let bike = rows[1].as_object().unwrap();
        assert!(!bike.has_property("doors"));
    }

    #[test]
    fn test_missing_column_reports_row() {
        let types = types();
        let handlers = TypeHandlerRegistry::new();
        let registries = Registries {
            types: &types,
            handlers: &handlers,
        };
        let maps = compile(
            vec![ResultMapDef::new("line", "Line").result(ResultPropertyDef::new("sku").column("SKU"))],
            registries,
        );
        let set = ResultSet::new(&["OTHER"]).with_json_rows(json!([[1]]));
        let target = ResultTarget::ResultMap(maps["line"].clone());
        let err = run(set, &target, &maps, registries).unwrap_err();
        assert!(matches!(
            err,
            MaterializationError::MissingColumn { ref column, row: 1, .. } if column == "SKU"
        ));
    }

    #[test]
    fn test_simple_map_and_untyped_targets() {
        let types = TypeRegistry::new();
        let handlers = TypeHandlerRegistry::new();
        let registries = Registries {
            types: &types,
            handlers: &handlers,
        };
        let maps = HashMap::new();
        let set = || ResultSet::new(&["A", "B"]).with_json_rows(json!([["7", "x"]]));

        let simple = run(set(), &ResultTarget::Simple(ScalarType::Int), &maps, registries).unwrap();
        assert_eq!(simple, vec![Value::Int(7)]);

        let map = run(set(), &ResultTarget::Map, &maps, registries).unwrap();
        assert_eq!(map[0].as_map().unwrap()["B"], Value::from("x"));

        let untyped = run(set(), &ResultTarget::Untyped, &maps, registries).unwrap();
        assert_eq!(untyped, vec![Value::List(vec![Value::from("7"), Value::from("x")])]);
    }

    #[test]
    fn test_eager_sub_select_needs_executor() {
        let types = types();
        let handlers = TypeHandlerRegistry::new();
        let registries = Registries {
            types: &types,
            handlers: &handlers,
        };
        let maps = compile(
            vec![ResultMapDef::new("order", "Order")
                .result(ResultPropertyDef::new("id").column("ID"))
                .result(ResultPropertyDef::new("lines").column("ID").select("linesFor"))],
            registries,
        );
        let set = ResultSet::new(&["ID"]).with_json_rows(json!([[1]]));
        let target = ResultTarget::ResultMap(maps["order"].clone());
        let err = run(set, &target, &maps, registries).unwrap_err();
        assert!(matches!(err, MaterializationError::ExecutorDropped { .. }));
    }
}
