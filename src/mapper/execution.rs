//! Expand, bind, execute and materialize.

use super::SqlMapper;
use crate::cache::CacheKey;
use crate::driver::{Command, CommandKind, RowCursor};
use crate::errors::DataMapperError;
use crate::results::{MaterializeContext, Materializer, RequestScope, ResultTarget};
use crate::statement::{
    MappedStatement, PreparedStatement, SelectKey, SelectKeyType, StatementKind, StatementPreparer,
};
use crate::template::Expanded;
use crate::value::Value;

/// Results `skip..skip + max` of the first result set.
#[derive(Debug, Clone, Copy)]
pub(super) struct Window {
    pub skip: usize,
    pub max: usize,
}

impl SqlMapper {
    /// Result sets of a query, served from the statement's cache model when
    /// it has one.
    pub(super) fn query_sets(
        &self,
        statement: &MappedStatement,
        parameter: &Value,
        depth: usize,
        window: Option<Window>,
    ) -> Result<Vec<Vec<Value>>, DataMapperError> {
        let cache = statement
            .cache_model()
            .filter(|_| self.config.settings().cache_models_enabled);
        let Some(cache) = cache else {
            return self.execute_query(statement, parameter, depth, None, window);
        };

        let expanded = self.expand(statement, parameter)?;
        let (command, prepared) = self.prepare(statement, &expanded, parameter)?;
        let key = cache_key(statement, &prepared, window);
        let guard = cache.lock_key(&key);

        if let Some(hit) = cache.get(&key)? {
            return Ok(from_cached(hit));
        }
        let sets = self.run_query(statement, command, &prepared, parameter, depth, None, window)?;
        guard.put(&to_cached(&sets))?;
        Ok(sets)
    }

    /// Result sets of a query, bypassing the cache. `target` receives the
    /// first row instead of a new result object.
    pub(super) fn execute_query(
        &self,
        statement: &MappedStatement,
        parameter: &Value,
        depth: usize,
        target: Option<&Value>,
        window: Option<Window>,
    ) -> Result<Vec<Vec<Value>>, DataMapperError> {
        let expanded = self.expand(statement, parameter)?;
        let (command, prepared) = self.prepare(statement, &expanded, parameter)?;
        self.run_query(statement, command, &prepared, parameter, depth, target, window)
    }

    pub(super) fn execute_update(
        &self,
        statement: &MappedStatement,
        parameter: &Value,
    ) -> Result<u64, DataMapperError> {
        let expanded = self.expand(statement, parameter)?;
        let (mut command, prepared) = self.prepare(statement, &expanded, parameter)?;
        let affected = command
            .execute_non_query()
            .map_err(|e| DataMapperError::driver(statement.id(), e))?;
        log::debug!("'{}' affected {} rows", statement.id(), affected);
        self.write_outputs(statement, command.as_ref(), &prepared, parameter)?;
        self.flush_triggered(statement);
        Ok(affected)
    }

    pub(super) fn execute_insert(
        &self,
        statement: &MappedStatement,
        parameter: &Value,
    ) -> Result<Option<Value>, DataMapperError> {
        let Some(select_key) = statement.select_key() else {
            self.execute_update(statement, parameter)?;
            return Ok(None);
        };
        if select_key.kind() == SelectKeyType::Pre {
            let key = self.run_select_key(statement, select_key, parameter)?;
            self.execute_update(statement, parameter)?;
            Ok(Some(key))
        } else {
            self.execute_update(statement, parameter)?;
            self.run_select_key(statement, select_key, parameter).map(Some)
        }
    }

    fn expand(&self, statement: &MappedStatement, parameter: &Value) -> Result<Expanded, DataMapperError> {
        statement
            .expand(parameter, self.config.registries())
            .map_err(|source| DataMapperError::Expansion {
                statement: statement.id().to_string(),
                source,
            })
    }

    /// Command with text and parameters bound. Procedures are called by the
    /// name their body expands to.
    fn prepare(
        &self,
        statement: &MappedStatement,
        expanded: &Expanded,
        parameter: &Value,
    ) -> Result<(Box<dyn Command>, PreparedStatement), DataMapperError> {
        let preparer = StatementPreparer::new(statement.id(), self.data_source.capabilities());
        let kind = if statement.kind() == StatementKind::Procedure {
            CommandKind::StoredProcedure
        } else {
            CommandKind::Text
        };
        let mut command = self
            .data_source
            .create_command(kind)
            .map_err(|e| DataMapperError::driver(statement.id(), e))?;
        let prepared = match kind {
            CommandKind::StoredProcedure => preparer.prepare_procedure(
                expanded.sql.trim(),
                &expanded.parameters,
                parameter,
                command.as_mut(),
                self.data_source.as_ref(),
                &self.procedures,
            )?,
            CommandKind::Text => preparer.prepare(expanded, parameter, command.as_mut())?,
        };
        log::debug!("Executing '{}': {}", statement.id(), prepared.text);
        Ok((command, prepared))
    }

    #[allow(clippy::too_many_arguments)]
    fn run_query(
        &self,
        statement: &MappedStatement,
        mut command: Box<dyn Command>,
        prepared: &PreparedStatement,
        parameter: &Value,
        depth: usize,
        target: Option<&Value>,
        window: Option<Window>,
    ) -> Result<Vec<Vec<Value>>, DataMapperError> {
        let mut cursor = command
            .execute_query()
            .map_err(|e| DataMapperError::driver(statement.id(), e))?;
        let sets = self.read_results(statement, cursor.as_mut(), depth, target, window)?;
        self.write_outputs(statement, command.as_ref(), prepared, parameter)?;
        self.flush_triggered(statement);
        Ok(sets)
    }

    fn materializer<'a>(&'a self, statement: &'a str) -> Materializer<'a> {
        let settings = self.config.settings();
        Materializer::new(MaterializeContext {
            statement,
            result_maps: self.config.result_maps(),
            registries: self.config.registries(),
            executor: Some(self.executor.clone()),
            lazy_loading: settings.lazy_loading_enabled,
            max_sub_select_depth: settings.max_sub_select_depth,
        })
    }

    /// One list of values per result set the statement maps. Deferred
    /// sub-selects run once every set has been read.
    ///
    /// `window` applies to the first set. Rows outside it are skipped at the
    /// cursor and never materialized, unless the set's result map groups
    /// rows: then every row is merged and the window cuts the results.
    fn read_results(
        &self,
        statement: &MappedStatement,
        cursor: &mut dyn RowCursor,
        depth: usize,
        target: Option<&Value>,
        window: Option<Window>,
    ) -> Result<Vec<Vec<Value>>, DataMapperError> {
        let driver_error = |e| DataMapperError::driver(statement.id(), e);
        let private_auto_map = statement.private_auto_map();
        let materializer = self.materializer(statement.id());
        let mut scope = RequestScope::new(statement.id(), depth);
        let mut sets = Vec::with_capacity(statement.result_set_count());

        for index in 0..statement.result_set_count() {
            if index > 0 {
                if !cursor.next_result().map_err(driver_error)? {
                    break;
                }
                scope.next_result_set();
            }
            let result_target = statement.result_target(index, private_auto_map.as_ref());
            let window = window.filter(|_| index == 0);
            let grouped = groups(&result_target);
            let mut skipped = 0;
            let mut values = Vec::new();
            while cursor.read().map_err(driver_error)? {
                scope.next_row();
                if let (Some(w), false) = (window, grouped) {
                    if skipped < w.skip {
                        skipped += 1;
                        continue;
                    }
                    if values.len() >= w.max {
                        break;
                    }
                }
                let existing = match (index, values.is_empty()) {
                    (0, true) => target,
                    _ => None,
                };
                if let Some(value) = materializer.materialize(&result_target, &*cursor, &mut scope, existing)? {
                    values.push(value);
                }
            }
            if let (Some(w), true) = (window, grouped) {
                values = values.into_iter().skip(w.skip).take(w.max).collect();
            }
            log::trace!("'{}' result set {} produced {} values", statement.id(), index, values.len());
            sets.push(values);
        }
        materializer.finish(&mut scope)?;
        Ok(sets)
    }

    /// Runs the select key of an insert and stores the key on an object
    /// parameter.
    fn run_select_key(
        &self,
        statement: &MappedStatement,
        select_key: &SelectKey,
        parameter: &Value,
    ) -> Result<Value, DataMapperError> {
        let id = format!("{}.selectKey", statement.id());
        let expanded = select_key
            .template
            .expand(parameter, self.config.registries())
            .map_err(|source| DataMapperError::Expansion {
                statement: id.clone(),
                source,
            })?;
        let preparer = StatementPreparer::new(&id, self.data_source.capabilities());
        let mut command = self
            .data_source
            .create_command(CommandKind::Text)
            .map_err(|e| DataMapperError::driver(&id, e))?;
        preparer.prepare(&expanded, parameter, command.as_mut())?;
        let mut cursor = command
            .execute_query()
            .map_err(|e| DataMapperError::driver(&id, e))?;

        let mut scope = RequestScope::new(id.as_str(), 0);
        let target = ResultTarget::for_class(select_key.result_class.as_ref(), None);
        let key = if cursor.read().map_err(|e| DataMapperError::driver(&id, e))? {
            scope.next_row();
            self.materializer(&id)
                .materialize(&target, cursor.as_ref(), &mut scope, None)?
                .unwrap_or_default()
        } else {
            Value::Null
        };
        log::debug!("Select key of '{}' returned {}", statement.id(), key);

        match parameter {
            Value::Object(object) => select_key
                .accessor
                .set_on(object, key.clone())
                .map_err(|source| DataMapperError::Property {
                    statement: statement.id().to_string(),
                    property: select_key.property().to_string(),
                    source,
                })?,
            _ => log::debug!(
                "Parameter of '{}' is a {}; key not written back",
                statement.id(),
                parameter.kind_name()
            ),
        }
        Ok(key)
    }

    /// Output parameters are copied into object parameters only.
    fn write_outputs(
        &self,
        statement: &MappedStatement,
        command: &dyn Command,
        prepared: &PreparedStatement,
        parameter: &Value,
    ) -> Result<(), DataMapperError> {
        if !matches!(parameter, Value::Object(_)) {
            return Ok(());
        }
        let written = prepared.write_outputs(statement.id(), command, parameter)?;
        if written > 0 {
            log::debug!("'{}' wrote {} output parameters", statement.id(), written);
        }
        Ok(())
    }

    fn flush_triggered(&self, statement: &MappedStatement) {
        for cache in self.config.flush_triggers(statement.id()) {
            log::debug!("'{}' flushes cache model '{}'", statement.id(), cache.id());
            cache.flush();
        }
    }
}

/// Statement id, final SQL text and bound values, in that order, then the
/// window of a ranged query.
fn cache_key(statement: &MappedStatement, prepared: &PreparedStatement, window: Option<Window>) -> CacheKey {
    let mut key = CacheKey::new();
    key.update_str(statement.id()).update_str(&prepared.text);
    for value in prepared.values() {
        key.update(&value);
    }
    if let Some(w) = window {
        key.update_str("window")
            .update(&Value::Int(w.skip as i64))
            .update(&Value::Int(w.max as i64));
    }
    key
}

fn groups(target: &ResultTarget<'_>) -> bool {
    matches!(target, ResultTarget::ResultMap(map) if map.has_group_by())
}

fn to_cached(sets: &[Vec<Value>]) -> Value {
    Value::List(sets.iter().cloned().map(Value::List).collect())
}

fn from_cached(value: Value) -> Vec<Vec<Value>> {
    match value {
        Value::List(sets) => sets
            .into_iter()
            .map(|set| match set {
                Value::List(rows) => rows,
                other => vec![other],
            })
            .collect(),
        other => vec![vec![other]],
    }
}
