//! Statement execution API.
//!
//! [`SqlMapper`] owns a compiled [`Configuration`] and a data source. Every
//! call expands the statement against the parameter object, binds it to a
//! driver command, consults the statement's cache model and materializes the
//! rows. Calls are synchronous and may run concurrently from many threads.

mod execution;

use std::error::Error;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use crate::cache::CacheStats;
use crate::configuration::Configuration;
use crate::driver::DataSource;
use crate::errors::DataMapperError;
use crate::results::StatementExecutor;
use crate::statement::{MappedStatement, ProcedureCache, StatementKind};
use crate::types::PropertyAccessor;
use crate::value::{PropertyPath, Value};
use execution::Window;

/// Result of [`SqlMapper::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteOutcome {
    Rows(Vec<Value>),
    Affected(u64),
}

const QUERY_KINDS: &[StatementKind] = &[
    StatementKind::Select,
    StatementKind::Statement,
    StatementKind::Procedure,
];
const INSERT_KINDS: &[StatementKind] = &[
    StatementKind::Insert,
    StatementKind::Statement,
    StatementKind::Procedure,
];
const UPDATE_KINDS: &[StatementKind] = &[
    StatementKind::Update,
    StatementKind::Statement,
    StatementKind::Procedure,
];
const DELETE_KINDS: &[StatementKind] = &[
    StatementKind::Delete,
    StatementKind::Statement,
    StatementKind::Procedure,
];

pub struct SqlMapper {
    config: Configuration,
    data_source: Arc<dyn DataSource>,
    procedures: ProcedureCache,
    /// Handed to materializers for sub-selects and lazy loads.
    executor: Weak<dyn StatementExecutor>,
}

impl SqlMapper {
    pub fn new(config: Configuration, data_source: Arc<dyn DataSource>) -> Arc<Self> {
        log::info!(
            "Starting mapper on data source '{}' with {} statements",
            data_source.name(),
            config.statement_ids().len()
        );
        Arc::new_cyclic(|weak: &Weak<SqlMapper>| {
            let executor: Weak<dyn StatementExecutor> = weak.clone();
            SqlMapper {
                config,
                data_source,
                procedures: ProcedureCache::new(),
                executor,
            }
        })
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.data_source
    }

    fn statement(
        &self,
        id: &str,
        allowed: &[StatementKind],
        expected: &'static str,
    ) -> Result<&Arc<MappedStatement>, DataMapperError> {
        let statement = self
            .config
            .statement(id)
            .ok_or_else(|| DataMapperError::StatementNotFound(id.to_string()))?;
        if !allowed.contains(&statement.kind()) {
            return Err(DataMapperError::WrongStatementKind {
                statement: id.to_string(),
                kind: statement.kind(),
                expected,
            });
        }
        Ok(statement)
    }

    /// Single result of a query, `None` when no row matched. Only the first
    /// result set is read.
    pub fn query_for_object(
        &self,
        id: &str,
        parameter: &Value,
    ) -> Result<Option<Value>, DataMapperError> {
        let statement = self.statement(id, QUERY_KINDS, "a query")?;
        let mut sets = self.query_sets(statement, parameter, 0, None)?;
        let rows = if sets.is_empty() { Vec::new() } else { sets.swap_remove(0) };
        single(id, rows)
    }

    /// Like [`query_for_object`](Self::query_for_object) but fills `target`
    /// instead of instantiating a new result object. Never cached.
    pub fn query_for_object_into(
        &self,
        id: &str,
        parameter: &Value,
        target: &Value,
    ) -> Result<Option<Value>, DataMapperError> {
        let statement = self.statement(id, QUERY_KINDS, "a query")?;
        let mut sets = self.execute_query(statement, parameter, 0, Some(target), None)?;
        let rows = if sets.is_empty() { Vec::new() } else { sets.swap_remove(0) };
        single(id, rows)
    }

    /// All results. A statement with several result maps yields one list per
    /// result set.
    pub fn query_for_list(&self, id: &str, parameter: &Value) -> Result<Vec<Value>, DataMapperError> {
        let statement = self.statement(id, QUERY_KINDS, "a query")?;
        let sets = self.query_sets(statement, parameter, 0, None)?;
        Ok(shape_sets(statement, sets))
    }

    /// Results `skip..skip + max` of [`query_for_list`](Self::query_for_list).
    /// Skipped rows are not materialized, so their sub-selects never run.
    pub fn query_for_list_range(
        &self,
        id: &str,
        parameter: &Value,
        skip: usize,
        max: usize,
    ) -> Result<Vec<Value>, DataMapperError> {
        let statement = self.statement(id, QUERY_KINDS, "a query")?;
        if statement.result_set_count() > 1 {
            let sets = self.query_sets(statement, parameter, 0, None)?;
            return Ok(shape_sets(statement, sets).into_iter().skip(skip).take(max).collect());
        }
        let sets = self.query_sets(statement, parameter, 0, Some(Window { skip, max }))?;
        Ok(sets.into_iter().next().unwrap_or_default())
    }

    /// Feeds every result to `handler` in order and returns how many there
    /// were. Results are complete, sub-selects included, when handed over.
    pub fn query_with_row_handler(
        &self,
        id: &str,
        parameter: &Value,
        mut handler: impl FnMut(Value),
    ) -> Result<usize, DataMapperError> {
        let results = self.query_for_list(id, parameter)?;
        let count = results.len();
        for value in results {
            handler(value);
        }
        Ok(count)
    }

    /// Results keyed by the string form of `key_property`. With
    /// `value_property` the map holds that property instead of the result.
    /// A later result replaces an earlier one with the same key.
    pub fn query_for_map(
        &self,
        id: &str,
        parameter: &Value,
        key_property: &str,
        value_property: Option<&str>,
    ) -> Result<IndexMap<String, Value>, DataMapperError> {
        let accessor = |path: &str| -> Result<PropertyAccessor, DataMapperError> {
            PropertyPath::parse(path)
                .map(PropertyAccessor::untyped)
                .map_err(|source| DataMapperError::Property {
                    statement: id.to_string(),
                    property: path.to_string(),
                    source,
                })
        };
        let key = accessor(key_property)?;
        let value = value_property.map(accessor).transpose()?;

        let mut map = IndexMap::new();
        for result in self.query_for_list(id, parameter)? {
            let read = |accessor: &PropertyAccessor| {
                accessor
                    .get(&result)
                    .map_err(|source| DataMapperError::Property {
                        statement: id.to_string(),
                        property: accessor.name().to_string(),
                        source,
                    })
            };
            let k = read(&key)?.to_string();
            let v = match &value {
                Some(accessor) => read(accessor)?,
                None => result.clone(),
            };
            map.insert(k, v);
        }
        Ok(map)
    }

    /// Runs an insert and returns the generated key when the statement has a
    /// select key. The key is also written to the parameter object.
    pub fn insert(&self, id: &str, parameter: &Value) -> Result<Option<Value>, DataMapperError> {
        let statement = self.statement(id, INSERT_KINDS, "an insert")?;
        self.execute_insert(statement, parameter)
    }

    pub fn update(&self, id: &str, parameter: &Value) -> Result<u64, DataMapperError> {
        let statement = self.statement(id, UPDATE_KINDS, "an update")?;
        self.execute_update(statement, parameter)
    }

    pub fn delete(&self, id: &str, parameter: &Value) -> Result<u64, DataMapperError> {
        let statement = self.statement(id, DELETE_KINDS, "a delete")?;
        self.execute_update(statement, parameter)
    }

    /// Runs any statement. Statements that declare a result (select kind,
    /// result maps or a result class) return rows, all others the affected
    /// row count.
    pub fn execute(&self, id: &str, parameter: &Value) -> Result<ExecuteOutcome, DataMapperError> {
        let statement = self
            .config
            .statement(id)
            .ok_or_else(|| DataMapperError::StatementNotFound(id.to_string()))?;
        let returns_rows = statement.kind() == StatementKind::Select
            || !statement.result_maps().is_empty()
            || statement.result_class().is_some();
        if returns_rows {
            let sets = self.query_sets(statement, parameter, 0, None)?;
            Ok(ExecuteOutcome::Rows(shape_sets(statement, sets)))
        } else if statement.kind() == StatementKind::Insert {
            self.execute_insert(statement, parameter)
                .map(|key| ExecuteOutcome::Rows(key.into_iter().collect()))
        } else {
            self.execute_update(statement, parameter)
                .map(ExecuteOutcome::Affected)
        }
    }

    /// Statistics of a cache model, `None` for unknown ids.
    pub fn cache_stats(&self, cache_model: &str) -> Option<CacheStats> {
        self.config.cache_model(cache_model).map(|c| c.stats())
    }

    /// Flushes one cache model. Returns false for unknown ids.
    pub fn flush_cache(&self, cache_model: &str) -> bool {
        match self.config.cache_model(cache_model) {
            Some(cache) => {
                cache.flush();
                true
            }
            None => false,
        }
    }

    pub fn flush_all_caches(&self) {
        for cache in self.config.cache_models() {
            cache.flush();
        }
    }
}

impl StatementExecutor for SqlMapper {
    fn select(
        &self,
        id: &str,
        parameter: &Value,
        depth: usize,
    ) -> Result<Vec<Value>, Box<dyn Error + Send + Sync>> {
        let statement = self.statement(id, QUERY_KINDS, "a sub-select")?;
        let sets = self.query_sets(statement, parameter, depth, None)?;
        Ok(sets.into_iter().next().unwrap_or_default())
    }
}

fn single(id: &str, mut rows: Vec<Value>) -> Result<Option<Value>, DataMapperError> {
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.pop()),
        count => Err(DataMapperError::TooManyResults {
            statement: id.to_string(),
            count,
        }),
    }
}

/// One list per result set for multi-map statements, the rows otherwise.
fn shape_sets(statement: &MappedStatement, sets: Vec<Vec<Value>>) -> Vec<Value> {
    if statement.result_set_count() > 1 {
        sets.into_iter().map(Value::List).collect()
    } else {
        sets.into_iter().next().unwrap_or_default()
    }
}
