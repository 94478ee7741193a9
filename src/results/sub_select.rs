//! Properties filled by running another statement with a key from the row.

use std::error::Error;
use std::sync::Weak;

use indexmap::IndexMap;

use super::errors::MaterializationError;
use super::request_scope::{DeferredSelect, RequestScope};
use super::result_property::{KeySpec, ResultProperty};
use crate::driver::RowCursor;
use crate::value::{LazyLoadError, LazyValue, ObjectRef, Value};

/// Runs nested statements on behalf of the materializer.
pub trait StatementExecutor: Send + Sync {
    /// Rows of statement `id`, materialized as a nested execution at `depth`.
    fn select(
        &self,
        id: &str,
        parameter: &Value,
        depth: usize,
    ) -> Result<Vec<Value>, Box<dyn Error + Send + Sync>>;
}

/// First element for object properties, the whole list for collections.
pub(crate) fn shape(rows: Vec<Value>, collection: bool) -> Value {
    if collection {
        Value::List(rows)
    } else {
        rows.into_iter().next().unwrap_or(Value::Null)
    }
}

/// Reads the sub-select parameter from the row; `Null` when every key
/// column is null.
pub(crate) fn key_value(
    property: &ResultProperty,
    row: &dyn RowCursor,
    scope: &RequestScope,
) -> Result<Value, MaterializationError> {
    let Some(select) = property.sub_select() else {
        return Ok(Value::Null);
    };
    let columns = select
        .key()
        .ok_or_else(|| MaterializationError::CompositeKey {
            statement: scope.statement().to_string(),
            property: property.property_name().to_string(),
            text: select.key_text().to_string(),
        })?;
    let read = |column: &str| -> Result<Value, MaterializationError> {
        let index = row
            .column_index(column)
            .ok_or_else(|| MaterializationError::MissingColumn {
                statement: scope.statement().to_string(),
                property: property.property_name().to_string(),
                column: column.to_string(),
                row: scope.row(),
            })?;
        if row.is_null(index) {
            return Ok(Value::Null);
        }
        row.get_value(index)
            .map_err(|source| MaterializationError::Driver {
                statement: scope.statement().to_string(),
                row: scope.row(),
                source,
            })
    };
    match columns {
        KeySpec::Single(column) => read(column),
        KeySpec::Composite(pairs) => {
            let mut key = IndexMap::with_capacity(pairs.len());
            let mut any = false;
            for (name, column) in pairs {
                let value = read(column)?;
                any |= !value.is_null();
                key.insert(name.clone(), value);
            }
            Ok(if any { Value::Map(key) } else { Value::Null })
        }
    }
}

/// Installs the sub-select result of `property` on `target`: null for a null
/// key, a lazy stand-in, or a deferred job run after the main rows.
pub(crate) fn install(
    property: &ResultProperty,
    target: &ObjectRef,
    key: Value,
    lazy_loading: bool,
    executor: Option<&Weak<dyn StatementExecutor>>,
    scope: &mut RequestScope,
) -> Result<(), MaterializationError> {
    let Some(select) = property.sub_select() else {
        return Ok(());
    };
    let set = |value: Value| {
        property
            .accessor()
            .set_on(target, value)
            .map_err(|source| MaterializationError::Property {
                statement: scope.statement().to_string(),
                property: property.property_name().to_string(),
                row: scope.row(),
                source,
            })
    };
    if key.is_null() {
        return set(Value::Null);
    }

    if select.is_lazy() && lazy_loading {
        let Some(executor) = executor.cloned() else {
            return Err(MaterializationError::ExecutorDropped {
                statement: scope.statement().to_string(),
                select: select.statement().to_string(),
            });
        };
        let statement = select.statement().to_string();
        let collection = property.is_collection();
        let lazy = LazyValue::new(statement.clone(), move || {
            let executor = executor.upgrade().ok_or_else(|| LazyLoadError {
                statement: statement.clone(),
                source: "the mapper that created this object was dropped".into(),
            })?;
            executor
                .select(&statement, &key, 0)
                .map(|rows| shape(rows, collection))
                .map_err(|source| LazyLoadError {
                    statement: statement.clone(),
                    source,
                })
        });
        log::trace!(
            "Lazy '{}' installed on '{}'",
            select.statement(),
            property.property_name()
        );
        return set(Value::Lazy(lazy));
    }

    let deferred = DeferredSelect {
        target: target.clone(),
        accessor: property.accessor().clone(),
        statement: select.statement().to_string(),
        parameter: key,
        collection: property.is_collection(),
    };
    scope.defer(deferred);
    Ok(())
}

/// Runs the deferred sub-selects of `scope` in queue order. Nested
/// executions happen one level deeper than `scope`.
pub(crate) fn run_deferred(
    scope: &mut RequestScope,
    executor: Option<&Weak<dyn StatementExecutor>>,
    max_depth: usize,
) -> Result<(), MaterializationError> {
    if !scope.has_deferred() {
        return Ok(());
    }
    let depth = scope.depth() + 1;
    if depth > max_depth {
        return Err(MaterializationError::DepthExceeded {
            statement: scope.statement().to_string(),
            limit: max_depth,
        });
    }
    while let Some(job) = scope.take_deferred() {
        let executor = executor.and_then(Weak::upgrade).ok_or_else(|| {
            MaterializationError::ExecutorDropped {
                statement: scope.statement().to_string(),
                select: job.statement.clone(),
            }
        })?;
        log::debug!(
            "Running deferred '{}' for '{}' (depth {})",
            job.statement,
            job.accessor.name(),
            depth
        );
        let rows = executor
            .select(&job.statement, &job.parameter, depth)
            .map_err(|source| MaterializationError::SubSelect {
                statement: scope.statement().to_string(),
                select: job.statement.clone(),
                property: job.accessor.name().to_string(),
                source,
            })?;
        job.accessor
            .set_on(&job.target, shape(rows, job.collection))
            .map_err(|source| MaterializationError::Property {
                statement: scope.statement().to_string(),
                property: job.accessor.name().to_string(),
                row: scope.row(),
                source,
            })?;
    }
    Ok(())
}
