//! Column-to-property mapping discovered from the first result set a
//! statement returns, for result classes without a declared result map.

use std::sync::{Arc, PoisonError, RwLock};

use crate::driver::RowCursor;
use crate::parameters::Registries;
use crate::type_handlers::TypeHandler;
use crate::types::{PropertyAccessor, ResolutionError, TypeKind};

#[derive(Debug, Clone)]
pub struct AutoMapping {
    pub column: usize,
    pub column_name: String,
    pub accessor: PropertyAccessor,
    pub handler: Arc<dyn TypeHandler>,
}

/// Lazily discovered mapping for one statement. Built once and then shared;
/// statements that allow remapping use a fresh instance per execution.
#[derive(Debug)]
pub struct AutoResultMap {
    class: TypeKind,
    mappings: RwLock<Option<Arc<Vec<AutoMapping>>>>,
}

impl AutoResultMap {
    pub fn new(class: TypeKind) -> Self {
        AutoResultMap {
            class,
            mappings: RwLock::new(None),
        }
    }

    pub fn class(&self) -> &TypeKind {
        &self.class
    }

    pub fn is_built(&self) -> bool {
        self.mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Mappings for the columns of `row`, discovered on first call.
    pub fn mappings(
        &self,
        row: &dyn RowCursor,
        registries: Registries<'_>,
    ) -> Result<Arc<Vec<AutoMapping>>, ResolutionError> {
        if let Some(built) = self
            .mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(built.clone());
        }
        let mut slot = self.mappings.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(built) = slot.as_ref() {
            return Ok(built.clone());
        }
        let built = Arc::new(discover(&self.class, row, registries)?);
        *slot = Some(built.clone());
        Ok(built)
    }
}

/// Matches columns to properties of `class` by name, ignoring case.
pub fn discover(
    class: &TypeKind,
    row: &dyn RowCursor,
    registries: Registries<'_>,
) -> Result<Vec<AutoMapping>, ResolutionError> {
    let TypeKind::Class(def) = class else {
        return Ok(Vec::new());
    };
    let mut mappings = Vec::with_capacity(row.column_count());
    for column in 0..row.column_count() {
        let Some(name) = row.column_name(column) else {
            continue;
        };
        match def.find_property_ignore_case(name) {
            Some((property, ty)) => {
                let accessor = registries.types.accessor(Some(class), property)?;
                let handler = registries.handlers.for_property_type(Some(ty), None);
                mappings.push(AutoMapping {
                    column,
                    column_name: name.to_string(),
                    accessor,
                    handler,
                });
            }
            None => log::warn!(
                "Column '{}' has no matching property on '{}'; ignored",
                name,
                def.name()
            ),
        }
    }
    log::debug!(
        "Auto-mapped {} of {} columns onto '{}'",
        mappings.len(),
        row.column_count(),
        def.name()
    );
    Ok(mappings)
}
