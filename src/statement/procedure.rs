//! Stored procedure signatures read through driver introspection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::driver::{DataSource, DbParameter, DriverError};

/// Derived procedure signatures, keyed by connection string and procedure
/// name. Owned by one mapper; callers always receive a private copy.
#[derive(Debug, Default)]
pub struct ProcedureCache {
    signatures: Mutex<HashMap<String, Arc<Vec<DbParameter>>>>,
}

impl ProcedureCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Vec<DbParameter>>>> {
        self.signatures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Signature of `procedure`, derived on first use.
    pub fn signature(
        &self,
        source: &dyn DataSource,
        procedure: &str,
    ) -> Result<Vec<DbParameter>, DriverError> {
        let key = format!("{}:{}", source.connection_string(), procedure);
        if let Some(cached) = self.lock().get(&key) {
            return Ok(cached.as_ref().clone());
        }

        // Derivation talks to the database; do it without holding the lock.
        let derived = source.derive_parameters(procedure)?;
        log::debug!(
            "Derived {} parameters for procedure '{}' on {}",
            derived.len(),
            procedure,
            source.name()
        );
        let entry = self
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(derived))
            .clone();
        Ok(entry.as_ref().clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
