//! Statement result caching.
//!
//! A [`CacheModel`] is declared once and shared by the statements that name
//! it. Lookups are keyed by a [`CacheKey`] built from the statement id, the
//! call shape and the bound values. An elapsed flush interval empties the
//! whole model before the next lookup.

pub mod cache_key;
pub mod controllers;
pub mod errors;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::value::Value;

pub use cache_key::CacheKey;
pub use controllers::{CacheController, CacheImplementation, CachedValue};
pub use errors::CacheError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushInterval {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub milliseconds: u64,
}

impl FlushInterval {
    pub fn to_duration(self) -> Duration {
        Duration::from_millis(
            self.milliseconds + 1000 * (self.seconds + 60 * (self.minutes + 60 * self.hours)),
        )
    }
}

fn default_read_only() -> bool {
    true
}

/// Cache model as written in a mapping definition.
#[derive(Debug, Clone, PartialEq, Validate, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheModelDef {
    #[validate(length(min = 1, message = "Cache model id cannot be empty"))]
    pub id: String,

    #[serde(default)]
    pub implementation: CacheImplementation,

    /// Entry bound; the mapper's default cache size when absent
    #[validate(range(
        min = 1,
        max = 1_000_000,
        message = "Cache size must be between 1 and 1000000"
    ))]
    #[serde(default)]
    pub size: Option<usize>,

    /// Never flushed by time when absent
    #[serde(default)]
    pub flush_interval: Option<FlushInterval>,

    /// Hits share the cached objects instead of copying them
    #[serde(default = "default_read_only")]
    pub read_only: bool,

    #[serde(default)]
    pub serializable: bool,

    /// Statements whose execution flushes this model
    #[serde(default)]
    pub flush_on_execute: Vec<String>,
}

impl CacheModelDef {
    pub fn new(id: impl Into<String>) -> Self {
        CacheModelDef {
            id: id.into(),
            implementation: CacheImplementation::default(),
            size: None,
            flush_interval: None,
            read_only: true,
            serializable: false,
            flush_on_execute: Vec::new(),
        }
    }

    pub fn implementation(mut self, implementation: CacheImplementation) -> Self {
        self.implementation = implementation;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn flush_interval(mut self, interval: FlushInterval) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn serializable(mut self, serializable: bool) -> Self {
        self.serializable = serializable;
        self
    }

    pub fn flush_on_execute(mut self, statement: impl Into<String>) -> Self {
        self.flush_on_execute.push(statement.into());
        self
    }
}

/// Hit statistics of one cache model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub requests: u64,
    pub hits: u64,
    pub evictions: u64,
    pub size: usize,
}

impl CacheStats {
    /// Hits per request (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct CacheModel {
    id: String,
    controller: Mutex<Box<dyn CacheController>>,
    flush_interval: Option<Duration>,
    last_flush: Mutex<Instant>,
    /// Hits get a private copy through a serialization round trip.
    copy_on_hit: bool,
    flush_on_execute: Vec<String>,
    requests: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
    /// Bumped by every flush, under the controller lock.
    generation: AtomicU64,
    /// Keys whose result is being loaded right now.
    loading: Mutex<HashSet<CacheKey>>,
    loaded: Condvar,
}

/// Exclusive right to load one key, released on drop.
///
/// Results stored through [`KeyGuard::put`] are dropped when the model was
/// flushed after the guard was taken.
pub struct KeyGuard<'a> {
    model: &'a CacheModel,
    key: CacheKey,
    generation: u64,
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Stores `value` unless a flush happened since the guard was taken.
    /// Returns whether the value was stored.
    pub fn put(&self, value: &Value) -> Result<bool, CacheError> {
        self.model
            .store(self.key.clone(), value, Some(self.generation))
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        lock(&self.model.loading).remove(&self.key);
        self.model.loaded.notify_all();
    }
}

impl CacheModel {
    pub fn new(def: &CacheModelDef, default_size: usize) -> Self {
        let capacity = def.size.unwrap_or(default_size);
        CacheModel {
            id: def.id.clone(),
            controller: Mutex::new(controllers::controller(def.implementation, capacity)),
            flush_interval: def
                .flush_interval
                .map(FlushInterval::to_duration)
                .filter(|d| !d.is_zero()),
            last_flush: Mutex::new(Instant::now()),
            copy_on_hit: def.serializable || !def.read_only,
            flush_on_execute: def.flush_on_execute.clone(),
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            loading: Mutex::new(HashSet::new()),
            loaded: Condvar::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn flush_on_execute(&self) -> &[String] {
        &self.flush_on_execute
    }

    /// Waits until no other caller loads `key`, then claims it. Callers
    /// hold the guard across lookup, execution and store. Different keys
    /// never wait on each other.
    pub fn lock_key(&self, key: &CacheKey) -> KeyGuard<'_> {
        let mut loading = lock(&self.loading);
        while loading.contains(key) {
            loading = self
                .loaded
                .wait(loading)
                .unwrap_or_else(PoisonError::into_inner);
        }
        loading.insert(key.clone());
        // read after the claim so a flush racing with it is seen by `put`
        let generation = self.generation.load(Ordering::Acquire);
        KeyGuard {
            model: self,
            key: key.clone(),
            generation,
        }
    }

    /// Cached result for `key`. `Some(Value::Null)` is a cached null result.
    pub fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        self.flush_if_expired();
        self.requests.fetch_add(1, Ordering::Relaxed);
        let cached = lock(&self.controller).get(key);
        let value = match cached {
            None => {
                log::debug!("Cache '{}' miss", self.id);
                return Ok(None);
            }
            Some(CachedValue::Null) => Value::Null,
            Some(CachedValue::Shared(value)) => value,
            Some(CachedValue::Serialized(text)) => {
                serde_json::from_str(&text).map_err(|source| CacheError::Deserialize {
                    cache: self.id.clone(),
                    source,
                })?
            }
        };
        self.hits.fetch_add(1, Ordering::Relaxed);
        log::debug!("Cache '{}' hit", self.id);
        Ok(Some(value))
    }

    pub fn put(&self, key: CacheKey, value: &Value) -> Result<(), CacheError> {
        self.store(key, value, None).map(|_| ())
    }

    fn store(&self, key: CacheKey, value: &Value, generation: Option<u64>) -> Result<bool, CacheError> {
        let cached = if value.is_null() {
            CachedValue::Null
        } else if self.copy_on_hit {
            let text = serde_json::to_string(value).map_err(|source| CacheError::Serialize {
                cache: self.id.clone(),
                source,
            })?;
            CachedValue::Serialized(text)
        } else {
            CachedValue::Shared(value.clone())
        };
        let mut controller = lock(&self.controller);
        if generation.is_some_and(|g| g != self.generation.load(Ordering::Acquire)) {
            log::debug!("Cache '{}' flushed during load; result not stored", self.id);
            return Ok(false);
        }
        let evicted = controller.put(key, cached);
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            log::trace!("Cache '{}' evicted {} entries", self.id, evicted);
        }
        Ok(true)
    }

    pub fn flush(&self) {
        let mut last_flush = lock(&self.last_flush);
        self.clear();
        *last_flush = Instant::now();
    }

    fn clear(&self) {
        let mut controller = lock(&self.controller);
        controller.flush();
        self.generation.fetch_add(1, Ordering::AcqRel);
        log::debug!("Cache '{}' flushed", self.id);
    }

    fn flush_if_expired(&self) {
        let Some(interval) = self.flush_interval else {
            return;
        };
        let mut last_flush = lock(&self.last_flush);
        if last_flush.elapsed() >= interval {
            self.clear();
            *last_flush = Instant::now();
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.controller).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.len(),
        }
    }
}

impl std::fmt::Debug for CacheModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheModel")
            .field("id", &self.id)
            .field("flush_interval", &self.flush_interval)
            .field("copy_on_hit", &self.copy_on_hit)
            .field("flush_on_execute", &self.flush_on_execute)
            .finish()
    }
}
