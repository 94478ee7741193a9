//! Bounded entry stores behind a cache model.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::cache_key::CacheKey;
use crate::value::Value;

/// Stored form of a cached result. `Null` is a cached empty result, which a
/// lookup must tell apart from a miss.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Null,
    /// Handed out as is: every hit shares the same objects.
    Shared(Value),
    /// Deserialized per hit into a private copy.
    Serialized(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheImplementation {
    #[default]
    Lru,
    Fifo,
}

pub trait CacheController: Send {
    fn get(&mut self, key: &CacheKey) -> Option<CachedValue>;

    /// Stores `value`, returning how many entries were evicted to make room.
    fn put(&mut self, key: CacheKey, value: CachedValue) -> usize;

    fn remove(&mut self, key: &CacheKey) -> Option<CachedValue>;

    fn flush(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn controller(implementation: CacheImplementation, capacity: usize) -> Box<dyn CacheController> {
    match implementation {
        CacheImplementation::Lru => Box::new(LruController::new(capacity)),
        CacheImplementation::Fifo => Box::new(FifoController::new(capacity)),
    }
}

#[derive(Debug)]
struct LruEntry {
    value: CachedValue,
    /// Logical access clock; the smallest is evicted first.
    last_accessed: u64,
}

/// Evicts the least recently read or written entry.
#[derive(Debug)]
pub struct LruController {
    capacity: usize,
    clock: u64,
    entries: HashMap<CacheKey, LruEntry>,
}

impl LruController {
    pub fn new(capacity: usize) -> Self {
        LruController {
            capacity: capacity.max(1),
            clock: 0,
            entries: HashMap::new(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_lru(&mut self) -> bool {
        let Some(key) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| key.clone())
        else {
            return false;
        };
        self.entries.remove(&key);
        true
    }
}

impl CacheController for LruController {
    fn get(&mut self, key: &CacheKey) -> Option<CachedValue> {
        let now = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = now;
        Some(entry.value.clone())
    }

    fn put(&mut self, key: CacheKey, value: CachedValue) -> usize {
        let now = self.tick();
        let mut evicted = 0;
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.capacity && self.evict_lru() {
                evicted += 1;
            }
        }
        self.entries.insert(
            key,
            LruEntry {
                value,
                last_accessed: now,
            },
        );
        evicted
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CachedValue> {
        self.entries.remove(key).map(|e| e.value)
    }

    fn flush(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Evicts in insertion order; reads do not refresh an entry.
#[derive(Debug)]
pub struct FifoController {
    capacity: usize,
    entries: HashMap<CacheKey, CachedValue>,
    order: VecDeque<CacheKey>,
}

impl FifoController {
    pub fn new(capacity: usize) -> Self {
        FifoController {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }
}

impl CacheController for FifoController {
    fn get(&mut self, key: &CacheKey) -> Option<CachedValue> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: CacheKey, value: CachedValue) -> usize {
        let mut evicted = 0;
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.capacity {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
                evicted += 1;
            }
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, value);
        evicted
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CachedValue> {
        self.order.retain(|k| k != key);
        self.entries.remove(key)
    }

    fn flush(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
