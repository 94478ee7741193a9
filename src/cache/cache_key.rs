use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::value::Value;

const DEFAULT_MULTIPLIER: i64 = 37;
const DEFAULT_HASHCODE: i64 = 17;

/// Order-sensitive composite key over the values of one invocation.
///
/// Equal keys have equal hash, checksum, part count and parts; the hash alone
/// is what the controllers bucket on.
#[derive(Clone)]
pub struct CacheKey {
    hash_code: i64,
    checksum: i64,
    parts: Vec<String>,
}

impl Default for CacheKey {
    fn default() -> Self {
        CacheKey {
            hash_code: DEFAULT_HASHCODE,
            checksum: 0,
            parts: Vec::new(),
        }
    }
}

impl CacheKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: &Value) -> &mut Self {
        // kind prefix: Int(1) and Text("1") are different parts
        let part = format!("{}:{}", value.kind_name(), value);
        let mut hasher = DefaultHasher::new();
        part.hash(&mut hasher);
        let base = hasher.finish() as i64;

        self.checksum = self.checksum.wrapping_add(base);
        let base = base.wrapping_mul(self.parts.len() as i64 + 1);
        self.hash_code = self
            .hash_code
            .wrapping_mul(DEFAULT_MULTIPLIER)
            .wrapping_add(base);
        self.parts.push(part);
        self
    }

    pub fn update_str(&mut self, text: &str) -> &mut Self {
        self.update(&Value::from(text))
    }

    pub fn with(mut self, value: &Value) -> Self {
        self.update(value);
        self
    }

    pub fn hash_code(&self) -> i64 {
        self.hash_code
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash_code == other.hash_code
            && self.checksum == other.checksum
            && self.parts == other.parts
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_code.hash(state);
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.hash_code, self.checksum)?;
        for part in &self.parts {
            write!(f, "|{}", part)?;
        }
        Ok(())
    }
}
