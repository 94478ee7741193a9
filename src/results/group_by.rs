//! Group keys for N+1 avoidance: rows with equal group-by column values
//! collapse into one object.

use std::fmt::Write;

use crate::value::Value;

/// Identity of a grouped object. Nested keys embed their parent's key, so a
/// child row shared by two parents is materialized once per parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn from_parts(parent: &str, result_map: &str, values: &[Value]) -> Self {
        let mut key = String::with_capacity(parent.len() + result_map.len() + values.len() * 8);
        if !parent.is_empty() {
            key.push_str(parent);
            key.push('/');
        }
        key.push_str(result_map);
        key.push(':');
        for value in values {
            // kind + length prefix: `1` and `"1"` must not collide
            let text = value.to_string();
            let _ = write!(key, "{}{}={};", value.kind_name(), text.len(), text);
        }
        GroupKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_deterministic_and_typed() {
        let a = GroupKey::from_parts("", "order", &[Value::Int(1), Value::from("x")]);
        let b = GroupKey::from_parts("", "order", &[Value::Int(1), Value::from("x")]);
        assert_eq!(a, b);
        assert_ne!(a, GroupKey::from_parts("", "order", &[Value::from("1"), Value::from("x")]));
        assert_ne!(a, GroupKey::from_parts("", "line", &[Value::Int(1), Value::from("x")]));
    }

    #[test]
    fn test_scoped_by_parent() {
        let p1 = GroupKey::from_parts("", "order", &[Value::Int(1)]);
        let p2 = GroupKey::from_parts("", "order", &[Value::Int(2)]);
        let c1 = GroupKey::from_parts(p1.as_str(), "line", &[Value::Int(9)]);
        let c2 = GroupKey::from_parts(p2.as_str(), "line", &[Value::Int(9)]);
        assert_ne!(c1, c2);
    }
}
