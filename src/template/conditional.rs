//! Evaluation of the conditional tags.

use std::cmp::Ordering;

use super::{CompareOp, UnaryTest};
use crate::type_handlers::coerce;
use crate::types::ScalarType;
use crate::value::Value;

/// Orders two values. `None` means not comparable: exactly one side is null.
///
/// The right-hand side is converted to the left-hand side's runtime type
/// first; when that fails, or the types have no natural order, both sides are
/// compared by their string form.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => return Some(Ordering::Equal),
        (Value::Null, _) | (_, Value::Null) => return None,
        _ => {}
    }
    let converted = if left.kind_name() == right.kind_name() {
        Some(right.clone())
    } else {
        match ScalarType::of(left) {
            ScalarType::Any => None,
            ty => coerce(ty, right.clone()).ok(),
        }
    };
    let ordered = converted.as_ref().and_then(|right| natural_order(left, right));
    Some(ordered.unwrap_or_else(|| left.to_string().cmp(&right.to_string())))
}

fn natural_order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

pub(crate) fn is_satisfied(op: CompareOp, ordering: Option<Ordering>) -> bool {
    match op {
        CompareOp::Equal => ordering == Some(Ordering::Equal),
        CompareOp::NotEqual => ordering != Some(Ordering::Equal),
        CompareOp::GreaterThan => ordering == Some(Ordering::Greater),
        CompareOp::GreaterEqual => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        CompareOp::LessThan => ordering == Some(Ordering::Less),
        CompareOp::LessEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
    }
}

/// Null, an empty collection, or anything whose string form is empty.
pub(crate) fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::List(items) => items.is_empty(),
        Value::Map(map) => map.is_empty(),
        Value::Object(_) | Value::Lazy(_) => false,
        other => other.to_string().is_empty(),
    }
}

/// Value-based unary tests; property availability is decided by the caller.
pub(crate) fn unary_holds(test: UnaryTest, value: &Value) -> bool {
    match test {
        UnaryTest::Empty => is_empty(value),
        UnaryTest::NotEmpty => !is_empty(value),
        UnaryTest::Null => value.is_null(),
        UnaryTest::NotNull => !value.is_null(),
        UnaryTest::PropertyAvailable | UnaryTest::PropertyNotAvailable => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(CompareOp::Equal, Value::Int(5), "5", true ; "equal int")]
    #[test_case(CompareOp::GreaterEqual, Value::Int(5), "5", true ; "greater equal int")]
    #[test_case(CompareOp::GreaterThan, Value::Int(5), "5", false ; "greater than int")]
    #[test_case(CompareOp::LessThan, Value::Int(4), "5", true ; "less than int")]
    #[test_case(CompareOp::GreaterThan, Value::Float(5.5), "5", true ; "float against int literal")]
    #[test_case(CompareOp::Equal, Value::from("abc"), "abc", true ; "equal text")]
    #[test_case(CompareOp::LessThan, Value::from("abc"), "abd", true ; "text order")]
    #[test_case(CompareOp::NotEqual, Value::Int(5), "6", true ; "not equal")]
    #[test_case(CompareOp::Equal, Value::Bool(true), "true", true ; "bool literal")]
    #[test_case(CompareOp::LessThan, Value::Int(10), "9x", true ; "unconvertible literal compares as text")]
    fn test_compare_with_literal(op: CompareOp, value: Value, literal: &str, expected: bool) {
        let ordering = compare_values(&value, &Value::from(literal));
        assert_eq!(is_satisfied(op, ordering), expected);
    }

    #[test_case(CompareOp::Equal, false ; "equal")]
    #[test_case(CompareOp::GreaterThan, false ; "greater than")]
    #[test_case(CompareOp::GreaterEqual, false ; "greater equal")]
    #[test_case(CompareOp::LessThan, false ; "less than")]
    #[test_case(CompareOp::LessEqual, false ; "less equal")]
    #[test_case(CompareOp::NotEqual, true ; "not equal is the negation of equal")]
    fn test_null_is_not_comparable(op: CompareOp, expected: bool) {
        let ordering = compare_values(&Value::Null, &Value::from("5"));
        assert_eq!(ordering, None);
        assert_eq!(is_satisfied(op, ordering), expected);
    }

    #[test]
    fn test_null_equals_null() {
        assert_eq!(compare_values(&Value::Null, &Value::Null), Some(Ordering::Equal));
    }

    #[test]
    fn test_is_empty() {
        assert!(is_empty(&Value::Null));
        assert!(is_empty(&Value::from("")));
        assert!(is_empty(&Value::List(vec![])));
        assert!(!is_empty(&Value::from(" ")));
        assert!(!is_empty(&Value::Int(0)));
    }
}
