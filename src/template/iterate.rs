//! Iteration state and `[]` index rewriting.

/// Position of one iterate activation over its collection.
#[derive(Debug, Clone)]
pub(crate) struct IterateCursor {
    /// Collection path with enclosing indexes filled in (`orders[1].lines`).
    pub(crate) resolved_property: String,
    len: usize,
    index: Option<usize>,
}

impl IterateCursor {
    pub(crate) fn new(resolved_property: String, len: usize) -> Self {
        IterateCursor {
            resolved_property,
            len,
            index: None,
        }
    }

    /// Moves to the next element; false once the collection is exhausted.
    pub(crate) fn advance(&mut self) -> bool {
        let next = self.index.map_or(0, |i| i + 1);
        self.index = Some(next);
        next < self.len
    }

    pub(crate) fn index(&self) -> usize {
        self.index.unwrap_or(0)
    }

    pub(crate) fn is_first(&self) -> bool {
        self.index == Some(0)
    }

    pub(crate) fn is_last(&self) -> bool {
        self.index.is_some_and(|i| i + 1 >= self.len)
    }
}

/// Replaces `property[]` by `property[index]` wherever `property` is not the
/// tail of a longer name.
pub(crate) fn rewrite_index(body: &str, property: &str, index: usize) -> String {
    let pattern = format!("{}[]", property);
    let replacement = format!("{}[{}]", property, index);
    let mut result = String::with_capacity(body.len() + 4);
    let mut rest = body;
    while let Some(pos) = rest.find(&pattern) {
        result.push_str(&rest[..pos]);
        let before = result.chars().next_back();
        let longer_name = if property.is_empty() {
            before.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == ']')
        } else {
            before.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.')
        };
        result.push_str(if longer_name { &pattern } else { &replacement });
        rest = &rest[pos + pattern.len()..];
    }
    result.push_str(rest);
    result
}

/// Substitutes an enclosing iteration into `raw` when `raw` starts with that
/// iteration's `property[]`.
pub(crate) fn resolve_against(raw: &str, iterate_property: &str, cursor: &IterateCursor) -> Option<String> {
    let prefix = format!("{}[]", iterate_property);
    raw.strip_prefix(&prefix).map(|rest| {
        format!("{}[{}]{}", cursor.resolved_property, cursor.index(), rest)
    })
}
