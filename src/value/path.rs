//! Dotted property paths (`order.lines[2].sku`, `ids[]`), parsed once with nom.

use std::borrow::Cow;

use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, recognize},
    multi::{many0, separated_list1},
    sequence::{delimited, pair},
    IResult, Parser,
};

use super::{PropertyError, Value, NULL};

/// List index inside a path segment. `Pending` is the `[]` form used inside
/// iterate bodies before the current index is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    At(usize),
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Empty for a leading bare index (`[0]` against a list parameter).
    pub name: String,
    pub indexes: Vec<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    raw: String,
    segments: Vec<Segment>,
}

fn property_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

fn index(input: &str) -> IResult<&str, Index> {
    map(
        delimited(
            char('['),
            opt(map_res(digit1, str::parse::<usize>)),
            char(']'),
        ),
        |i| i.map_or(Index::Pending, Index::At),
    )
    .parse(input)
}

fn segment(input: &str) -> IResult<&str, Segment> {
    map(pair(opt(property_name), many0(index)), |(name, indexes)| {
        Segment {
            name: name.unwrap_or_default().to_string(),
            indexes,
        }
    })
    .parse(input)
}

fn segments(input: &str) -> IResult<&str, Vec<Segment>> {
    all_consuming(separated_list1(char('.'), segment)).parse(input)
}

impl PropertyPath {
    pub fn parse(raw: &str) -> Result<Self, PropertyError> {
        let invalid = || PropertyError::InvalidPath(raw.to_string());
        let (_, segments) = segments(raw.trim()).map_err(|_| invalid())?;
        for (i, seg) in segments.iter().enumerate() {
            if seg.name.is_empty() && (i > 0 || seg.indexes.is_empty()) {
                return Err(invalid());
            }
        }
        Ok(PropertyPath {
            raw: raw.trim().to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Single name, no dots or indexes.
    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1 && self.segments[0].indexes.is_empty()
    }

    pub fn has_pending_index(&self) -> bool {
        self.segments
            .iter()
            .any(|s| s.indexes.contains(&Index::Pending))
    }

    pub fn root_name(&self) -> &str {
        &self.segments[0].name
    }

    /// Reads the value at this path. Null intermediates read as null; lazy
    /// stand-ins along the way are loaded.
    pub fn get(&self, root: &Value) -> Result<Value, PropertyError> {
        get_in(root, &self.segments, &self.raw)
    }

    /// Whether the last segment names a property the owner actually has
    /// (declared on a closed object, present as a key on a map or open object).
    pub fn is_readable(&self, root: &Value) -> bool {
        let Some((last, parents)) = self.segments.split_last() else {
            return false;
        };
        let owner = match get_in(root, parents, &self.raw) {
            Ok(owner) => owner,
            Err(_) => return false,
        };
        match owner {
            Value::Map(map) => map.contains_key(&last.name),
            Value::Object(obj) => obj.has_property(&last.name),
            _ => false,
        }
    }

    /// Writes `value` at this path, creating missing intermediates as maps.
    pub fn set(&self, root: &mut Value, value: Value) -> Result<(), PropertyError> {
        self.modify(root, &|_| Value::Map(Default::default()), |slot| {
            *slot = value
        })
    }

    /// Runs `f` against the slot at this path. `create(depth)` supplies the
    /// container for a null intermediate owning segment `depth`.
    pub fn modify<R>(
        &self,
        root: &mut Value,
        create: &dyn Fn(usize) -> Value,
        f: impl FnOnce(&mut Value) -> R,
    ) -> Result<R, PropertyError> {
        let ctx = ModifyCtx {
            create,
            path: &self.raw,
        };
        modify_in(root, &self.segments, 0, &ctx, f)
    }
}

impl std::fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn lookup<'v>(value: &'v Value, name: &str, path: &str) -> Result<Cow<'v, Value>, PropertyError> {
    if name.is_empty() {
        return Ok(Cow::Borrowed(value));
    }
    match value {
        Value::Map(map) => Ok(Cow::Borrowed(map.get(name).unwrap_or(&NULL))),
        Value::Object(obj) => Ok(Cow::Owned(obj.get(name)?)),
        Value::Null => Ok(Cow::Borrowed(&NULL)),
        Value::Lazy(lazy) => {
            let loaded = lazy.resolve()?;
            Ok(Cow::Owned(lookup(&loaded, name, path)?.into_owned()))
        }
        other => Err(PropertyError::NotAnObject {
            property: path.to_string(),
            kind: other.kind_name(),
        }),
    }
}

fn element<'v>(value: &'v Value, index: Index, path: &str) -> Result<Cow<'v, Value>, PropertyError> {
    let Index::At(i) = index else {
        return Err(PropertyError::UnresolvedIndex(path.to_string()));
    };
    match value {
        Value::List(items) => items.get(i).map(Cow::Borrowed).ok_or_else(|| {
            PropertyError::IndexOutOfBounds {
                property: path.to_string(),
                index: i,
                len: items.len(),
            }
        }),
        Value::Null => Ok(Cow::Borrowed(&NULL)),
        Value::Lazy(lazy) => {
            let loaded = lazy.resolve()?;
            Ok(Cow::Owned(element(&loaded, index, path)?.into_owned()))
        }
        other => Err(PropertyError::NotAList {
            property: path.to_string(),
            kind: other.kind_name(),
        }),
    }
}

fn get_in(value: &Value, segments: &[Segment], path: &str) -> Result<Value, PropertyError> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(value.clone().resolved()?);
    };
    let field = lookup(value, &segment.name, path)?;
    indexed(&field, &segment.indexes, rest, path)
}

fn indexed(value: &Value, indexes: &[Index], rest: &[Segment], path: &str) -> Result<Value, PropertyError> {
    match indexes.split_first() {
        Some((first, more)) => {
            let item = element(value, *first, path)?;
            indexed(&item, more, rest, path)
        }
        None => get_in(value, rest, path),
    }
}

struct ModifyCtx<'a> {
    create: &'a dyn Fn(usize) -> Value,
    path: &'a str,
}

fn modify_in<R>(
    value: &mut Value,
    segments: &[Segment],
    depth: usize,
    ctx: &ModifyCtx<'_>,
    f: impl FnOnce(&mut Value) -> R,
) -> Result<R, PropertyError> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(f(value));
    };
    if segment.name.is_empty() {
        return modify_indexed(value, &segment.indexes, rest, depth, ctx, f);
    }
    if let Value::Lazy(lazy) = value {
        let loaded = lazy.resolve()?;
        *value = loaded;
    }
    if value.is_null() && depth > 0 {
        *value = (ctx.create)(depth);
    }
    match value {
        Value::Object(obj) => {
            let obj = obj.clone();
            obj.modify(&segment.name, |field| {
                modify_indexed(field, &segment.indexes, rest, depth, ctx, f)
            })?
        }
        Value::Map(map) => {
            let field = map.entry(segment.name.clone()).or_insert(Value::Null);
            modify_indexed(field, &segment.indexes, rest, depth, ctx, f)
        }
        other => Err(PropertyError::NotAnObject {
            property: ctx.path.to_string(),
            kind: other.kind_name(),
        }),
    }
}

fn modify_indexed<R>(
    field: &mut Value,
    indexes: &[Index],
    rest: &[Segment],
    depth: usize,
    ctx: &ModifyCtx<'_>,
    f: impl FnOnce(&mut Value) -> R,
) -> Result<R, PropertyError> {
    let mut target = field;
    for index in indexes {
        let Index::At(i) = *index else {
            return Err(PropertyError::UnresolvedIndex(ctx.path.to_string()));
        };
        let kind = target.kind_name();
        let items = match target {
            Value::List(items) => items,
            _ => {
                return Err(PropertyError::NotAList {
                    property: ctx.path.to_string(),
                    kind,
                })
            }
        };
        let len = items.len();
        target = items
            .get_mut(i)
            .ok_or_else(|| PropertyError::IndexOutOfBounds {
                property: ctx.path.to_string(),
                index: i,
                len,
            })?;
    }
    if !rest.is_empty() && target.is_null() {
        *target = (ctx.create)(depth + 1);
    }
    modify_in(target, rest, depth + 1, ctx, f)
}
