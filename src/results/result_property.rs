//! One mapped result property: where its value comes from and how it is
//! converted.

use std::sync::{Arc, OnceLock};

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::all_consuming,
    multi::separated_list1,
    sequence::{delimited, separated_pair},
    IResult, Parser,
};
use serde::{Deserialize, Serialize};

use crate::driver::RowCursor;
use crate::parameters::Registries;
use crate::type_handlers::TypeHandler;
use crate::types::{PropertyAccessor, ResolutionError, TypeKind};
use crate::value::Value;

/// Result property as written in a result map definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPropertyDef {
    pub property: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub column_index: Option<usize>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub db_type: Option<String>,
    #[serde(default)]
    pub null_value: Option<String>,
    #[serde(default)]
    pub handler: Option<String>,
    /// Nested result map filling this property from the same row.
    #[serde(default)]
    pub result_map: Option<String>,
    /// Statement run with the row's key to fill this property.
    #[serde(default)]
    pub select: Option<String>,
    #[serde(default)]
    pub lazy: bool,
    /// Treat the property as a list when the owning class does not declare it.
    #[serde(default)]
    pub collection: bool,
}

impl ResultPropertyDef {
    pub fn new(property: impl Into<String>) -> Self {
        ResultPropertyDef {
            property: property.into(),
            ..Default::default()
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn column_index(mut self, index: usize) -> Self {
        self.column_index = Some(index);
        self
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn null_value(mut self, null_value: impl Into<String>) -> Self {
        self.null_value = Some(null_value.into());
        self
    }

    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn result_map(mut self, result_map: impl Into<String>) -> Self {
        self.result_map = Some(result_map.into());
        self
    }

    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn collection(mut self) -> Self {
        self.collection = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Name(String),
    Index(usize),
}

impl ColumnRef {
    /// Position of this column in the current result set.
    pub fn locate(&self, row: &dyn RowCursor) -> Option<usize> {
        match self {
            ColumnRef::Name(name) => row.column_index(name),
            ColumnRef::Index(i) => (*i < row.column_count()).then_some(*i),
        }
    }

    pub fn label(&self) -> String {
        match self {
            ColumnRef::Name(name) => name.clone(),
            ColumnRef::Index(i) => format!("#{}", i),
        }
    }
}

/// Parameter a sub-select is run with: one column's value, or a map built
/// from `prop=column` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    Single(String),
    Composite(Vec<(String, String)>),
}

fn key_name(input: &str) -> IResult<&str, &str> {
    delimited(
        multispace0,
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.'),
        multispace0,
    )
    .parse(input)
}

fn composite_key(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    all_consuming(separated_list1(
        char(','),
        separated_pair(key_name, char('='), key_name),
    ))
    .parse(input)
}

impl KeySpec {
    pub fn parse(text: &str) -> Option<KeySpec> {
        let text = text.trim();
        if !text.contains('=') {
            return (!text.is_empty()).then(|| KeySpec::Single(text.to_string()));
        }
        let (_, pairs) = composite_key(text).ok()?;
        Some(KeySpec::Composite(
            pairs
                .into_iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
        ))
    }
}

/// Sub-select settings of a property. The key text is parsed on first use.
#[derive(Debug)]
pub struct SubSelect {
    statement: String,
    lazy: bool,
    key_text: String,
    key: OnceLock<Option<KeySpec>>,
}

impl SubSelect {
    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn key_text(&self) -> &str {
        &self.key_text
    }

    /// `None` when the key text is malformed.
    pub fn key(&self) -> Option<&KeySpec> {
        self.key.get_or_init(|| KeySpec::parse(&self.key_text)).as_ref()
    }
}

/// How a property gets its value for each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyStrategy {
    /// Converted column value.
    Plain,
    /// Object built by a nested result map from the same row.
    NestedMap,
    /// Nested result map appending to a collection, one element per distinct
    /// group key.
    GroupBy,
    /// Value produced by another statement.
    SubSelect,
}

#[derive(Debug)]
pub struct ResultProperty {
    accessor: PropertyAccessor,
    column: Option<ColumnRef>,
    handler: Arc<dyn TypeHandler>,
    null_value: Option<Value>,
    nested_map: Option<String>,
    select: Option<SubSelect>,
    collection: bool,
}

impl ResultProperty {
    /// Resolves `def` against instances of `owner`.
    pub fn resolve(
        def: &ResultPropertyDef,
        owner: &TypeKind,
        registries: Registries<'_>,
    ) -> Result<Self, ResolutionError> {
        let property = def.property.trim();
        let accessor = registries.types.accessor(Some(owner), property)?;

        let column = match (def.column_index, &def.column) {
            (Some(i), _) => Some(ColumnRef::Index(i)),
            (None, Some(c)) if !c.trim().is_empty() => Some(ColumnRef::Name(c.trim().to_string())),
            _ if def.result_map.is_some() => None,
            _ => Some(ColumnRef::Name(property.to_string())),
        };

        let handler = if let Some(name) = &def.handler {
            registries.handlers.named(name)?
        } else if let Some(type_name) = &def.type_name {
            let kind = registries.types.resolve(type_name)?;
            registries.handlers.handler(kind.scalar(), def.db_type.as_deref())
        } else {
            registries
                .handlers
                .for_property_type(accessor.member_type(), def.db_type.as_deref())
        };

        let null_value = match &def.null_value {
            Some(text) => Some(handler.value_of(text).map_err(|e| {
                ResolutionError::InvalidAttribute {
                    property: property.to_string(),
                    attribute: "nullValue",
                    value: format!("{} ({})", text, e),
                }
            })?),
            None => None,
        };

        let select = def.select.as_ref().map(|statement| SubSelect {
            statement: statement.clone(),
            lazy: def.lazy,
            key_text: def.column.clone().unwrap_or_else(|| property.to_string()),
            key: OnceLock::new(),
        });

        Ok(ResultProperty {
            collection: def.collection || accessor.is_collection(),
            accessor,
            column,
            handler,
            null_value,
            nested_map: def.result_map.clone(),
            select,
        })
    }

    pub fn property_name(&self) -> &str {
        self.accessor.name()
    }

    pub fn accessor(&self) -> &PropertyAccessor {
        &self.accessor
    }

    pub fn column(&self) -> Option<&ColumnRef> {
        self.column.as_ref()
    }

    pub fn handler(&self) -> &Arc<dyn TypeHandler> {
        &self.handler
    }

    pub fn null_value(&self) -> Option<&Value> {
        self.null_value.as_ref()
    }

    pub fn nested_map(&self) -> Option<&str> {
        self.nested_map.as_deref()
    }

    pub fn sub_select(&self) -> Option<&SubSelect> {
        self.select.as_ref()
    }

    pub fn is_collection(&self) -> bool {
        self.collection
    }

    pub fn strategy(&self) -> PropertyStrategy {
        match (&self.select, &self.nested_map) {
            (Some(_), _) => PropertyStrategy::SubSelect,
            (None, Some(_)) if self.collection => PropertyStrategy::GroupBy,
            (None, Some(_)) => PropertyStrategy::NestedMap,
            (None, None) => PropertyStrategy::Plain,
        }
    }
}
