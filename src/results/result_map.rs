//! Result maps: ordered property mappings, constructor arguments, group-by
//! keys and discriminators.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::result_property::{ColumnRef, PropertyStrategy, ResultProperty, ResultPropertyDef};
use crate::driver::{DriverError, RowCursor};
use crate::parameters::Registries;
use crate::type_handlers::{ConversionError, TypeHandler};
use crate::types::{InstanceFactory, ResolutionError, TypeKind};

/// Computes a discriminator value from the current row.
pub type DiscriminatorFormula =
    Arc<dyn Fn(&dyn RowCursor) -> Result<Option<String>, DriverError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubMapDef {
    pub value: String,
    pub result_map: String,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscriminatorDef {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub db_type: Option<String>,
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub cases: Vec<SubMapDef>,
    /// Takes precedence over `column` when set.
    #[serde(skip)]
    pub formula: Option<DiscriminatorFormula>,
}

impl DiscriminatorDef {
    pub fn column(column: impl Into<String>) -> Self {
        DiscriminatorDef {
            column: Some(column.into()),
            ..Default::default()
        }
    }

    pub fn formula(
        formula: impl Fn(&dyn RowCursor) -> Result<Option<String>, DriverError> + Send + Sync + 'static,
    ) -> Self {
        DiscriminatorDef {
            formula: Some(Arc::new(formula)),
            ..Default::default()
        }
    }

    pub fn case(mut self, value: impl Into<String>, result_map: impl Into<String>) -> Self {
        self.cases.push(SubMapDef {
            value: value.into(),
            result_map: result_map.into(),
        });
        self
    }
}

impl fmt::Debug for DiscriminatorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscriminatorDef")
            .field("column", &self.column)
            .field("type_name", &self.type_name)
            .field("cases", &self.cases)
            .field("formula", &self.formula.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMapDef {
    pub id: String,
    pub class: String,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub constructor: Vec<ResultPropertyDef>,
    #[serde(default)]
    pub results: Vec<ResultPropertyDef>,
    #[serde(default)]
    pub discriminator: Option<DiscriminatorDef>,
}

impl ResultMapDef {
    pub fn new(id: impl Into<String>, class: impl Into<String>) -> Self {
        ResultMapDef {
            id: id.into(),
            class: class.into(),
            ..Default::default()
        }
    }

    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.extends = Some(base.into());
        self
    }

    pub fn group_by(mut self, property: impl Into<String>) -> Self {
        self.group_by.push(property.into());
        self
    }

    pub fn argument(mut self, argument: ResultPropertyDef) -> Self {
        self.constructor.push(argument);
        self
    }

    pub fn result(mut self, result: ResultPropertyDef) -> Self {
        self.results.push(result);
        self
    }

    pub fn discriminator(mut self, discriminator: DiscriminatorDef) -> Self {
        self.discriminator = Some(discriminator);
        self
    }

    /// Copy of this definition with `base` inherited: base results not
    /// redefined here come first, then this map's own results. Constructor
    /// arguments and group-by properties are inherited when not declared.
    /// Discriminators are never inherited.
    pub fn merged_with(&self, base: &ResultMapDef) -> ResultMapDef {
        let own: HashSet<&str> = self.results.iter().map(|r| r.property.as_str()).collect();
        let mut results: Vec<ResultPropertyDef> = base
            .results
            .iter()
            .filter(|r| !own.contains(r.property.as_str()))
            .cloned()
            .collect();
        results.extend(self.results.iter().cloned());
        ResultMapDef {
            id: self.id.clone(),
            class: self.class.clone(),
            extends: None,
            group_by: if self.group_by.is_empty() {
                base.group_by.clone()
            } else {
                self.group_by.clone()
            },
            constructor: if self.constructor.is_empty() {
                base.constructor.clone()
            } else {
                self.constructor.clone()
            },
            results,
            discriminator: self.discriminator.clone(),
        }
    }
}

enum DiscriminatorSource {
    Column {
        column: ColumnRef,
        handler: Arc<dyn TypeHandler>,
    },
    Formula(DiscriminatorFormula),
}

/// Picks a narrower result map for a row.
pub struct Discriminator {
    source: DiscriminatorSource,
    cases: Vec<SubMapDef>,
}

/// Why a discriminator value could not be read.
#[derive(Debug)]
pub enum DiscriminatorError {
    MissingColumn(String),
    Conversion(String, ConversionError),
    Driver(DriverError),
}

impl Discriminator {
    /// Discriminator value of the current row, in string form.
    pub fn value(&self, row: &dyn RowCursor) -> Result<Option<String>, DiscriminatorError> {
        match &self.source {
            DiscriminatorSource::Column { column, handler } => {
                let index = column
                    .locate(row)
                    .ok_or_else(|| DiscriminatorError::MissingColumn(column.label()))?;
                let value = handler
                    .get_value(row, index)
                    .map_err(|e| DiscriminatorError::Conversion(column.label(), e))?;
                Ok((!value.is_null()).then(|| value.to_string()))
            }
            DiscriminatorSource::Formula(formula) => formula(row).map_err(DiscriminatorError::Driver),
        }
    }

    /// Result map id registered for `value`.
    pub fn sub_map(&self, value: &str) -> Option<&str> {
        let value = value.trim();
        self.cases
            .iter()
            .find(|c| c.value.trim() == value)
            .map(|c| c.result_map.as_str())
    }

    pub fn cases(&self) -> &[SubMapDef] {
        &self.cases
    }
}

impl fmt::Debug for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            DiscriminatorSource::Column { column, .. } => column.label(),
            DiscriminatorSource::Formula(_) => "<formula>".to_string(),
        };
        f.debug_struct("Discriminator")
            .field("source", &source)
            .field("cases", &self.cases)
            .finish()
    }
}

pub struct ResultMap {
    id: String,
    class: TypeKind,
    factory: InstanceFactory,
    arguments: Vec<ResultProperty>,
    properties: Vec<ResultProperty>,
    /// Indexes into `properties`.
    group_by: Vec<usize>,
    discriminator: Option<Discriminator>,
}

impl ResultMap {
    /// Compiles a definition whose `extends` has already been merged.
    pub fn build(def: &ResultMapDef, registries: Registries<'_>) -> Result<Self, ResolutionError> {
        let class = registries.types.resolve(&def.class)?;

        let mut arguments = Vec::with_capacity(def.constructor.len());
        for arg in &def.constructor {
            if arg.select.is_some() {
                return Err(ResolutionError::InvalidAttribute {
                    property: arg.property.clone(),
                    attribute: "select",
                    value: format!("constructor argument of result map '{}'", def.id),
                });
            }
            // Arguments are positional: resolve them against an open owner.
            arguments.push(ResultProperty::resolve(arg, &TypeKind::Map, registries)?);
        }
        let arg_names: Vec<String> = def.constructor.iter().map(|a| a.property.clone()).collect();
        let factory = registries.types.instance_factory(&class, &arg_names)?;

        let mut properties = Vec::with_capacity(def.results.len());
        for result in &def.results {
            properties.push(ResultProperty::resolve(result, &class, registries)?);
        }

        let mut group_by = Vec::with_capacity(def.group_by.len());
        for name in &def.group_by {
            let index = properties
                .iter()
                .position(|p| p.property_name() == name.trim())
                .ok_or_else(|| ResolutionError::UnknownProperty {
                    class: def.id.clone(),
                    property: name.clone(),
                })?;
            group_by.push(index);
        }

        let discriminator = match &def.discriminator {
            Some(d) => Some(Self::build_discriminator(def, d, registries)?),
            None => None,
        };

        Ok(ResultMap {
            id: def.id.clone(),
            class,
            factory,
            arguments,
            properties,
            group_by,
            discriminator,
        })
    }

    fn build_discriminator(
        def: &ResultMapDef,
        d: &DiscriminatorDef,
        registries: Registries<'_>,
    ) -> Result<Discriminator, ResolutionError> {
        let source = match (&d.formula, &d.column) {
            (Some(formula), _) => DiscriminatorSource::Formula(formula.clone()),
            (None, Some(column)) => {
                let handler = if let Some(name) = &d.handler {
                    registries.handlers.named(name)?
                } else if let Some(type_name) = &d.type_name {
                    let kind = registries.types.resolve(type_name)?;
                    registries.handlers.handler(kind.scalar(), d.db_type.as_deref())
                } else {
                    registries.handlers.unknown()
                };
                DiscriminatorSource::Column {
                    column: ColumnRef::Name(column.trim().to_string()),
                    handler,
                }
            }
            (None, None) => {
                return Err(ResolutionError::InvalidAttribute {
                    property: def.id.clone(),
                    attribute: "discriminator",
                    value: "needs a column or a formula".to_string(),
                })
            }
        };
        Ok(Discriminator {
            source,
            cases: d.cases.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn class(&self) -> &TypeKind {
        &self.class
    }

    pub fn factory(&self) -> &InstanceFactory {
        &self.factory
    }

    pub fn arguments(&self) -> &[ResultProperty] {
        &self.arguments
    }

    pub fn properties(&self) -> &[ResultProperty] {
        &self.properties
    }

    pub fn has_group_by(&self) -> bool {
        !self.group_by.is_empty()
    }

    pub fn group_by_properties(&self) -> impl Iterator<Item = &ResultProperty> {
        self.group_by.iter().map(|&i| &self.properties[i])
    }

    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    /// Result maps this map refers to: nested maps and discriminator cases.
    pub fn referenced_maps(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .arguments
            .iter()
            .chain(&self.properties)
            .filter_map(ResultProperty::nested_map)
            .collect();
        if let Some(d) = &self.discriminator {
            ids.extend(d.cases.iter().map(|c| c.result_map.as_str()));
        }
        ids
    }

    /// Statements run by sub-select properties.
    pub fn referenced_statements(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter_map(|p| p.sub_select().map(|s| s.statement()))
            .collect()
    }

    /// Properties filled by nested maps into collections.
    pub fn collection_properties(&self) -> impl Iterator<Item = &ResultProperty> {
        self.properties
            .iter()
            .filter(|p| p.strategy() == PropertyStrategy::GroupBy)
    }
}

impl fmt::Debug for ResultMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultMap")
            .field("id", &self.id)
            .field("class", &self.class.name())
            .field("arguments", &self.arguments.len())
            .field("properties", &self.properties.len())
            .field("group_by", &self.group_by)
            .field("discriminator", &self.discriminator)
            .finish()
    }
}
