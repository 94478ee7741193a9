//! Mapped statements: definition, compiled form and driver binding.

pub mod errors;
pub mod preparer;
pub mod procedure;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::CacheModel;
use crate::parameters::{ParameterMap, Registries};
use crate::results::{AutoResultMap, ResultMap, ResultTarget};
use crate::template::{Expanded, Fragment, TemplateError, TemplateTree};
use crate::types::{PropertyAccessor, TypeKind};
use crate::value::Value;

pub use errors::BindingError;
pub use preparer::{BoundParameter, PreparedStatement, StatementPreparer};
pub use procedure::ProcedureCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// Any SQL; rows are read when the caller queries it.
    #[default]
    Statement,
    Procedure,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Statement => "statement",
            StatementKind::Procedure => "procedure",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When the key statement of an insert runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectKeyType {
    /// Before the insert; the key is bound as a parameter of the insert.
    Pre,
    #[default]
    Post,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectKeyDef {
    pub property: String,
    #[serde(default)]
    pub result_class: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: SelectKeyType,
    pub body: Vec<Fragment>,
}

impl SelectKeyDef {
    pub fn new(property: impl Into<String>, sql: &str, kind: SelectKeyType) -> Self {
        SelectKeyDef {
            property: property.into(),
            result_class: None,
            kind,
            body: vec![Fragment::from(sql)],
        }
    }

    pub fn result_class(mut self, class: impl Into<String>) -> Self {
        self.result_class = Some(class.into());
        self
    }
}

/// Statement as written in a mapping definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementDef {
    pub id: String,
    #[serde(default)]
    pub kind: StatementKind,
    pub body: Vec<Fragment>,
    #[serde(default)]
    pub parameter_map: Option<String>,
    #[serde(default)]
    pub parameter_class: Option<String>,
    /// One result map per result set.
    #[serde(default)]
    pub result_maps: Vec<String>,
    #[serde(default)]
    pub result_class: Option<String>,
    #[serde(default)]
    pub cache_model: Option<String>,
    /// Rediscover the auto mapping on every execution.
    #[serde(default)]
    pub remap_results: bool,
    #[serde(default)]
    pub select_key: Option<SelectKeyDef>,
}

impl StatementDef {
    pub fn new(id: impl Into<String>, kind: StatementKind) -> Self {
        StatementDef {
            id: id.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn select(id: impl Into<String>, sql: &str) -> Self {
        Self::new(id, StatementKind::Select).text(sql)
    }

    pub fn text(mut self, sql: &str) -> Self {
        self.body.push(Fragment::from(sql));
        self
    }

    pub fn fragment(mut self, fragment: impl Into<Fragment>) -> Self {
        self.body.push(fragment.into());
        self
    }

    pub fn parameter_map(mut self, id: impl Into<String>) -> Self {
        self.parameter_map = Some(id.into());
        self
    }

    pub fn parameter_class(mut self, class: impl Into<String>) -> Self {
        self.parameter_class = Some(class.into());
        self
    }

    pub fn result_map(mut self, id: impl Into<String>) -> Self {
        self.result_maps.push(id.into());
        self
    }

    pub fn result_class(mut self, class: impl Into<String>) -> Self {
        self.result_class = Some(class.into());
        self
    }

    pub fn cache_model(mut self, id: impl Into<String>) -> Self {
        self.cache_model = Some(id.into());
        self
    }

    pub fn remap_results(mut self) -> Self {
        self.remap_results = true;
        self
    }

    pub fn select_key(mut self, select_key: SelectKeyDef) -> Self {
        self.select_key = Some(select_key);
        self
    }
}

#[derive(Debug)]
pub struct SelectKey {
    pub(crate) accessor: PropertyAccessor,
    pub(crate) kind: SelectKeyType,
    pub(crate) result_class: Option<TypeKind>,
    pub(crate) template: TemplateTree,
}

impl SelectKey {
    pub fn property(&self) -> &str {
        self.accessor.name()
    }

    pub fn kind(&self) -> SelectKeyType {
        self.kind
    }
}

/// Compiled statement. Shared read-only by every execution.
pub struct MappedStatement {
    pub(crate) id: String,
    pub(crate) kind: StatementKind,
    pub(crate) template: TemplateTree,
    pub(crate) parameter_map: Option<Arc<ParameterMap>>,
    pub(crate) result_maps: Vec<Arc<ResultMap>>,
    pub(crate) result_class: Option<TypeKind>,
    pub(crate) auto_map: Option<AutoResultMap>,
    pub(crate) remap_results: bool,
    pub(crate) cache_model: Option<Arc<CacheModel>>,
    pub(crate) select_key: Option<SelectKey>,
}

impl MappedStatement {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn template(&self) -> &TemplateTree {
        &self.template
    }

    pub fn parameter_map(&self) -> Option<&Arc<ParameterMap>> {
        self.parameter_map.as_ref()
    }

    pub fn result_maps(&self) -> &[Arc<ResultMap>] {
        &self.result_maps
    }

    pub fn result_class(&self) -> Option<&TypeKind> {
        self.result_class.as_ref()
    }

    pub fn cache_model(&self) -> Option<&Arc<CacheModel>> {
        self.cache_model.as_ref()
    }

    pub fn select_key(&self) -> Option<&SelectKey> {
        self.select_key.as_ref()
    }

    /// Result sets read per execution: one per result map, at least one.
    pub fn result_set_count(&self) -> usize {
        self.result_maps.len().max(1)
    }

    /// SQL text and parameters for `parameter`. An explicit parameter map
    /// supplies the parameter list in map order.
    pub fn expand(
        &self,
        parameter: &Value,
        registries: Registries<'_>,
    ) -> Result<Expanded, TemplateError> {
        let mut expanded = self.template.expand(parameter, registries)?;
        if let Some(map) = &self.parameter_map {
            expanded.parameters = map.properties().to_vec();
        }
        Ok(expanded)
    }

    /// Target of result set `index`. `auto` overrides the shared auto map
    /// for statements that remap per execution.
    pub fn result_target<'a>(
        &'a self,
        index: usize,
        auto: Option<&'a AutoResultMap>,
    ) -> ResultTarget<'a> {
        if let Some(map) = self.result_maps.get(index) {
            return ResultTarget::ResultMap(map.clone());
        }
        ResultTarget::for_class(self.result_class.as_ref(), auto.or(self.auto_map.as_ref()))
    }

    /// Fresh auto map for statements that rediscover columns per execution.
    pub fn private_auto_map(&self) -> Option<AutoResultMap> {
        match (&self.result_class, self.remap_results) {
            (Some(class @ TypeKind::Class(_)), true) => Some(AutoResultMap::new(class.clone())),
            _ => None,
        }
    }
}

impl fmt::Debug for MappedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedStatement")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("dynamic", &self.template.is_dynamic())
            .field(
                "result_maps",
                &self.result_maps.iter().map(|m| m.id()).collect::<Vec<_>>(),
            )
            .field("cache_model", &self.cache_model.as_ref().map(|c| c.id()))
            .finish()
    }
}
