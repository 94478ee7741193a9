use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ParameterProperty, ParameterPropertyDef};
use crate::types::TypeKind;

/// Parameter map as written in a mapping definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterMapDef {
    pub id: String,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterPropertyDef>,
}

impl ParameterMapDef {
    pub fn new(id: impl Into<String>) -> Self {
        ParameterMapDef {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.extends = Some(base.into());
        self
    }

    pub fn parameter(mut self, parameter: ParameterPropertyDef) -> Self {
        self.parameters.push(parameter);
        self
    }
}

/// Ordered parameter list plus a by-name index.
///
/// Re-adding a property name replaces the index entry but keeps the earlier
/// positional entry: positional drivers bind by list order.
#[derive(Debug, Clone)]
pub struct ParameterMap {
    id: String,
    class: Option<TypeKind>,
    properties: Vec<Arc<ParameterProperty>>,
    index: HashMap<String, Arc<ParameterProperty>>,
}

impl ParameterMap {
    pub fn new(id: impl Into<String>, class: Option<TypeKind>) -> Self {
        ParameterMap {
            id: id.into(),
            class,
            properties: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn class(&self) -> Option<&TypeKind> {
        self.class.as_ref()
    }

    pub fn add_property(&mut self, property: ParameterProperty) -> Arc<ParameterProperty> {
        let property = Arc::new(property);
        self.index
            .insert(property.property_name().to_string(), property.clone());
        self.properties.push(property.clone());
        property
    }

    pub fn get_property(&self, name: &str) -> Option<&Arc<ParameterProperty>> {
        self.index.get(name)
    }

    pub fn properties(&self) -> &[Arc<ParameterProperty>] {
        &self.properties
    }

    pub fn property_names(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.property_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Number of distinct property names.
    pub fn distinct_len(&self) -> usize {
        self.index.len()
    }

    /// Inherits the entries of `base` this map does not override; inherited
    /// entries come first, in the base's order.
    pub fn extend_from(&mut self, base: &ParameterMap) {
        let inherited: Vec<Arc<ParameterProperty>> = base
            .properties
            .iter()
            .filter(|p| !self.index.contains_key(p.property_name()))
            .cloned()
            .collect();
        for property in &inherited {
            self.index
                .insert(property.property_name().to_string(), property.clone());
        }
        let own = std::mem::take(&mut self.properties);
        self.properties = inherited.into_iter().chain(own).collect();
        if self.class.is_none() {
            self.class = base.class.clone();
        }
    }
}
