//! SQL templates: definitions, the compiled tag tree and its expansion.
//!
//! A statement body is a list of [`Fragment`]s: literal SQL text with inline
//! `#param#` tokens and `$name$` substitutions, and tags (`dynamic`, the
//! conditionals, `iterate`) with their own children. [`TemplateBuilder`]
//! compiles the fragments once into a [`TemplateTree`]; every execution
//! expands the tree against a parameter object into SQL text plus the ordered
//! parameter list.

pub mod builder;
mod conditional;
pub mod errors;
mod expander;
mod iterate;
pub mod substitution;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::parameters::{ParameterProperty, Registries};
use crate::types::TypeKind;
use crate::value::{PropertyPath, Value};

pub use builder::TemplateBuilder;
pub use errors::{SubstitutionError, TemplateError};

/// Tag names as they appear in mapping definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TagName {
    Dynamic,
    IsEqual,
    IsNotEqual,
    IsGreaterThan,
    IsGreaterEqual,
    IsLessThan,
    IsLessEqual,
    IsEmpty,
    IsNotEmpty,
    IsNull,
    IsNotNull,
    IsParameterPresent,
    IsNotParameterPresent,
    IsPropertyAvailable,
    IsNotPropertyAvailable,
    Iterate,
}

impl TagName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagName::Dynamic => "dynamic",
            TagName::IsEqual => "isEqual",
            TagName::IsNotEqual => "isNotEqual",
            TagName::IsGreaterThan => "isGreaterThan",
            TagName::IsGreaterEqual => "isGreaterEqual",
            TagName::IsLessThan => "isLessThan",
            TagName::IsLessEqual => "isLessEqual",
            TagName::IsEmpty => "isEmpty",
            TagName::IsNotEmpty => "isNotEmpty",
            TagName::IsNull => "isNull",
            TagName::IsNotNull => "isNotNull",
            TagName::IsParameterPresent => "isParameterPresent",
            TagName::IsNotParameterPresent => "isNotParameterPresent",
            TagName::IsPropertyAvailable => "isPropertyAvailable",
            TagName::IsNotPropertyAvailable => "isNotPropertyAvailable",
            TagName::Iterate => "iterate",
        }
    }
}

/// One piece of a statement body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Fragment {
    Text(String),
    Tag(TagDef),
}

impl From<&str> for Fragment {
    fn from(text: &str) -> Self {
        Fragment::Text(text.to_string())
    }
}

impl From<String> for Fragment {
    fn from(text: String) -> Self {
        Fragment::Text(text)
    }
}

impl From<TagDef> for Fragment {
    fn from(tag: TagDef) -> Self {
        Fragment::Tag(tag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDef {
    pub name: TagName,
    #[serde(default)]
    pub prepend: Option<String>,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub compare_property: Option<String>,
    #[serde(default)]
    pub compare_value: Option<String>,
    #[serde(default)]
    pub open: Option<String>,
    #[serde(default)]
    pub close: Option<String>,
    #[serde(default)]
    pub conjunction: Option<String>,
    #[serde(default)]
    pub children: Vec<Fragment>,
}

impl TagDef {
    pub fn new(name: TagName) -> Self {
        TagDef {
            name,
            prepend: None,
            property: None,
            compare_property: None,
            compare_value: None,
            open: None,
            close: None,
            conjunction: None,
            children: Vec::new(),
        }
    }

    pub fn dynamic() -> Self {
        Self::new(TagName::Dynamic)
    }

    pub fn iterate(property: &str) -> Self {
        Self::new(TagName::Iterate).property(property)
    }

    /// Conditional tag testing `property`.
    pub fn test(name: TagName, property: &str) -> Self {
        Self::new(name).property(property)
    }

    pub fn prepend(mut self, prepend: &str) -> Self {
        self.prepend = Some(prepend.to_string());
        self
    }

    pub fn property(mut self, property: &str) -> Self {
        self.property = Some(property.to_string());
        self
    }

    pub fn compare_property(mut self, property: &str) -> Self {
        self.compare_property = Some(property.to_string());
        self
    }

    pub fn compare_value(mut self, value: &str) -> Self {
        self.compare_value = Some(value.to_string());
        self
    }

    pub fn open(mut self, open: &str) -> Self {
        self.open = Some(open.to_string());
        self
    }

    pub fn close(mut self, close: &str) -> Self {
        self.close = Some(close.to_string());
        self
    }

    pub fn conjunction(mut self, conjunction: &str) -> Self {
        self.conjunction = Some(conjunction.to_string());
        self
    }

    pub fn child(mut self, child: impl Into<Fragment>) -> Self {
        self.children.push(child.into());
        self
    }
}

/// Result of expanding a template.
#[derive(Debug, Clone)]
pub struct Expanded {
    pub sql: String,
    pub parameters: Vec<Arc<ParameterProperty>>,
}

impl Expanded {
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.property_name()).collect()
    }
}

pub(crate) type NodeId = usize;

/// Property attribute of a tag. Paths containing `[]` are resolved against
/// the enclosing iterations at expansion time.
#[derive(Debug, Clone)]
pub(crate) struct TagProperty {
    raw: String,
    path: Option<PropertyPath>,
}

impl TagProperty {
    pub(crate) fn raw(&self) -> &str {
        &self.raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
}

#[derive(Debug, Clone)]
pub(crate) enum CompareTarget {
    Property(TagProperty),
    Literal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryTest {
    Empty,
    NotEmpty,
    Null,
    NotNull,
    PropertyAvailable,
    PropertyNotAvailable,
}

#[derive(Debug, Clone)]
pub(crate) enum TagKind {
    Dynamic,
    Compare {
        op: CompareOp,
        property: Option<TagProperty>,
        target: CompareTarget,
    },
    Unary {
        test: UnaryTest,
        property: Option<TagProperty>,
    },
    ParameterPresent {
        present: bool,
    },
    Iterate {
        property: Option<TagProperty>,
        open: Option<String>,
        close: Option<String>,
        conjunction: Option<String>,
        /// Outermost iterate: parses inline parameters of its rendered body.
        post_parse: bool,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct TagNode {
    name: TagName,
    kind: TagKind,
    /// Non-empty prepend text.
    prepend: Option<String>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub(crate) enum TextNode {
    Whitespace(String),
    /// Inline parameters already replaced and resolved.
    Compiled {
        sql: String,
        parameters: Vec<Arc<ParameterProperty>>,
    },
    /// Contains `$name$`; substituted and parsed per execution.
    Substituted(String),
    /// Inside an iterate; parsed by the outermost iterate after `[]` rewriting.
    Raw(String),
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Text(TextNode),
    Tag(TagNode),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    parent: Option<NodeId>,
    kind: NodeKind,
}

/// Compiled statement body. Node identity is the index in `nodes`.
#[derive(Debug, Clone)]
pub struct TemplateTree {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    parameter_class: Option<TypeKind>,
    inline_parameters: bool,
    dynamic: bool,
}

impl TemplateTree {
    /// True when the body has tags; plain bodies expand to their text as is.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn parameter_class(&self) -> Option<&TypeKind> {
        self.parameter_class.as_ref()
    }

    pub fn expand(
        &self,
        parameter: &Value,
        registries: Registries<'_>,
    ) -> Result<Expanded, TemplateError> {
        expander::expand(self, parameter, registries)
    }
}

#[cfg(test)]
mod tests;
