//! Compiles [`Fragment`] definitions into a [`TemplateTree`].
//!
//! Everything that does not depend on a live parameter object is checked
//! here: inline parameter syntax (inside iterate bodies too), `$name$`
//! syntax, tag attributes and property names of typed parameter classes.

use std::sync::Arc;

use super::substitution::{check_substitutions, has_substitutions};
use super::{
    CompareOp, CompareTarget, Fragment, Node, NodeId, NodeKind, TagDef, TagKind, TagName,
    TagNode, TagProperty, TemplateError, TemplateTree, TextNode, UnaryTest,
};
use crate::parameters::{parse_inline_parameters, ParameterProperty, Registries};
use crate::types::TypeKind;
use crate::value::PropertyPath;

pub struct TemplateBuilder<'a> {
    registries: Registries<'a>,
    parameter_class: Option<TypeKind>,
    inline_parameters: bool,
    nodes: Vec<Node>,
}

impl<'a> TemplateBuilder<'a> {
    pub fn new(registries: Registries<'a>, parameter_class: Option<TypeKind>) -> Self {
        TemplateBuilder {
            registries,
            parameter_class,
            inline_parameters: true,
            nodes: Vec::new(),
        }
    }

    /// With an explicit parameter map, `#` in text is plain SQL and
    /// placeholders are written as `?`.
    pub fn without_inline_parameters(mut self) -> Self {
        self.inline_parameters = false;
        self
    }

    pub fn build(mut self, fragments: &[Fragment]) -> Result<TemplateTree, TemplateError> {
        let dynamic = fragments.iter().any(|f| matches!(f, Fragment::Tag(_)));
        let roots = self.add_children(None, fragments, 0)?;
        Ok(TemplateTree {
            nodes: self.nodes,
            roots,
            parameter_class: self.parameter_class,
            inline_parameters: self.inline_parameters,
            dynamic,
        })
    }

    /// `iterate_depth` counts enclosing iterate tags.
    fn add_children(
        &mut self,
        parent: Option<NodeId>,
        fragments: &[Fragment],
        iterate_depth: usize,
    ) -> Result<Vec<NodeId>, TemplateError> {
        let mut ids = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let id = match fragment {
                Fragment::Text(text) => {
                    let node = self.compile_text(text, iterate_depth > 0)?;
                    self.push(parent, NodeKind::Text(node))
                }
                Fragment::Tag(def) => self.add_tag(parent, def, iterate_depth)?,
            };
            ids.push(id);
        }
        Ok(ids)
    }

    fn push(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        self.nodes.push(Node { parent, kind });
        self.nodes.len() - 1
    }

    fn compile_text(&self, text: &str, in_iterate: bool) -> Result<TextNode, TemplateError> {
        if text.trim().is_empty() {
            return Ok(TextNode::Whitespace(text.to_string()));
        }
        check_substitutions(text)?;
        if !self.inline_parameters {
            return Ok(if has_substitutions(text) {
                TextNode::Substituted(text.to_string())
            } else {
                TextNode::Compiled {
                    sql: text.to_string(),
                    parameters: Vec::new(),
                }
            });
        }

        let parsed = parse_inline_parameters(text)?;
        // Property names are checked now even when resolution is redone later.
        let mut parameters = Vec::with_capacity(parsed.parameters.len());
        for def in &parsed.parameters {
            let property =
                ParameterProperty::resolve(def, self.parameter_class.as_ref(), self.registries)?;
            parameters.push(Arc::new(property));
        }

        if in_iterate {
            Ok(TextNode::Raw(text.to_string()))
        } else if has_substitutions(text) {
            Ok(TextNode::Substituted(text.to_string()))
        } else {
            Ok(TextNode::Compiled {
                sql: parsed.sql,
                parameters,
            })
        }
    }

    fn tag_property(
        &self,
        name: TagName,
        attribute: &'static str,
        raw: Option<&str>,
    ) -> Result<Option<TagProperty>, TemplateError> {
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return Ok(None);
        };
        let path = PropertyPath::parse(raw).map_err(|_| TemplateError::InvalidAttribute {
            tag: name.as_str(),
            attribute,
            value: raw.to_string(),
        })?;
        let path = (!path.has_pending_index()).then_some(path);
        Ok(Some(TagProperty {
            raw: raw.to_string(),
            path,
        }))
    }

    fn add_tag(
        &mut self,
        parent: Option<NodeId>,
        def: &TagDef,
        iterate_depth: usize,
    ) -> Result<NodeId, TemplateError> {
        let property = self.tag_property(def.name, "property", def.property.as_deref())?;
        let kind = match def.name {
            TagName::Dynamic => TagKind::Dynamic,
            TagName::IsEqual
            | TagName::IsNotEqual
            | TagName::IsGreaterThan
            | TagName::IsGreaterEqual
            | TagName::IsLessThan
            | TagName::IsLessEqual => {
                let op = match def.name {
                    TagName::IsEqual => CompareOp::Equal,
                    TagName::IsNotEqual => CompareOp::NotEqual,
                    TagName::IsGreaterThan => CompareOp::GreaterThan,
                    TagName::IsGreaterEqual => CompareOp::GreaterEqual,
                    TagName::IsLessThan => CompareOp::LessThan,
                    _ => CompareOp::LessEqual,
                };
                let compare_property =
                    self.tag_property(def.name, "compareProperty", def.compare_property.as_deref())?;
                let target = match (compare_property, &def.compare_value) {
                    (Some(p), _) => CompareTarget::Property(p),
                    (None, Some(v)) if !v.is_empty() => CompareTarget::Literal(v.clone()),
                    _ => {
                        return Err(TemplateError::MissingCompareTarget {
                            tag: def.name.as_str(),
                        })
                    }
                };
                TagKind::Compare {
                    op,
                    property,
                    target,
                }
            }
            TagName::IsEmpty => TagKind::Unary {
                test: UnaryTest::Empty,
                property,
            },
            TagName::IsNotEmpty => TagKind::Unary {
                test: UnaryTest::NotEmpty,
                property,
            },
            TagName::IsNull => TagKind::Unary {
                test: UnaryTest::Null,
                property,
            },
            TagName::IsNotNull => TagKind::Unary {
                test: UnaryTest::NotNull,
                property,
            },
            TagName::IsPropertyAvailable | TagName::IsNotPropertyAvailable => {
                if property.is_none() {
                    return Err(TemplateError::InvalidAttribute {
                        tag: def.name.as_str(),
                        attribute: "property",
                        value: String::new(),
                    });
                }
                let test = if def.name == TagName::IsPropertyAvailable {
                    UnaryTest::PropertyAvailable
                } else {
                    UnaryTest::PropertyNotAvailable
                };
                TagKind::Unary { test, property }
            }
            TagName::IsParameterPresent => TagKind::ParameterPresent { present: true },
            TagName::IsNotParameterPresent => TagKind::ParameterPresent { present: false },
            TagName::Iterate => TagKind::Iterate {
                property,
                open: def.open.clone(),
                close: def.close.clone(),
                conjunction: def.conjunction.clone(),
                post_parse: iterate_depth == 0 && self.inline_parameters,
            },
        };

        let prepend = def.prepend.clone().filter(|p| !p.is_empty());
        let id = self.push(
            parent,
            NodeKind::Tag(TagNode {
                name: def.name,
                kind,
                prepend,
                children: Vec::new(),
            }),
        );
        let depth = iterate_depth + usize::from(def.name == TagName::Iterate);
        let children = self.add_children(Some(id), &def.children, depth)?;
        if let NodeKind::Tag(tag) = &mut self.nodes[id].kind {
            tag.children = children;
        }
        Ok(id)
    }
}
