//! Per-execution expansion of a [`TemplateTree`].
//!
//! Every tag goes through a start hook (skip or include its body), renders its
//! children into a local buffer, then an end hook that may ask for the body to
//! be rendered again (iterate). Prepend text is applied after the end hook.

use std::collections::HashMap;
use std::sync::Arc;

use super::conditional::{compare_values, is_satisfied, unary_holds};
use super::iterate::{resolve_against, rewrite_index, IterateCursor};
use super::substitution::{has_substitutions, substitute};
use super::{
    CompareTarget, Expanded, NodeId, NodeKind, TagKind, TagNode, TagProperty, TemplateError,
    TemplateTree, TextNode, UnaryTest,
};
use crate::parameters::{parse_inline_parameters, ParameterProperty, Registries};
use crate::value::{PropertyPath, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Response {
    Skip,
    Include,
    Repeat,
}

struct TagContext<'a> {
    tree: &'a TemplateTree,
    parameter: &'a Value,
    registries: Registries<'a>,
    override_prepend: bool,
    first_non_dynamic_with_prepend: Option<NodeId>,
    cursors: HashMap<NodeId, IterateCursor>,
    parameters: Vec<Arc<ParameterProperty>>,
}

pub(super) fn expand(
    tree: &TemplateTree,
    parameter: &Value,
    registries: Registries<'_>,
) -> Result<Expanded, TemplateError> {
    let mut ctx = TagContext {
        tree,
        parameter,
        registries,
        override_prepend: false,
        first_non_dynamic_with_prepend: None,
        cursors: HashMap::new(),
        parameters: Vec::new(),
    };
    let mut sql = String::new();
    if tree.dynamic {
        ctx.process_children(&tree.roots, &mut sql)?;
    } else {
        ctx.process_plain(&mut sql)?;
    }
    Ok(Expanded {
        sql,
        parameters: ctx.parameters,
    })
}

impl<'a> TagContext<'a> {
    /// Body without tags: text is emitted exactly as compiled.
    fn process_plain(&mut self, buffer: &mut String) -> Result<(), TemplateError> {
        let tree = self.tree;
        for &id in &tree.roots {
            if let NodeKind::Text(text) = &tree.nodes[id].kind {
                match text {
                    TextNode::Whitespace(s) | TextNode::Raw(s) => buffer.push_str(s),
                    TextNode::Compiled { sql, parameters } => {
                        buffer.push_str(sql);
                        self.parameters.extend(parameters.iter().cloned());
                    }
                    TextNode::Substituted(raw) => {
                        let text = substitute(raw, self.parameter)?;
                        let sql = self.parse_runtime(&text)?;
                        buffer.push_str(&sql);
                    }
                }
            }
        }
        Ok(())
    }

    fn process_children(&mut self, children: &[NodeId], buffer: &mut String) -> Result<(), TemplateError> {
        let tree = self.tree;
        for &id in children {
            match &tree.nodes[id].kind {
                NodeKind::Text(text) => self.render_text(text, buffer)?,
                NodeKind::Tag(tag) => self.render_tag(id, tag, buffer)?,
            }
        }
        Ok(())
    }

    fn render_text(&mut self, text: &TextNode, buffer: &mut String) -> Result<(), TemplateError> {
        let sql = match text {
            TextNode::Whitespace(s) => {
                buffer.push_str(s);
                return Ok(());
            }
            TextNode::Compiled { sql, parameters } => {
                self.parameters.extend(parameters.iter().cloned());
                sql.clone()
            }
            TextNode::Substituted(raw) => {
                let text = substitute(raw, self.parameter)?;
                self.parse_runtime(&text)?
            }
            TextNode::Raw(raw) => raw.clone(),
        };
        buffer.push(' ');
        buffer.push_str(&sql);
        buffer.push(' ');
        Ok(())
    }

    /// Parses inline parameters produced at expansion time and records them.
    fn parse_runtime(&mut self, text: &str) -> Result<String, TemplateError> {
        if !self.tree.inline_parameters {
            return Ok(text.to_string());
        }
        let parsed = parse_inline_parameters(text)?;
        for def in &parsed.parameters {
            let property = ParameterProperty::resolve(
                def,
                self.tree.parameter_class.as_ref(),
                self.registries,
            )?;
            self.parameters.push(Arc::new(property));
        }
        Ok(parsed.sql)
    }

    fn render_tag(&mut self, id: NodeId, tag: &'a TagNode, buffer: &mut String) -> Result<(), TemplateError> {
        loop {
            let response = self.start(id, tag)?;
            log::trace!("<{}> node {} start: {:?}", tag.name.as_str(), id, response);
            if response == Response::Skip {
                break;
            }
            if self.override_prepend
                && self.first_non_dynamic_with_prepend.is_none()
                && tag.prepend.is_some()
                && !matches!(tag.kind, TagKind::Dynamic)
            {
                self.first_non_dynamic_with_prepend = Some(id);
            }

            let mut body = String::new();
            self.process_children(&tag.children, &mut body)?;
            let response = self.end(id, tag, &mut body);
            self.prepend(id, tag, &mut body);

            if !body.is_empty() {
                match &tag.kind {
                    TagKind::Iterate {
                        post_parse: true, ..
                    } => {
                        let text = if has_substitutions(&body) {
                            substitute(&body, self.parameter)?
                        } else {
                            body
                        };
                        let sql = self.parse_runtime(&text)?;
                        buffer.push_str(&sql);
                    }
                    _ => {
                        buffer.push(' ');
                        buffer.push_str(&body);
                        buffer.push(' ');
                    }
                }
            }
            if response != Response::Repeat {
                break;
            }
        }
        Ok(())
    }

    fn start(&mut self, id: NodeId, tag: &TagNode) -> Result<Response, TemplateError> {
        let include = match &tag.kind {
            TagKind::Dynamic => {
                self.first_non_dynamic_with_prepend = None;
                if tag.prepend.is_some() {
                    self.override_prepend = true;
                }
                true
            }
            TagKind::Compare {
                op,
                property,
                target,
            } => {
                let left = self.read(id, property.as_ref())?;
                let right = match target {
                    CompareTarget::Property(p) => self.read(id, Some(p))?,
                    CompareTarget::Literal(literal) => Value::Text(literal.clone()),
                };
                is_satisfied(*op, compare_values(&left, &right))
            }
            TagKind::Unary { test, property } => match test {
                UnaryTest::PropertyAvailable | UnaryTest::PropertyNotAvailable => {
                    let available = match property {
                        Some(p) => self.path(id, p)?.is_readable(self.parameter),
                        None => false,
                    };
                    available == (*test == UnaryTest::PropertyAvailable)
                }
                _ => {
                    let value = self.read(id, property.as_ref())?;
                    unary_holds(*test, &value)
                }
            },
            TagKind::ParameterPresent { present } => self.parameter.is_null() != *present,
            TagKind::Iterate { property, .. } => return self.start_iterate(id, property.as_ref()),
        };
        Ok(if include {
            Response::Include
        } else {
            Response::Skip
        })
    }

    fn start_iterate(&mut self, id: NodeId, property: Option<&TagProperty>) -> Result<Response, TemplateError> {
        if !self.cursors.contains_key(&id) {
            let resolved = match property {
                Some(p) => self.resolve_pending(id, p.raw()),
                None => String::new(),
            };
            let collection = if resolved.is_empty() {
                self.parameter
                    .clone()
                    .resolved()
                    .map_err(|e| TemplateError::property("", e.into()))?
            } else {
                let path = PropertyPath::parse(&resolved)
                    .map_err(|e| TemplateError::property(&resolved, e))?;
                path.get(self.parameter)
                    .map_err(|e| TemplateError::property(&resolved, e))?
            };
            let len = match &collection {
                Value::Null => return Ok(Response::Skip),
                Value::List(items) => items.len(),
                other => {
                    return Err(TemplateError::NotACollection {
                        property: resolved,
                        kind: other.kind_name(),
                    })
                }
            };
            self.cursors.insert(id, IterateCursor::new(resolved, len));
        }

        let advanced = self.cursors.get_mut(&id).is_some_and(IterateCursor::advance);
        if advanced {
            Ok(Response::Include)
        } else {
            self.cursors.remove(&id);
            Ok(Response::Skip)
        }
    }

    fn end(&mut self, id: NodeId, tag: &TagNode, body: &mut String) -> Response {
        let TagKind::Iterate {
            property,
            open,
            close,
            conjunction,
            ..
        } = &tag.kind
        else {
            return Response::Include;
        };
        let Some(cursor) = self.cursors.get(&id) else {
            return Response::Include;
        };
        let raw = property.as_ref().map_or("", |p| p.raw());
        *body = rewrite_index(body.as_str(), raw, cursor.index());
        if cursor.is_first() {
            if let Some(open) = open {
                body.insert_str(0, open);
                body.insert(0, ' ');
            }
        }
        if cursor.is_last() {
            if let Some(close) = close {
                body.push_str(close);
            }
        } else if let Some(conjunction) = conjunction {
            body.push_str(conjunction);
            body.push(' ');
        }
        Response::Repeat
    }

    fn prepend(&mut self, id: NodeId, tag: &TagNode, body: &mut String) {
        let Some(prepend) = &tag.prepend else {
            return;
        };
        if matches!(tag.kind, TagKind::Iterate { .. })
            && !self.cursors.get(&id).is_some_and(IterateCursor::is_first)
        {
            return;
        }
        if !body.trim().is_empty() {
            if self.override_prepend && self.first_non_dynamic_with_prepend == Some(id) {
                self.override_prepend = false;
            } else {
                body.insert_str(0, prepend);
            }
        } else if self.first_non_dynamic_with_prepend.is_some() {
            self.first_non_dynamic_with_prepend = None;
            self.override_prepend = true;
        }
    }

    /// Fills `[]` in `raw` from the innermost enclosing iteration it names.
    fn resolve_pending(&self, id: NodeId, raw: &str) -> String {
        if !raw.contains("[]") {
            return raw.to_string();
        }
        let mut ancestor = self.tree.nodes[id].parent;
        while let Some(pid) = ancestor {
            if let NodeKind::Tag(TagNode {
                kind: TagKind::Iterate { property, .. },
                ..
            }) = &self.tree.nodes[pid].kind
            {
                let iterate_property = property.as_ref().map_or("", |p| p.raw());
                if let Some(cursor) = self.cursors.get(&pid) {
                    if let Some(resolved) = resolve_against(raw, iterate_property, cursor) {
                        return resolved;
                    }
                }
            }
            ancestor = self.tree.nodes[pid].parent;
        }
        raw.to_string()
    }

    fn path(&self, id: NodeId, property: &TagProperty) -> Result<PropertyPath, TemplateError> {
        match &property.path {
            Some(path) => Ok(path.clone()),
            None => {
                let resolved = self.resolve_pending(id, property.raw());
                PropertyPath::parse(&resolved).map_err(|e| TemplateError::property(&resolved, e))
            }
        }
    }

    /// Property value, or the whole parameter object when no property is named.
    fn read(&self, id: NodeId, property: Option<&TagProperty>) -> Result<Value, TemplateError> {
        let Some(property) = property else {
            return self
                .parameter
                .clone()
                .resolved()
                .map_err(|e| TemplateError::property("", e.into()));
        };
        let path = self.path(id, property)?;
        path.get(self.parameter)
            .map_err(|e| TemplateError::property(path.as_str(), e))
    }
}
