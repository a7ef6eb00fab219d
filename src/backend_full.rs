//! Full XPath 1.0 backend over an in-memory DOM
//!
//! Handles well-formed XML and SVG. Mutations edit the DOM in place;
//! serialization re-emits the whole tree, so formatting details of the
//! source are not preserved.

use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element};
use sxd_document::writer::format_document;
use sxd_document::{parser, Package, QName};
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value, XPath};

use crate::error::{Error, Result};
use crate::ns::NamespaceTable;
use crate::result::{ElementInfo, Match, MatchKind, QueryResult};
use crate::traits::{ApplyMode, QueryKind, TreeBackend};

pub struct FullTree {
    package: Package,
}

impl FullTree {
    pub fn parse(text: &str) -> Result<Self> {
        let package = parser::parse(text).map_err(|e| Error::ParseError(e.to_string()))?;
        Ok(Self { package })
    }

    fn evaluate<'d>(&'d self, selector: &str, ns: &NamespaceTable) -> Result<Value<'d>> {
        let xpath = compile(selector)?;
        let context = build_context(ns);
        let doc = self.package.as_document();
        xpath.evaluate(&context, doc.root()).map_err(|e| {
            Error::UnsupportedOperation(format!("cannot evaluate '{selector}': {e}"))
        })
    }

    /// Matched nodes in document order; scalar results cannot be edited.
    fn select_nodes<'d>(&'d self, selector: &str, ns: &NamespaceTable) -> Result<Vec<Node<'d>>> {
        match self.evaluate(selector, ns)? {
            Value::Nodeset(set) => Ok(set.document_order()),
            other => Err(Error::UnsupportedOperation(format!(
                "'{selector}' selects a {} value, not nodes",
                value_kind(&other)
            ))),
        }
    }
}

fn reject_css(kind: QueryKind) -> Result<()> {
    if kind == QueryKind::Css {
        return Err(Error::UnsupportedQueryKind(
            "CSS selectors are not supported on XML documents".to_string(),
        ));
    }
    Ok(())
}

fn compile(selector: &str) -> Result<XPath> {
    Factory::new()
        .build(selector)
        .map_err(|e| Error::ParseError(format!("invalid XPath '{selector}': {e}")))?
        .ok_or_else(|| Error::ParseError(format!("invalid XPath '{selector}': empty expression")))
}

fn build_context<'d>(ns: &NamespaceTable) -> Context<'d> {
    let mut context = Context::new();
    for (prefix, uri) in ns.iter() {
        context.set_namespace(prefix, uri);
    }
    context
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Nodeset(_) => "node-set",
        Value::Boolean(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn qualified_name(qname: QName, ns: &NamespaceTable) -> String {
    match qname.namespace_uri().and_then(|uri| ns.prefix_for(uri)) {
        Some(prefix) => format!("{prefix}:{}", qname.local_part()),
        None => qname.local_part().to_string(),
    }
}

fn collect_text(element: Element, out: &mut String) {
    for child in element.children() {
        match child {
            ChildOfElement::Element(e) => collect_text(e, out),
            ChildOfElement::Text(t) => out.push_str(t.text()),
            _ => {}
        }
    }
}

fn element_text(element: Element) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    out
}

fn direct_text(element: Element) -> String {
    element
        .children()
        .into_iter()
        .filter_map(|c| match c {
            ChildOfElement::Text(t) => Some(t.text()),
            _ => None,
        })
        .collect()
}

fn clear_children(element: Element) {
    for child in element.children() {
        match child {
            ChildOfElement::Element(e) => e.remove_from_parent(),
            ChildOfElement::Text(t) => t.remove_from_parent(),
            ChildOfElement::Comment(c) => c.remove_from_parent(),
            ChildOfElement::ProcessingInstruction(pi) => pi.remove_from_parent(),
        }
    }
}

fn node_to_match(node: Node, ns: &NamespaceTable) -> Option<Match> {
    match node {
        Node::Element(e) => Some(Match::element(qualified_name(e.name(), ns), element_text(e))),
        Node::Attribute(a) => Some(Match::attribute(qualified_name(a.name(), ns), a.value())),
        Node::Text(t) => Some(Match::text(t.text())),
        Node::Root(r) => {
            let mut text = String::new();
            for child in r.children() {
                if let ChildOfRoot::Element(e) = child {
                    collect_text(e, &mut text);
                }
            }
            Some(Match {
                kind: MatchKind::Element,
                name: None,
                value: text,
            })
        }
        _ => None,
    }
}

impl TreeBackend for FullTree {
    fn query(
        &self,
        selector: &str,
        kind: QueryKind,
        ns: &NamespaceTable,
        limit: usize,
    ) -> Result<QueryResult> {
        reject_css(kind)?;
        let mut result = QueryResult::default();
        match self.evaluate(selector, ns)? {
            Value::Nodeset(set) => {
                for node in set.document_order() {
                    let Some(m) = node_to_match(node, ns) else {
                        continue;
                    };
                    if result.matches.len() >= limit {
                        result.truncated = true;
                        break;
                    }
                    result.matches.push(m);
                }
            }
            // scalar results surface as one synthetic text match
            Value::Boolean(b) => result.matches.push(Match::text(if b { "true" } else { "false" })),
            Value::Number(n) => result.matches.push(Match::text(format_number(n))),
            Value::String(s) => result.matches.push(Match::text(s)),
        }
        Ok(result)
    }

    fn list(
        &self,
        selector: &str,
        kind: QueryKind,
        ns: &NamespaceTable,
        limit: usize,
    ) -> Result<Vec<ElementInfo>> {
        reject_css(kind)?;
        Ok(self
            .select_nodes(selector, ns)?
            .into_iter()
            .filter_map(|node| match node {
                Node::Element(e) => Some(e),
                _ => None,
            })
            .take(limit)
            .map(|e| ElementInfo {
                tag: qualified_name(e.name(), ns),
                text: direct_text(e),
                attributes: e
                    .attributes()
                    .into_iter()
                    .map(|a| (qualified_name(a.name(), ns), a.value().to_string()))
                    .collect(),
            })
            .collect())
    }

    fn set_text(
        &mut self,
        selector: &str,
        kind: QueryKind,
        ns: &NamespaceTable,
        value: &str,
        mode: ApplyMode,
    ) -> Result<usize> {
        reject_css(kind)?;
        let doc = self.package.as_document();
        let mut count = 0;
        for node in self.select_nodes(selector, ns)? {
            let applied = match node {
                Node::Element(e) => {
                    clear_children(e);
                    e.append_child(doc.create_text(value));
                    true
                }
                Node::Text(t) => {
                    t.set_text(value);
                    true
                }
                Node::Attribute(a) => match a.parent() {
                    Some(parent) => {
                        parent.set_attribute_value(a.name(), value);
                        true
                    }
                    None => false,
                },
                _ => false,
            };
            if applied {
                count += 1;
                if mode == ApplyMode::First {
                    break;
                }
            }
        }
        Ok(count)
    }

    fn set_attribute(
        &mut self,
        selector: &str,
        kind: QueryKind,
        ns: &NamespaceTable,
        name: &str,
        value: &str,
        mode: ApplyMode,
    ) -> Result<usize> {
        reject_css(kind)?;
        let (uri, local) = ns.resolve_attr(name)?;
        let prefix = name.split_once(':').map(|(p, _)| p);
        let mut count = 0;
        for node in self.select_nodes(selector, ns)? {
            if let Node::Element(e) = node {
                match uri {
                    Some(uri) => {
                        e.set_attribute_value((uri, local), value);
                        if let Some(prefix) = prefix {
                            e.register_prefix(prefix, uri);
                        }
                    }
                    None => {
                        e.set_attribute_value(local, value);
                    }
                }
                count += 1;
                if mode == ApplyMode::First {
                    break;
                }
            }
        }
        Ok(count)
    }

    fn add_element(
        &mut self,
        parent_selector: &str,
        kind: QueryKind,
        ns: &NamespaceTable,
        tag: &str,
        text: Option<&str>,
        attrs: &[(&str, &str)],
    ) -> Result<()> {
        reject_css(kind)?;
        let nodes = self.select_nodes(parent_selector, ns)?;
        if nodes.is_empty() {
            return Err(Error::NoSuchElement(parent_selector.to_string()));
        }
        if nodes.len() > 1 {
            return Err(Error::AmbiguousTarget {
                selector: parent_selector.to_string(),
                count: nodes.len(),
            });
        }
        let Node::Element(parent) = nodes[0] else {
            return Err(Error::NoSuchElement(parent_selector.to_string()));
        };

        let doc = self.package.as_document();
        let (tag_uri, tag_local) = ns.resolve_attr(tag)?;
        // an unprefixed tag lands in the document's default namespace
        let child = match tag_uri.or(ns.default_uri()) {
            Some(uri) => doc.create_element((uri, tag_local)),
            None => doc.create_element(tag_local),
        };
        if let Some((prefix, _)) = tag.split_once(':') {
            if let Some(uri) = tag_uri {
                child.register_prefix(prefix, uri);
            }
        }
        for (attr_name, attr_value) in attrs {
            let (uri, local) = ns.resolve_attr(attr_name)?;
            match uri {
                Some(uri) => {
                    child.set_attribute_value((uri, local), *attr_value);
                    if let Some((prefix, _)) = attr_name.split_once(':') {
                        child.register_prefix(prefix, uri);
                    }
                }
                None => {
                    child.set_attribute_value(local, *attr_value);
                }
            }
        }
        if let Some(text) = text {
            child.append_child(doc.create_text(text));
        }
        parent.append_child(child);
        Ok(())
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        format_document(&self.package.as_document(), &mut out)
            .map_err(|e| Error::SerializationError(e.to_string()))?;
        Ok(out)
    }
}
