//! Read-only fallback backend
//!
//! Used when the richer engines are unavailable or refuse the input.
//! Queries run over a fresh roxmltree parse of the pristine text each
//! time, restricted to the location-path dialect in [`crate::pathexpr`];
//! mutation is not offered and serialization returns the original bytes.

use roxmltree::{Document as XmlTree, Node, ParsingOptions};

use crate::error::{Error, Result};
use crate::ns::NamespaceTable;
use crate::pathexpr::{AttrName, NameTest, PathExpr, Pred, Terminal};
use crate::result::{ElementInfo, Match, QueryResult};
use crate::traits::{ApplyMode, QueryKind, TreeBackend};

pub struct MinimalTree {
    text: String,
    raw: Vec<u8>,
}

impl MinimalTree {
    /// Validate the text parses; later operations re-parse on demand.
    /// `raw` holds the undecoded source bytes, which is what
    /// serialization hands back.
    pub fn parse(text: &str, raw: &[u8]) -> Result<Self> {
        parse_tree(text)?;
        Ok(Self {
            text: text.to_string(),
            raw: raw.to_vec(),
        })
    }

    fn matched_elements<'a, 'd>(
        doc: &'a XmlTree<'d>,
        expr: &PathExpr,
        ns: &NamespaceTable,
    ) -> Vec<Node<'a, 'd>> {
        let mut context = vec![doc.root()];
        for step in &expr.steps {
            let mut next = Vec::new();
            for node in &context {
                let candidates: Vec<Node> = if step.descendant {
                    node.descendants()
                        .skip(1)
                        .filter(Node::is_element)
                        .collect()
                } else {
                    node.children().filter(Node::is_element).collect()
                };
                let named: Vec<Node> = candidates
                    .into_iter()
                    .filter(|n| name_matches(*n, &step.test, ns))
                    .collect();
                for (pos, n) in named.iter().enumerate() {
                    if step
                        .preds
                        .iter()
                        .all(|p| pred_matches(*n, p, pos + 1, ns))
                    {
                        next.push(*n);
                    }
                }
            }
            context = next;
        }
        context
    }
}

fn parse_tree(text: &str) -> Result<XmlTree<'_>> {
    XmlTree::parse_with_options(
        text,
        ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        },
    )
    .map_err(|e| Error::ParseError(e.to_string()))
}

fn name_matches(node: Node, test: &NameTest, ns: &NamespaceTable) -> bool {
    let tag = node.tag_name();
    let local_ok = test.local == "*" || tag.name() == test.local;
    match &test.prefix {
        Some(p) if ns.is_stripped_prefix(p) => local_ok,
        Some(p) => match ns.uri(p) {
            Some(uri) => local_ok && tag.namespace() == Some(uri),
            None => false,
        },
        // an unprefixed test also matches the document's default namespace
        None => local_ok && (tag.namespace().is_none() || tag.namespace() == ns.default_uri()),
    }
}

fn attr_value<'a>(node: Node<'a, '_>, attr: &AttrName, ns: &NamespaceTable) -> Option<&'a str> {
    match &attr.prefix {
        None => node.attribute(attr.local.as_str()),
        Some(p) if ns.is_stripped_prefix(p) => node.attribute(attr.local.as_str()),
        Some(p) => ns
            .uri(p)
            .and_then(|uri| node.attribute((uri, attr.local.as_str()))),
    }
}

fn pred_matches(node: Node, pred: &Pred, position: usize, ns: &NamespaceTable) -> bool {
    match pred {
        Pred::Index(n) => position == *n,
        Pred::HasAttr(a) => attr_value(node, a, ns).is_some(),
        Pred::AttrEq(a, v) => attr_value(node, a, ns) == Some(v.as_str()),
    }
}

fn qualified_name(node: Node, ns: &NamespaceTable) -> String {
    let tag = node.tag_name();
    match tag.namespace().and_then(|uri| ns.prefix_for(uri)) {
        Some(prefix) => format!("{prefix}:{}", tag.name()),
        None => tag.name().to_string(),
    }
}

fn text_content(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

fn direct_text(node: Node) -> String {
    node.children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

fn read_only(op: &str) -> Error {
    Error::UnsupportedOperation(format!(
        "{op} is not supported by the read-only fallback backend"
    ))
}

impl TreeBackend for MinimalTree {
    fn query(
        &self,
        selector: &str,
        kind: QueryKind,
        ns: &NamespaceTable,
        limit: usize,
    ) -> Result<QueryResult> {
        if kind == QueryKind::Css {
            return Err(Error::UnsupportedQueryKind(
                "CSS selectors are not supported by the fallback backend".to_string(),
            ));
        }
        let expr = PathExpr::parse(selector)?;
        let doc = parse_tree(&self.text)?;
        let elements = Self::matched_elements(&doc, &expr, ns);

        let mut result = QueryResult::default();
        'collect: for node in elements {
            match &expr.terminal {
                None => {
                    if result.matches.len() >= limit {
                        result.truncated = true;
                        break 'collect;
                    }
                    result
                        .matches
                        .push(Match::element(qualified_name(node, ns), text_content(node)));
                }
                Some(Terminal::Attribute(a)) => {
                    if let Some(value) = attr_value(node, a, ns) {
                        if result.matches.len() >= limit {
                            result.truncated = true;
                            break 'collect;
                        }
                        let shown = match &a.prefix {
                            Some(p) => format!("{p}:{}", a.local),
                            None => a.local.clone(),
                        };
                        result.matches.push(Match::attribute(shown, value));
                    }
                }
                Some(Terminal::Text) => {
                    for child in node.children().filter(|n| n.is_text()) {
                        if result.matches.len() >= limit {
                            result.truncated = true;
                            break 'collect;
                        }
                        result.matches.push(Match::text(child.text().unwrap_or("")));
                    }
                }
            }
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
        if kind == QueryKind::Css {
            return Err(Error::UnsupportedQueryKind(
                "CSS selectors are not supported by the fallback backend".to_string(),
            ));
        }
        let expr = PathExpr::parse(selector)?;
        if expr.terminal.is_some() {
            // attribute and text matches carry no element to describe
            return Ok(Vec::new());
        }
        let doc = parse_tree(&self.text)?;
        Ok(Self::matched_elements(&doc, &expr, ns)
            .into_iter()
            .take(limit)
            .map(|node| ElementInfo {
                tag: qualified_name(node, ns),
                text: direct_text(node),
                attributes: node
                    .attributes()
                    .map(|a| {
                        let key = match a.namespace().and_then(|uri| ns.prefix_for(uri)) {
                            Some(prefix) => format!("{prefix}:{}", a.name()),
                            None => a.name().to_string(),
                        };
                        (key, a.value().to_string())
                    })
                    .collect(),
            })
            .collect())
    }

    fn set_text(
        &mut self,
        _selector: &str,
        _kind: QueryKind,
        _ns: &NamespaceTable,
        _value: &str,
        _mode: ApplyMode,
    ) -> Result<usize> {
        Err(read_only("set_text"))
    }

    fn set_attribute(
        &mut self,
        _selector: &str,
        _kind: QueryKind,
        _ns: &NamespaceTable,
        _name: &str,
        _value: &str,
        _mode: ApplyMode,
    ) -> Result<usize> {
        Err(read_only("set_attribute"))
    }

    fn add_element(
        &mut self,
        _parent_selector: &str,
        _kind: QueryKind,
        _ns: &NamespaceTable,
        _tag: &str,
        _text: Option<&str>,
        _attrs: &[(&str, &str)],
    ) -> Result<()> {
        Err(read_only("add_element"))
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.raw.clone())
    }
}
