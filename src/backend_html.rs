//! Lenient HTML backend
//!
//! Parses tag soup the way browsers do and answers CSS selector queries.
//! Mutations edit the node tree directly; serialization re-emits the
//! normalized tree, so implied elements like `<tbody>` appear in the
//! output even when the source omitted them.

use ego_tree::{NodeId, Tree};
use html5ever::{namespace_url, ns, Attribute, LocalName, Namespace, QualName};
use scraper::node::{Element, Text};
use scraper::{Html, Node, Selector};

use crate::error::{Error, Result};
use crate::ns::{rewrite_css_selector, NamespaceTable};
use crate::result::{ElementInfo, Match, QueryResult};
use crate::traits::{ApplyMode, QueryKind, TreeBackend};

pub struct HtmlTree {
    html: Html,
    had_doctype: bool,
}

impl HtmlTree {
    pub fn parse(text: &str) -> Self {
        let html = Html::parse_document(text);
        let had_doctype = html
            .tree
            .root()
            .children()
            .any(|n| matches!(n.value(), Node::Doctype(_)));
        Self { html, had_doctype }
    }

    fn compile(selector: &str, ns: &NamespaceTable) -> Result<Selector> {
        let rewritten = rewrite_css_selector(selector, ns)?;
        Selector::parse(&rewritten)
            .map_err(|e| Error::ParseError(format!("invalid CSS selector '{selector}': {e}")))
    }

    fn select_ids(&self, selector: &str, ns: &NamespaceTable) -> Result<Vec<NodeId>> {
        let sel = Self::compile(selector, ns)?;
        Ok(self.html.select(&sel).map(|el| el.id()).collect())
    }
}

fn reject_xpath(kind: QueryKind) -> Result<()> {
    if kind == QueryKind::XPath {
        return Err(Error::UnsupportedQueryKind(
            "XPath queries are not supported on HTML documents".to_string(),
        ));
    }
    Ok(())
}

fn attr_display_name(qual: &QualName, ns: &NamespaceTable) -> String {
    if qual.ns.is_empty() {
        qual.local.to_string()
    } else {
        match ns.prefix_for(&qual.ns) {
            Some(prefix) => format!("{prefix}:{}", qual.local),
            None => qual.local.to_string(),
        }
    }
}

fn escape_attr_value(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Copy the subtree rooted at `src_id` to the end of `dst_id`'s children.
fn graft(dst: &mut Tree<Node>, dst_id: NodeId, src: &Tree<Node>, src_id: NodeId) {
    let Some(src_node) = src.get(src_id) else {
        return;
    };
    let value = src_node.value().clone();
    let child_ids: Vec<NodeId> = src_node.children().map(|c| c.id()).collect();
    let new_id = match dst.get_mut(dst_id) {
        Some(mut parent) => parent.append(value).id(),
        None => return,
    };
    for child_id in child_ids {
        graft(dst, new_id, src, child_id);
    }
}

impl TreeBackend for HtmlTree {
    fn query(
        &self,
        selector: &str,
        kind: QueryKind,
        ns: &NamespaceTable,
        limit: usize,
    ) -> Result<QueryResult> {
        reject_xpath(kind)?;
        let sel = Self::compile(selector, ns)?;
        let mut result = QueryResult::default();
        for el in self.html.select(&sel) {
            if result.matches.len() >= limit {
                result.truncated = true;
                break;
            }
            result.matches.push(Match::element(
                el.value().name().to_string(),
                el.text().collect::<String>(),
            ));
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
        reject_xpath(kind)?;
        let sel = Self::compile(selector, ns)?;
        Ok(self
            .html
            .select(&sel)
            .take(limit)
            .map(|el| ElementInfo {
                tag: el.value().name().to_string(),
                text: el
                    .children()
                    .filter_map(|c| match c.value() {
                        Node::Text(t) => Some(&*t.text),
                        _ => None,
                    })
                    .collect(),
                attributes: el
                    .value()
                    .attrs
                    .iter()
                    .map(|(qual, value)| (attr_display_name(qual, ns), value.to_string()))
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
        reject_xpath(kind)?;
        let ids = self.select_ids(selector, ns)?;
        let mut count = 0;
        for id in ids {
            let child_ids: Vec<NodeId> = match self.html.tree.get(id) {
                Some(node) => node.children().map(|c| c.id()).collect(),
                None => continue,
            };
            for child_id in child_ids {
                if let Some(mut child) = self.html.tree.get_mut(child_id) {
                    child.detach();
                }
            }
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.append(Node::Text(Text { text: value.into() }));
                count += 1;
            }
            if mode == ApplyMode::First && count > 0 {
                break;
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
        reject_xpath(kind)?;
        let (uri, local) = ns.resolve_attr(name)?;
        let uri = uri.map(str::to_string);
        let local = local.to_string();
        let ids = self.select_ids(selector, ns)?;
        let mut count = 0;
        for id in ids {
            if let Some(mut node) = self.html.tree.get_mut(id) {
                if let Node::Element(el) = node.value() {
                    // match an existing attribute by namespace and local
                    // name so the map key keeps its original prefix
                    let existing = el
                        .attrs
                        .keys()
                        .find(|qual| {
                            &*qual.local == local.as_str()
                                && match &uri {
                                    Some(u) => &*qual.ns == u.as_str(),
                                    None => qual.ns.is_empty(),
                                }
                        })
                        .cloned();
                    let key = existing.unwrap_or_else(|| match &uri {
                        Some(u) => QualName::new(
                            None,
                            Namespace::from(u.as_str()),
                            LocalName::from(local.as_str()),
                        ),
                        None => QualName::new(None, ns!(), LocalName::from(local.as_str())),
                    });
                    let mut attrs = el.attrs.clone();
                    attrs.insert(key, value.into());
                    // selector matching caches id and class lookups per
                    // element; swap in a rebuilt element instead of editing
                    // the map in place so the caches start over
                    *el = Element::new(
                        el.name.clone(),
                        attrs
                            .into_iter()
                            .map(|(name, value)| Attribute { name, value })
                            .collect(),
                    );
                    count += 1;
                }
            }
            if mode == ApplyMode::First && count > 0 {
                break;
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
        reject_xpath(kind)?;
        let (tag_uri, tag_local) = ns.resolve_attr(tag)?;
        if tag_uri.is_some() {
            return Err(Error::UnsupportedOperation(format!(
                "namespace-qualified tag '{tag}' cannot be added to an HTML document"
            )));
        }
        let tag_local = tag_local.to_string();
        for (attr_name, _) in attrs {
            if ns.resolve_attr(attr_name)?.0.is_some() {
                return Err(Error::UnsupportedOperation(format!(
                    "namespace-qualified attribute '{attr_name}' cannot be added to an HTML document"
                )));
            }
        }

        let ids = self.select_ids(parent_selector, ns)?;
        if ids.is_empty() {
            return Err(Error::NoSuchElement(parent_selector.to_string()));
        }
        if ids.len() > 1 {
            return Err(Error::AmbiguousTarget {
                selector: parent_selector.to_string(),
                count: ids.len(),
            });
        }

        let mut fragment_text = format!("<{tag_local}");
        for (attr_name, attr_value) in attrs {
            let local = match attr_name.split_once(':') {
                Some((_, l)) => l,
                None => attr_name,
            };
            fragment_text.push(' ');
            fragment_text.push_str(local);
            fragment_text.push_str("=\"");
            fragment_text.push_str(&escape_attr_value(attr_value));
            fragment_text.push('"');
        }
        fragment_text.push('>');
        if let Some(text) = text {
            fragment_text.push_str(&escape_text(text));
        }
        fragment_text.push_str(&format!("</{tag_local}>"));

        let fragment = Html::parse_fragment(&fragment_text);
        let wanted = tag_local.to_ascii_lowercase();
        let new_root = fragment
            .tree
            .root()
            .descendants()
            .find(|n| match n.value() {
                Node::Element(el) => el.name() == wanted,
                _ => false,
            })
            .map(|n| n.id())
            .ok_or_else(|| {
                Error::UnsupportedOperation(format!("'{tag}' is not a valid HTML element name"))
            })?;

        graft(&mut self.html.tree, ids[0], &fragment.tree, new_root);
        Ok(())
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let markup = self.html.root_element().html();
        let mut out = Vec::with_capacity(markup.len() + 16);
        if self.had_doctype {
            out.extend_from_slice(b"<!DOCTYPE html>\n");
        }
        out.extend_from_slice(markup.as_bytes());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"<!DOCTYPE html>
<html><head><title>Sample</title></head>
<body>
  <div id="main" class="wrap">
    <p class="note">First</p>
    <p class="note">Second</p>
    <a href="data:text/plain,hi">link</a>
  </div>
</body></html>"#;

    fn table() -> NamespaceTable {
        NamespaceTable::new(true)
    }

    #[test]
    fn css_query_returns_elements_in_order() {
        let tree = HtmlTree::parse(HTML);
        let result = tree.query("p.note", QueryKind::Css, &table(), 100).unwrap();
        assert_eq!(result.count(), 2);
        assert_eq!(result.matches[0].value, "First");
        assert_eq!(result.matches[1].value, "Second");
    }

    #[test]
    fn html_prefix_is_accepted() {
        let tree = HtmlTree::parse(HTML);
        let result = tree
            .query("html|div > html|p", QueryKind::Css, &table(), 100)
            .unwrap();
        assert_eq!(result.count(), 2);
    }

    #[test]
    fn xpath_kind_is_rejected() {
        let tree = HtmlTree::parse(HTML);
        let err = tree
            .query("//p", QueryKind::XPath, &table(), 100)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedQueryKind(_)));
    }

    #[test]
    fn bad_selector_is_a_parse_error() {
        let tree = HtmlTree::parse(HTML);
        let err = tree.query("p..note", QueryKind::Css, &table(), 100).unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[test]
    fn set_text_first_and_all() {
        let mut tree = HtmlTree::parse(HTML);
        let ns = table();
        let n = tree
            .set_text("p.note", QueryKind::Css, &ns, "Edited", ApplyMode::First)
            .unwrap();
        assert_eq!(n, 1);
        let result = tree.query("p.note", QueryKind::Css, &ns, 100).unwrap();
        assert_eq!(result.matches[0].value, "Edited");
        assert_eq!(result.matches[1].value, "Second");

        let n = tree
            .set_text("p.note", QueryKind::Css, &ns, "Same", ApplyMode::All)
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn set_attribute_overwrites_and_inserts() {
        let mut tree = HtmlTree::parse(HTML);
        let ns = table();
        let n = tree
            .set_attribute("#main", QueryKind::Css, &ns, "class", "boxed", ApplyMode::All)
            .unwrap();
        assert_eq!(n, 1);
        let infos = tree.list("#main", QueryKind::Css, &ns, 10).unwrap();
        assert_eq!(infos[0].attributes.get("class").map(String::as_str), Some("boxed"));

        tree.set_attribute("a", QueryKind::Css, &ns, "rel", "nofollow", ApplyMode::All)
            .unwrap();
        let infos = tree.list("a", QueryKind::Css, &ns, 10).unwrap();
        assert_eq!(infos[0].attributes.get("rel").map(String::as_str), Some("nofollow"));
    }

    #[test]
    fn id_and_class_selectors_see_new_values_immediately() {
        let mut tree = HtmlTree::parse(HTML);
        let ns = table();
        let n = tree
            .set_attribute("#main", QueryKind::Css, &ns, "id", "renamed", ApplyMode::All)
            .unwrap();
        assert_eq!(n, 1);
        assert!(
            tree.query("#main", QueryKind::Css, &ns, 10).unwrap().is_empty(),
            "the old id must stop matching"
        );
        let result = tree.query("#renamed", QueryKind::Css, &ns, 10).unwrap();
        assert_eq!(result.count(), 1, "the new id must match");

        tree.set_attribute("#renamed", QueryKind::Css, &ns, "class", "boxed", ApplyMode::All)
            .unwrap();
        assert!(tree.query(".wrap", QueryKind::Css, &ns, 10).unwrap().is_empty());
        let result = tree.query("div.boxed", QueryKind::Css, &ns, 10).unwrap();
        assert_eq!(result.count(), 1);
    }

    #[test]
    fn add_element_grafts_a_subtree() {
        let mut tree = HtmlTree::parse(HTML);
        let ns = table();
        tree.add_element(
            "#main",
            QueryKind::Css,
            &ns,
            "span",
            Some("tail"),
            &[("class", "added")],
        )
        .unwrap();
        let result = tree.query("span.added", QueryKind::Css, &ns, 100).unwrap();
        assert_eq!(result.count(), 1);
        assert_eq!(result.matches[0].value, "tail");
    }

    #[test]
    fn add_element_requires_single_parent() {
        let mut tree = HtmlTree::parse(HTML);
        let ns = table();
        let err = tree
            .add_element("p.note", QueryKind::Css, &ns, "b", None, &[])
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousTarget { count: 2, .. }));

        let err = tree
            .add_element("#missing", QueryKind::Css, &ns, "b", None, &[])
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchElement(_)));
    }

    #[test]
    fn serialize_keeps_doctype_and_edits() {
        let mut tree = HtmlTree::parse(HTML);
        let ns = table();
        tree.set_text("title", QueryKind::Css, &ns, "Renamed", ApplyMode::All)
            .unwrap();
        let out = String::from_utf8(tree.serialize().unwrap()).unwrap();
        assert!(out.starts_with("<!DOCTYPE html>"));
        assert!(out.contains("<title>Renamed</title>"));
    }

    #[test]
    fn empty_selection_is_not_an_error() {
        let tree = HtmlTree::parse(HTML);
        let result = tree
            .query("section.missing", QueryKind::Css, &table(), 100)
            .unwrap();
        assert!(result.is_empty());
        assert!(!result.truncated);
    }
}
