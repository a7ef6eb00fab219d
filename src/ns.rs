//! Namespace resolution for prefixed selectors
//!
//! Queries may use conventional prefixes (`svg`, `xlink`, `html`, `xhtml`)
//! without the document declaring them; declarations found on the document's
//! root element override the built-ins for the same prefix. Every prefix a
//! selector uses is checked against the table before the query runs.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Prefix-to-URI bindings for one document.
///
/// In HTML mode the `html` prefix means "no namespace" and is stripped from
/// selectors instead of being bound to a URI, unless the document declares
/// it explicitly.
#[derive(Debug, Clone)]
pub struct NamespaceTable {
    bindings: BTreeMap<String, String>,
    default_uri: Option<String>,
    html_mode: bool,
}

impl NamespaceTable {
    pub fn new(html_mode: bool) -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert("svg".to_string(), SVG_NS.to_string());
        bindings.insert("xlink".to_string(), XLINK_NS.to_string());
        bindings.insert("xhtml".to_string(), XHTML_NS.to_string());
        if !html_mode {
            bindings.insert("html".to_string(), XHTML_NS.to_string());
        }
        Self {
            bindings,
            default_uri: None,
            html_mode,
        }
    }

    /// Bind a prefix, overriding a built-in of the same name.
    pub fn declare(&mut self, prefix: &str, uri: &str) {
        self.bindings.insert(prefix.to_string(), uri.to_string());
    }

    /// Record the document's default (unprefixed) namespace.
    pub fn set_default(&mut self, uri: &str) {
        self.default_uri = Some(uri.to_string());
    }

    pub fn default_uri(&self) -> Option<&str> {
        self.default_uri.as_deref()
    }

    /// URI bound to a prefix. The `xml` prefix is implicitly bound per the
    /// XML namespaces recommendation.
    pub fn uri(&self, prefix: &str) -> Option<&str> {
        match self.bindings.get(prefix) {
            Some(uri) => Some(uri.as_str()),
            None if prefix == "xml" => Some(XML_NS),
            None => None,
        }
    }

    /// Whether this prefix is stripped from selectors rather than matched
    /// against a URI (the `html` prefix on HTML documents).
    pub fn is_stripped_prefix(&self, prefix: &str) -> bool {
        self.html_mode && prefix == "html" && !self.bindings.contains_key("html")
    }

    /// Whether a selector may use this prefix.
    pub fn knows_prefix(&self, prefix: &str) -> bool {
        self.uri(prefix).is_some() || self.is_stripped_prefix(prefix)
    }

    /// Reverse lookup: a prefix for the given URI, if any is bound to it.
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(_, u)| u.as_str() == uri)
            .map(|(p, _)| p.as_str())
    }

    /// All bound prefixes, for registration with a query engine.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    /// Split an attribute name into namespace URI and local part,
    /// resolving an optional prefix.
    pub fn resolve_attr<'a>(&'a self, name: &'a str) -> Result<(Option<&'a str>, &'a str)> {
        match name.split_once(':') {
            None => Ok((None, name)),
            Some((prefix, local)) => {
                if self.is_stripped_prefix(prefix) {
                    return Ok((None, local));
                }
                match self.uri(prefix) {
                    Some(uri) => Ok((Some(uri), local)),
                    None => Err(Error::UnknownNamespacePrefix(prefix.to_string())),
                }
            }
        }
    }
}

fn is_ncname_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.' || b >= 0x80
}

fn is_prefix_start(prefix: &str) -> bool {
    prefix
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
}

/// Check every namespace prefix an XPath selector uses against the table.
///
/// Skips string literals and `::` axis separators, so `'a:b'` inside a
/// predicate and `child::` never count as prefixes.
pub fn validate_xpath_prefixes(selector: &str, table: &NamespaceTable) -> Result<()> {
    let b = selector.as_bytes();
    let mut i = 0;
    let mut quote: Option<u8> = None;

    while i < b.len() {
        let c = b[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'\'' | b'"' => {
                quote = Some(c);
                i += 1;
            }
            b':' => {
                if i + 1 < b.len() && b[i + 1] == b':' {
                    i += 2;
                    continue;
                }
                let mut s = i;
                while s > 0 && is_ncname_byte(b[s - 1]) {
                    s -= 1;
                }
                let prefix = &selector[s..i];
                if is_prefix_start(prefix) && !table.knows_prefix(prefix) {
                    return Err(Error::UnknownNamespacePrefix(prefix.to_string()));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    Ok(())
}

/// Rewrite a CSS selector's namespace qualifiers for an engine that does
/// not namespace-match.
///
/// `html|` (in HTML mode), the empty prefix and `*|` are stripped; any
/// other known prefix cannot be honored and is rejected, an unknown one is
/// an `UnknownNamespacePrefix`.
pub fn rewrite_css_selector(selector: &str, table: &NamespaceTable) -> Result<String> {
    let b = selector.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(b.len());
    let mut i = 0;
    let mut quote: Option<u8> = None;

    while i < b.len() {
        let c = b[i];
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'\'' | b'"' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            b'|' if i + 1 < b.len() && b[i + 1] == b'=' => {
                out.extend_from_slice(b"|=");
                i += 2;
            }
            b'|' if i + 1 < b.len() && b[i + 1] == b'|' => {
                out.extend_from_slice(b"||");
                i += 2;
            }
            b'|' => {
                let mut s = i;
                while s > 0 && (is_ncname_byte(b[s - 1]) || b[s - 1] == b'*') {
                    s -= 1;
                }
                let prefix = &selector[s..i];
                if prefix.is_empty() || prefix == "*" || table.is_stripped_prefix(prefix) {
                    out.truncate(out.len() - prefix.len());
                } else if table.uri(prefix).is_some() {
                    return Err(Error::UnsupportedOperation(format!(
                        "namespace-qualified CSS selector '{prefix}|' cannot be matched here"
                    )));
                } else {
                    return Err(Error::UnknownNamespacePrefix(prefix.to_string()));
                }
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    // only whole segments of the input were copied, so this stays UTF-8
    Ok(String::from_utf8(out)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Harvest `xmlns` declarations from the raw attribute text of a start tag.
pub fn collect_declarations(tag_body: &str, table: &mut NamespaceTable) {
    let b = tag_body.as_bytes();
    let mut i = 0;

    while i < b.len() {
        while i < b.len() && (b[i].is_ascii_whitespace() || b[i] == b'/') {
            i += 1;
        }
        let name_start = i;
        while i < b.len() && !b[i].is_ascii_whitespace() && b[i] != b'=' {
            i += 1;
        }
        if name_start == i {
            break;
        }
        let name = &tag_body[name_start..i];
        while i < b.len() && b[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= b.len() || b[i] != b'=' {
            continue;
        }
        i += 1;
        while i < b.len() && b[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= b.len() {
            break;
        }
        let value = if b[i] == b'\'' || b[i] == b'"' {
            let q = b[i];
            i += 1;
            let value_start = i;
            while i < b.len() && b[i] != q {
                i += 1;
            }
            let v = &tag_body[value_start..i];
            i += 1;
            v
        } else {
            let value_start = i;
            while i < b.len() && !b[i].is_ascii_whitespace() {
                i += 1;
            }
            &tag_body[value_start..i]
        };

        if name == "xmlns" {
            table.set_default(value);
        } else if let Some(prefix) = name.strip_prefix("xmlns:") {
            table.declare(prefix, value);
        }
    }
}
