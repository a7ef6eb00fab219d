//! The unified document type
//!
//! A [`Document`] hides which engine parsed the input behind one querying
//! and editing surface. The engine is chosen once, at parse time, from the
//! detected format and the enabled capabilities.

use std::fs;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use tracing::debug;
#[cfg(feature = "xpath")]
use tracing::warn;

#[cfg(feature = "xpath")]
use crate::backend_full::FullTree;
#[cfg(feature = "css")]
use crate::backend_html::HtmlTree;
use crate::backend_minimal::MinimalTree;
use crate::capability::capabilities;
use crate::datauri::{self, DataUri};
use crate::error::{Error, Result};
use crate::ns::{self, NamespaceTable};
use crate::options::Options;
use crate::result::{DocumentInfo, ElementInfo, MatchKind, QueryResult};
use crate::source::{self, Loaded};
use crate::traits::{ApplyMode, QueryKind, TreeBackend};

// ==================== Format Detection ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocFormat {
    Xml,
    Svg,
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Full,
    LenientHtml,
    Minimal,
}

/// Scan the document head: whether an HTML doctype was seen, plus the
/// root element's name and raw attribute text.
fn leading_markup(text: &str) -> (bool, Option<(String, String)>) {
    let mut html_doctype = false;
    let mut rest = text.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("<?") {
            match after.find("?>") {
                Some(k) => rest = after[k + 2..].trim_start(),
                None => return (html_doctype, None),
            }
        } else if let Some(after) = rest.strip_prefix("<!--") {
            match after.find("-->") {
                Some(k) => rest = after[k + 3..].trim_start(),
                None => return (html_doctype, None),
            }
        } else if rest.starts_with("<!") {
            let end = match rest.find('>') {
                Some(k) => k,
                None => return (html_doctype, None),
            };
            let decl = rest[..end].to_ascii_lowercase();
            if let Some(after_kw) = decl.strip_prefix("<!doctype") {
                // only the doctype name decides, not its public or system ids
                if after_kw.split_whitespace().next() == Some("html") {
                    html_doctype = true;
                }
            }
            rest = rest[end + 1..].trim_start();
        } else if let Some(after) = rest.strip_prefix('<') {
            let b = after.as_bytes();
            let mut i = 0;
            while i < b.len() && !b[i].is_ascii_whitespace() && b[i] != b'>' && b[i] != b'/' {
                i += 1;
            }
            let name = after[..i].to_string();
            if name.is_empty() {
                return (html_doctype, None);
            }
            let mut j = i;
            let mut in_quote: Option<u8> = None;
            while j < b.len() {
                let c = b[j];
                if let Some(q) = in_quote {
                    if c == q {
                        in_quote = None;
                    }
                } else {
                    match c {
                        b'\'' | b'"' => in_quote = Some(c),
                        b'>' => break,
                        _ => {}
                    }
                }
                j += 1;
            }
            let body = after[i..j].trim_end_matches('/').to_string();
            return (html_doctype, Some((name, body)));
        } else {
            return (html_doctype, None);
        }
    }
}

fn detect_format(html_doctype: bool, root: Option<&str>, text: &str) -> DocFormat {
    if html_doctype {
        return DocFormat::Html;
    }
    let local = root.map(|r| r.rsplit(':').next().unwrap_or(r));
    match local {
        Some(l) if l.eq_ignore_ascii_case("svg") => DocFormat::Svg,
        Some(l) if l.eq_ignore_ascii_case("html") => DocFormat::Html,
        _ if text.contains(ns::SVG_NS) => DocFormat::Svg,
        _ => DocFormat::Xml,
    }
}

// ==================== Tree Construction ====================

enum Tree {
    #[cfg(feature = "xpath")]
    Full(FullTree),
    #[cfg(feature = "css")]
    Html(HtmlTree),
    Minimal(MinimalTree),
}

impl Tree {
    fn kind(&self) -> BackendKind {
        match self {
            #[cfg(feature = "xpath")]
            Tree::Full(_) => BackendKind::Full,
            #[cfg(feature = "css")]
            Tree::Html(_) => BackendKind::LenientHtml,
            Tree::Minimal(_) => BackendKind::Minimal,
        }
    }

    fn backend(&self) -> &dyn TreeBackend {
        match self {
            #[cfg(feature = "xpath")]
            Tree::Full(t) => t,
            #[cfg(feature = "css")]
            Tree::Html(t) => t,
            Tree::Minimal(t) => t,
        }
    }

    fn backend_mut(&mut self) -> &mut dyn TreeBackend {
        match self {
            #[cfg(feature = "xpath")]
            Tree::Full(t) => t,
            #[cfg(feature = "css")]
            Tree::Html(t) => t,
            Tree::Minimal(t) => t,
        }
    }
}

fn build_tree(text: &str, raw: &[u8], format: DocFormat) -> Result<Tree> {
    if format == DocFormat::Html {
        #[cfg(feature = "css")]
        {
            return Ok(Tree::Html(HtmlTree::parse(text)));
        }
        #[cfg(not(feature = "css"))]
        {
            return Ok(Tree::Minimal(MinimalTree::parse(text, raw)?));
        }
    }
    #[cfg(feature = "xpath")]
    {
        match FullTree::parse(text) {
            Ok(tree) => return Ok(Tree::Full(tree)),
            Err(e) => warn!(error = %e, "full engine rejected input, trying fallback"),
        }
    }
    Ok(Tree::Minimal(MinimalTree::parse(text, raw)?))
}

// ==================== Document ====================

pub struct Document {
    origin: String,
    format: DocFormat,
    raw: Vec<u8>,
    encoding: String,
    namespaces: NamespaceTable,
    options: Options,
    tree: Tree,
    dirty: bool,
}

// manual impl: the parsed tree holds backend types without Debug
impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("origin", &self.origin)
            .field("format", &self.format)
            .field("backend", &self.tree.kind())
            .field("encoding", &self.encoding)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Load from a local path or an `http(s)` URL with default options.
    pub fn load(origin: &str) -> Result<Self> {
        Self::load_with_options(origin, Options::default())
    }

    pub fn load_with_options(origin: &str, options: Options) -> Result<Self> {
        let loaded = source::load_source(origin, &options)?;
        Self::from_loaded(origin, loaded, options)
    }

    /// Parse bytes already in hand; `origin` is kept for reporting and as
    /// the default save destination.
    pub fn from_bytes(origin: &str, bytes: Vec<u8>, options: Options) -> Result<Self> {
        Self::from_loaded(
            origin,
            Loaded {
                bytes,
                content_type: None,
            },
            options,
        )
    }

    fn from_loaded(origin: &str, loaded: Loaded, options: Options) -> Result<Self> {
        let (text, encoding) = source::decode_bytes(&loaded.bytes, loaded.content_type.as_deref());
        let (html_doctype, root_tag) = leading_markup(&text);
        let format = detect_format(
            html_doctype,
            root_tag.as_ref().map(|(name, _)| name.as_str()),
            &text,
        );
        let mut namespaces = NamespaceTable::new(format == DocFormat::Html);
        if let Some((_, body)) = &root_tag {
            ns::collect_declarations(body, &mut namespaces);
        }
        let tree = build_tree(&text, &loaded.bytes, format)?;
        debug!(
            origin,
            format = ?format,
            backend = ?tree.kind(),
            %encoding,
            "loaded document"
        );
        Ok(Self {
            origin: origin.to_string(),
            format,
            raw: loaded.bytes,
            encoding,
            namespaces,
            options,
            tree,
            dirty: false,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn format(&self) -> DocFormat {
        self.format
    }

    pub fn backend(&self) -> BackendKind {
        self.tree.kind()
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Whether unsaved edits exist.
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// The bytes the document was loaded from, before any edit.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    /// Bind an extra prefix for later selectors.
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) {
        self.namespaces.declare(prefix, uri);
    }

    pub fn info(&self) -> DocumentInfo {
        DocumentInfo {
            origin: self.origin.clone(),
            format: self.format,
            backend: self.tree.kind(),
            encoding: self.encoding.clone(),
            dirty: self.dirty,
            remote: source::is_remote(&self.origin),
        }
    }

    /// Reject a query kind the build does not carry, and check selector
    /// prefixes before anything touches the tree.
    fn prepare(&self, selector: &str, kind: QueryKind) -> Result<()> {
        let caps = capabilities();
        match kind {
            QueryKind::XPath if !caps.xpath => {
                return Err(Error::UnsupportedQueryKind(
                    "XPath queries require the xpath capability".to_string(),
                ))
            }
            QueryKind::Css if !caps.css => {
                return Err(Error::UnsupportedQueryKind(
                    "CSS queries require the css capability".to_string(),
                ))
            }
            _ => {}
        }
        if kind == QueryKind::XPath {
            ns::validate_xpath_prefixes(selector, &self.namespaces)?;
        }
        Ok(())
    }

    // ==================== Queries ====================

    /// Run a selector and collect matches in document order, up to the
    /// configured ceiling.
    pub fn query(&self, selector: &str, kind: QueryKind) -> Result<QueryResult> {
        self.prepare(selector, kind)?;
        self.tree
            .backend()
            .query(selector, kind, &self.namespaces, self.options.match_limit)
    }

    /// Describe each matched element: tag, direct text and attributes.
    pub fn list(&self, selector: &str, kind: QueryKind) -> Result<Vec<ElementInfo>> {
        self.prepare(selector, kind)?;
        self.tree
            .backend()
            .list(selector, kind, &self.namespaces, self.options.match_limit)
    }

    /// Text of the first match, if any.
    pub fn get_text(&self, selector: &str, kind: QueryKind) -> Result<Option<String>> {
        Ok(self.query(selector, kind)?.first().map(|m| m.value.clone()))
    }

    /// An attribute of the first matched element, if present.
    pub fn get_attribute(
        &self,
        selector: &str,
        kind: QueryKind,
        name: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .list(selector, kind)?
            .first()
            .and_then(|info| info.attributes.get(name).cloned()))
    }

    // ==================== Mutations ====================

    /// Replace the text content of matched nodes. Returns how many nodes
    /// changed; zero is not an error.
    pub fn set_text(
        &mut self,
        selector: &str,
        kind: QueryKind,
        value: &str,
        mode: ApplyMode,
    ) -> Result<usize> {
        self.prepare(selector, kind)?;
        let n = self
            .tree
            .backend_mut()
            .set_text(selector, kind, &self.namespaces, value, mode)?;
        if n > 0 {
            self.dirty = true;
            debug!(selector, n, "set_text applied");
        }
        Ok(n)
    }

    /// Set an attribute on matched elements, creating it when absent.
    pub fn set_attribute(
        &mut self,
        selector: &str,
        kind: QueryKind,
        name: &str,
        value: &str,
        mode: ApplyMode,
    ) -> Result<usize> {
        self.prepare(selector, kind)?;
        let n = self
            .tree
            .backend_mut()
            .set_attribute(selector, kind, &self.namespaces, name, value, mode)?;
        if n > 0 {
            self.dirty = true;
            debug!(selector, name, n, "set_attribute applied");
        }
        Ok(n)
    }

    /// Append a new child element under exactly one parent.
    pub fn add_element(
        &mut self,
        parent_selector: &str,
        kind: QueryKind,
        tag: &str,
        text: Option<&str>,
        attrs: &[(&str, &str)],
    ) -> Result<()> {
        self.prepare(parent_selector, kind)?;
        self.tree
            .backend_mut()
            .add_element(parent_selector, kind, &self.namespaces, tag, text, attrs)?;
        self.dirty = true;
        debug!(parent_selector, tag, "add_element applied");
        Ok(())
    }

    // ==================== Data URIs ====================

    /// Decode the data URI carried by exactly one matched node.
    ///
    /// Attribute and text matches are parsed directly; for an element
    /// match the conventional carrier attributes are tried in order.
    pub fn extract(&self, selector: &str, kind: QueryKind) -> Result<DataUri> {
        self.prepare(selector, kind)?;
        // the uniqueness check must see a second match even when the
        // caller's ceiling is one
        let limit = self.options.match_limit.max(2);
        let result = self
            .tree
            .backend()
            .query(selector, kind, &self.namespaces, limit)?;
        if result.is_empty() {
            return Err(Error::NoSuchElement(selector.to_string()));
        }
        if result.count() > 1 {
            return Err(Error::AmbiguousTarget {
                selector: selector.to_string(),
                count: result.count(),
            });
        }
        let matched = &result.matches[0];
        match matched.kind {
            MatchKind::Attribute | MatchKind::Text => DataUri::parse(&matched.value),
            MatchKind::Element => {
                let infos = self
                    .tree
                    .backend()
                    .list(selector, kind, &self.namespaces, limit)?;
                let info = infos
                    .first()
                    .ok_or_else(|| Error::NoSuchElement(selector.to_string()))?;
                for key in ["xlink:href", "href", "data", "src"] {
                    if let Some(value) = info.attributes.get(key) {
                        if datauri::is_data_uri(value) {
                            return DataUri::parse(value);
                        }
                    }
                }
                Err(Error::MalformedDataUri(
                    "no data URI found in element attributes".to_string(),
                ))
            }
        }
    }

    // ==================== Persistence ====================

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let bytes = self.tree.backend().serialize()?;
        if self.tree.kind() != BackendKind::LenientHtml {
            return Ok(bytes);
        }
        // the lenient engine emits UTF-8 regardless of the source charset;
        // re-encode so an embedded charset declaration still matches the bytes
        match Encoding::for_label(self.encoding.as_bytes()) {
            Some(enc) => {
                let text = String::from_utf8_lossy(&bytes);
                let (data, _, _) = enc.encode(&text);
                Ok(data.into_owned())
            }
            None => Ok(bytes),
        }
    }

    fn save_target(&self, destination: Option<&Path>) -> Result<PathBuf> {
        match destination {
            Some(path) => Ok(path.to_path_buf()),
            None if source::is_remote(&self.origin) => Err(Error::UnsupportedOperation(format!(
                "cannot save back to remote origin '{}'",
                self.origin
            ))),
            None => Ok(PathBuf::from(&self.origin)),
        }
    }

    /// Write the serialized document; `None` writes back to the origin.
    pub fn save(&mut self, destination: Option<&Path>) -> Result<PathBuf> {
        let target = self.save_target(destination)?;
        let bytes = self.serialize()?;
        fs::write(&target, &bytes)?;
        self.dirty = false;
        debug!(path = %target.display(), len = bytes.len(), "saved document");
        Ok(target)
    }

    /// Like [`save`](Self::save), but first copies an existing target
    /// aside with a `.bak` suffix.
    pub fn save_with_backup(&mut self, destination: Option<&Path>) -> Result<PathBuf> {
        let target = self.save_target(destination)?;
        if target.exists() {
            let backup = backup_path(&target);
            fs::copy(&target, &backup)?;
            debug!(path = %backup.display(), "wrote backup");
        }
        self.save(Some(&target))
    }

    /// Copy the origin file aside with a `.bak` suffix, untouched.
    pub fn backup(&self) -> Result<PathBuf> {
        if source::is_remote(&self.origin) {
            return Err(Error::UnsupportedOperation(format!(
                "cannot back up remote origin '{}'",
                self.origin
            )));
        }
        let origin = Path::new(&self.origin);
        let backup = backup_path(origin);
        fs::copy(origin, &backup)?;
        Ok(backup)
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".bak");
    PathBuf::from(os)
}
