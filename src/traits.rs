//! The common contract implemented by every tree backend
//!
//! A backend wraps one parsed document and answers queries and mutations
//! against it. Backends differ in what they can do; an operation a backend
//! cannot perform returns an error instead of being absent from the
//! interface, so the dispatching document type stays uniform.

use crate::error::Result;
use crate::ns::NamespaceTable;
use crate::result::{ElementInfo, QueryResult};

/// Selector language of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    XPath,
    Css,
}

/// How a mutation applies when the selector matches several nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Modify only the first match in document order
    First,
    /// Modify every match
    All,
}

/// Query, mutate and serialize one parsed document.
pub trait TreeBackend {
    /// Run a selector and return matches in document order, capped at
    /// `limit`.
    fn query(
        &self,
        selector: &str,
        kind: QueryKind,
        ns: &NamespaceTable,
        limit: usize,
    ) -> Result<QueryResult>;

    /// List matched elements with their attributes, capped at `limit`.
    fn list(
        &self,
        selector: &str,
        kind: QueryKind,
        ns: &NamespaceTable,
        limit: usize,
    ) -> Result<Vec<ElementInfo>>;

    /// Replace the text content of matched elements. Returns the number of
    /// nodes modified; zero matches is not an error.
    fn set_text(
        &mut self,
        selector: &str,
        kind: QueryKind,
        ns: &NamespaceTable,
        value: &str,
        mode: ApplyMode,
    ) -> Result<usize>;

    /// Set an attribute on matched elements. The attribute name may carry a
    /// namespace prefix, resolved through the document's namespace table.
    fn set_attribute(
        &mut self,
        selector: &str,
        kind: QueryKind,
        ns: &NamespaceTable,
        name: &str,
        value: &str,
        mode: ApplyMode,
    ) -> Result<usize>;

    /// Append a new child element under the single element the parent
    /// selector resolves to.
    fn add_element(
        &mut self,
        parent_selector: &str,
        kind: QueryKind,
        ns: &NamespaceTable,
        tag: &str,
        text: Option<&str>,
        attrs: &[(&str, &str)],
    ) -> Result<()>;

    /// Serialize the current tree back to bytes.
    fn serialize(&self) -> Result<Vec<u8>>;
}
