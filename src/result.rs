//! Result types for xedit

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::{BackendKind, DocFormat};

/// Kind of node a query match refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Element,
    Attribute,
    Text,
}

/// A single query match
///
/// `name` carries the element tag for element matches and the attribute
/// name for attribute matches; text matches have no name. `value` is the
/// string value of the matched node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub kind: MatchKind,
    pub name: Option<String>,
    pub value: String,
}

impl Match {
    pub fn element(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Element,
            name: Some(name.into()),
            value: value.into(),
        }
    }

    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Attribute,
            name: Some(name.into()),
            value: value.into(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Text,
            name: None,
            value: value.into(),
        }
    }
}

/// Ordered result of one query
///
/// Matches follow document order; duplicates are not collapsed. `truncated`
/// is set when the match ceiling cut the sequence short.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub matches: Vec<Match>,
    pub truncated: bool,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn count(&self) -> usize {
        self.matches.len()
    }

    pub fn first(&self) -> Option<&Match> {
        self.matches.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Match> {
        self.matches.iter()
    }
}

/// One element in a listing, with its attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementInfo {
    pub tag: String,
    pub text: String,
    pub attributes: BTreeMap<String, String>,
}

/// Summary of a loaded document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub origin: String,
    pub format: DocFormat,
    pub backend: BackendKind,
    pub encoding: String,
    pub dirty: bool,
    pub remote: bool,
}
