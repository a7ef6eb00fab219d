//! Error types for xedit

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("source unavailable: {origin}: {reason}")]
    SourceUnavailable { origin: String, reason: String },

    #[error("operation not supported: {0}")]
    UnsupportedOperation(String),

    #[error("unknown namespace prefix '{0}'")]
    UnknownNamespacePrefix(String),

    #[error("query kind not available: {0}")]
    UnsupportedQueryKind(String),

    #[error("no element matches '{0}'")]
    NoSuchElement(String),

    #[error("'{selector}' matches {count} nodes, expected exactly one")]
    AmbiguousTarget { selector: String, count: usize },

    #[error("malformed data URI: {0}")]
    MalformedDataUri(String),

    #[error("invalid payload encoding: {0}")]
    InvalidEncoding(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
