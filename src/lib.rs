//! Query and edit XML, SVG and HTML documents through one interface.
//!
//! A [`Document`] is loaded from a local path, an `http(s)` URL or raw
//! bytes, parsed by the best engine the build carries, and then queried
//! with XPath or CSS selectors and edited in place. Embedded `data:` URIs
//! can be decoded straight out of matched nodes.
//!
//! Which engines exist is decided at compile time by the `xpath`, `css`
//! and `remote-fetch` features; [`capabilities`] reports the set baked
//! into the running binary.
//!
//! ```rust,ignore
//! use xedit::{ApplyMode, Document, QueryKind};
//!
//! let mut doc = Document::load("logo.svg")?;
//! for m in doc.query("//svg:text", QueryKind::XPath)?.iter() {
//!     println!("{:?}: {}", m.name, m.value);
//! }
//! doc.set_text("//svg:text[@id='title']", QueryKind::XPath, "Hello", ApplyMode::First)?;
//! let png = doc.extract("//svg:image/@xlink:href", QueryKind::XPath)?;
//! doc.save(None)?;
//! ```

#[cfg(feature = "xpath")]
pub mod backend_full;
#[cfg(feature = "css")]
pub mod backend_html;
pub mod backend_minimal;
pub mod capability;
pub mod datauri;
pub mod document;
pub mod error;
pub mod ns;
pub mod options;
pub mod pathexpr;
pub mod result;
pub mod source;
pub mod traits;

pub use capability::{capabilities, Capabilities};
pub use datauri::{is_data_uri, DataUri};
pub use document::{BackendKind, DocFormat, Document};
pub use error::{Error, Result};
pub use options::Options;
pub use result::{DocumentInfo, ElementInfo, Match, MatchKind, QueryResult};
pub use traits::{ApplyMode, QueryKind, TreeBackend};
