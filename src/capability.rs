//! Capability detection
//!
//! Optional parsing, query and network features are compiled in behind cargo
//! features. The resulting flag set is computed once per process and is
//! read-only afterwards, so it can be shared freely across threads.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Which optional features this build provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Full XPath 1.0 queries against strictly parsed XML/SVG
    pub xpath: bool,
    /// CSS selector queries against leniently parsed HTML
    pub css: bool,
    /// Loading documents from http/https origins
    pub remote_fetch: bool,
}

impl Capabilities {
    fn detect() -> Self {
        Self {
            xpath: cfg!(feature = "xpath"),
            css: cfg!(feature = "css"),
            remote_fetch: cfg!(feature = "remote-fetch"),
        }
    }

    /// Look up a capability by its wire name. Unknown names are reported
    /// as absent rather than as an error.
    pub fn has(&self, name: &str) -> bool {
        match name {
            "xpath" => self.xpath,
            "css" => self.css,
            "remote-fetch" => self.remote_fetch,
            _ => false,
        }
    }
}

static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

/// The capability set of this process, computed on first use.
pub fn capabilities() -> &'static Capabilities {
    CAPABILITIES.get_or_init(|| {
        let caps = Capabilities::detect();
        tracing::debug!(
            xpath = caps.xpath,
            css = caps.css,
            remote_fetch = caps.remote_fetch,
            "detected capabilities"
        );
        caps
    })
}
