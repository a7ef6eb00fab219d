//! Engine options

/// Default cap on the number of matches a single query may return.
pub const DEFAULT_MATCH_LIMIT: usize = 4096;

/// Default network timeout for remote origins, in seconds.
pub const DEFAULT_NETWORK_TIMEOUT: u64 = 60;

/// Tunables applied when loading and querying a document.
#[derive(Debug, Clone)]
pub struct Options {
    /// Upper bound on matches returned by one query; results beyond it are
    /// dropped and the result is flagged as truncated.
    pub match_limit: usize,
    /// Network timeout in seconds for remote origins; 0 disables the timeout.
    pub timeout: u64,
    /// User-Agent header for remote fetches; `None` uses the client default.
    pub user_agent: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            match_limit: DEFAULT_MATCH_LIMIT,
            timeout: DEFAULT_NETWORK_TIMEOUT,
            user_agent: None,
        }
    }
}
