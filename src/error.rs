//! Fanart error types

use std::time::Duration;

/// Fanart error types.
///
/// `Clone` so that the outcome of a single upstream fetch can be handed to
/// every request waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FanartError {
    // Upstream errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("upstream returned HTTP {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    // Data errors
    #[error("parse error: {0}")]
    Parse(String),

    // Terminal outcomes
    #[error("fanart not found")]
    NotFound,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FanartError {
    /// Whether the resolver should absorb this error and move on to the next
    /// fallback stage.
    ///
    /// Upstream and parse failures degrade gracefully; everything else is
    /// terminal for the request.
    pub fn is_fallback_trigger(&self) -> bool {
        matches!(
            self,
            FanartError::Http(_)
                | FanartError::UpstreamStatus { .. }
                | FanartError::Timeout(_)
                | FanartError::Parse(_)
        )
    }
}

impl From<serde_json::Error> for FanartError {
    fn from(err: serde_json::Error) -> Self {
        FanartError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for FanartError {
    fn from(err: reqwest::Error) -> Self {
        FanartError::Http(err.to_string())
    }
}

/// Result type alias for fanart operations
pub type Result<T> = std::result::Result<T, FanartError>;
