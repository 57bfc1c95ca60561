//! Error types for attribute and snapshot sources
//!
//! These never reach callers of the lookup paths: the coordinator and the
//! snapshot loader log them and degrade to "no data".

/// Errors raised by an attribute or snapshot source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Transport failure
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response
    #[error("unexpected status {status} from {target}")]
    Status {
        /// What was requested
        target: String,
        /// HTTP status code
        status: u16,
    },

    /// Body could not be decoded
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Source URL could not be built
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Local artifact could not be read
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Create status error
    pub fn status(target: impl Into<String>, status: u16) -> Self {
        Self::Status {
            target: target.into(),
            status,
        }
    }

    /// Whether a later attempt may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Io(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Malformed(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Result type alias for source operations
pub type SourceResult<T> = Result<T, SourceError>;
