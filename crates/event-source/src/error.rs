use thiserror::Error;

/// Errors that can occur when fetching events from a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not be reached or answered with a transient failure.
    #[error("Event source unavailable: {0}")]
    Unavailable(String),

    /// The source answered with a non-success HTTP status.
    #[error("Event source returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The JSON-RPC call returned an error object.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The requested cursor is not known to the source.
    #[error("Unknown event cursor: {0}")]
    UnknownCursor(String),

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SourceError {
    /// Returns true when retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Unavailable(_) => true,
            SourceError::Http { status, .. } => *status == 429 || *status >= 500,
            SourceError::Rpc { .. } | SourceError::UnknownCursor(_) | SourceError::Decode(_) => {
                false
            }
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Unavailable(err.to_string())
    }
}

/// Result type for event source operations.
pub type Result<T> = std::result::Result<T, SourceError>;
