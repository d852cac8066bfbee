use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid query: {0}")]
    Validation(#[from] ValidationError),

    #[error("Search session is closed")]
    SessionClosed,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// A committed value that must never reach the fetch layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("query is empty")]
    Empty,

    #[error("query is too long ({actual} characters, at most {max} allowed)")]
    TooLong { max: usize, actual: usize },

    #[error("query contains control characters")]
    ControlCharacters,
}

/// Failure reported by a fetch collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
