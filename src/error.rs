//! Crate-wide error type.

/// Result type alias for memory engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds the core distinguishes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("corrupted snapshot: {0}")]
    CorruptedSnapshot(String),

    #[error("no retention policy matches quality score {0}")]
    PolicyConflict(f32),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is recoverable (caller may retry or fall back).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::NotFound(_) => false,
            Error::InvalidInput(_) => false,
            Error::DimensionMismatch { .. } => false,
            Error::DuplicateId(_) => false,
            Error::Embedding(_) => true,
            Error::Repository(_) => true,
            Error::CorruptedSnapshot(_) => false,
            Error::PolicyConflict(_) => false,
            Error::Serialization(_) => false,
            Error::Io(_) => true,
        }
    }
}
