//! Error types for Recall

use thiserror::Error;

/// Result type alias for Recall operations
pub type Result<T> = std::result::Result<T, RecallError>;

/// Main error type for Recall
#[derive(Error, Debug)]
pub enum RecallError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Store is closed")]
    Closed,

    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Language model error: {0}")]
    Model(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecallError {
    /// Errors recovered locally by falling back to the deterministic path
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, RecallError::Model(_) | RecallError::Embedding(_))
    }
}
