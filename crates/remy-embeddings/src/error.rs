use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("embedding vector has wrong dimension: expected {expected}, got {got}")]
    BadDimension { expected: usize, got: usize },

    #[error("embedder worker task panicked: {0}")]
    WorkerPanicked(String),
}

impl From<EmbeddingError> for remy_core::RemyError {
    fn from(e: EmbeddingError) -> Self {
        remy_core::RemyError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;
