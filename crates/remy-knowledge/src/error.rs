use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("embedding error: {0}")]
    Embedding(#[from] remy_embeddings::EmbeddingError),

    #[error("knowledge item not found: {id}")]
    NotFound { id: i64 },

    #[error("invalid entity type: {0}")]
    InvalidEntityType(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),
}

impl From<KnowledgeError> for remy_core::RemyError {
    fn from(e: KnowledgeError) -> Self {
        remy_core::RemyError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KnowledgeError>;
