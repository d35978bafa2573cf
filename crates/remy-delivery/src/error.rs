use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("entry not found: {id}")]
    NotFound { id: i64 },

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<DeliveryError> for remy_core::RemyError {
    fn from(e: DeliveryError) -> Self {
        remy_core::RemyError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DeliveryError>;
