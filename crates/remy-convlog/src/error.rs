use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvLogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid session key: {0}")]
    InvalidKey(String),
}

impl From<ConvLogError> for remy_core::RemyError {
    fn from(e: ConvLogError) -> Self {
        match e {
            ConvLogError::InvalidKey(k) => remy_core::RemyError::Validation(k),
            other => remy_core::RemyError::Storage(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvLogError>;
