use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session key: {0}")]
    InvalidKey(String),
}

impl From<SessionError> for remy_core::RemyError {
    fn from(e: SessionError) -> Self {
        remy_core::RemyError::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
