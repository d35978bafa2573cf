use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The provided cron expression or fire_at combination is invalid.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// No automation with the given ID exists in the store.
    #[error("Automation not found: {id}")]
    NotFound { id: String },

    /// The provided IANA timezone name could not be resolved.
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

impl From<SchedulerError> for remy_core::RemyError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::NotFound { id } => {
                remy_core::RemyError::Validation(format!("automation not found: {id}"))
            }
            SchedulerError::InvalidSchedule(msg) | SchedulerError::InvalidTimezone(msg) => {
                remy_core::RemyError::Validation(msg)
            }
            SchedulerError::Database(e) => remy_core::RemyError::Storage(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
