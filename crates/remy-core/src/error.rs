use thiserror::Error;

/// Error taxonomy shared across the workspace (spec §7).
///
/// Each variant maps to one of the seven classes the gateway uses to decide
/// retry/backoff/surface-to-user behaviour. Per-crate error enums convert
/// into this one with `#[from]` at the boundary.
#[derive(Debug, Error)]
pub enum RemyError {
    /// Upstream provider hiccup: worth retrying with backoff.
    #[error("transient: {0}")]
    Transient(String),

    /// Upstream rejected the request outright; retrying won't help.
    #[error("permanent: {0}")]
    Permanent(String),

    /// A dependency (provider, scheduler, queue) is down right now.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A tool executor failed; the loop should surface this as a tool_result error.
    #[error("tool error ({name}): {reason}")]
    Tool { name: String, reason: String },

    /// Sqlite / filesystem failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Caller-supplied input failed validation (session key, config, schema).
    #[error("validation error: {0}")]
    Validation(String),

    /// The operation was cancelled via a user's cancel flag.
    #[error("cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RemyError {
    /// Short machine-readable code, surfaced on `/diagnostics` and in logs.
    pub fn code(&self) -> &'static str {
        match self {
            RemyError::Transient(_) => "TRANSIENT",
            RemyError::Permanent(_) => "PERMANENT",
            RemyError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            RemyError::Tool { .. } => "TOOL_ERROR",
            RemyError::Storage(_) => "STORAGE_ERROR",
            RemyError::Validation(_) => "VALIDATION_ERROR",
            RemyError::Cancelled => "CANCELLED",
            RemyError::Config(_) => "CONFIG_ERROR",
            RemyError::Io(_) => "IO_ERROR",
            RemyError::Json(_) => "JSON_ERROR",
        }
    }

    /// Whether the agentic loop / router should retry this error with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemyError::Transient(_) | RemyError::ServiceUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, RemyError>;
