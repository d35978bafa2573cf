pub mod config;
pub mod error;
pub mod sanitize;
pub mod types;

pub use config::RemyConfig;
pub use error::{RemyError, Result};
pub use types::{ChatTransport, SessionKey, TokenUsage, UserId};

/// Initializes the `tracing` subscriber from `RUST_LOG` (default `info`),
/// grounded in the teacher's gateway startup sequence.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
