pub mod db;
pub mod error;
pub mod queue;
pub mod transport;
pub mod types;

pub use error::{DeliveryError, Result};
pub use queue::OutboundQueue;
pub use transport::DurableTransport;
pub use types::{DeliveryStatus, OutboundEntry};
