use std::sync::Arc;

use async_trait::async_trait;

use remy_core::{ChatTransport, Result, UserId};

use crate::queue::OutboundQueue;

/// Wraps a real `ChatTransport` with the write-ahead queue (spec §4.I), so
/// every send is durably logged before the underlying transport is ever
/// called. `edit_message` passes straight through to `inner` — by the time
/// an edit happens the original send has already been logged, and edits
/// aren't replayed independently on restart.
pub struct DurableTransport {
    queue: Arc<OutboundQueue>,
    inner: Arc<dyn ChatTransport>,
}

impl DurableTransport {
    pub fn new(queue: Arc<OutboundQueue>, inner: Arc<dyn ChatTransport>) -> Self {
        Self { queue, inner }
    }
}

#[async_trait]
impl ChatTransport for DurableTransport {
    async fn send_message(&self, user: &UserId, text: &str) -> Result<String> {
        self.queue.send_now(self.inner.as_ref(), user.as_str(), text).await.map_err(Into::into)
    }

    async fn edit_message(&self, user: &UserId, message_id: &str, text: &str) -> Result<()> {
        self.inner.edit_message(user, message_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::sync::Mutex;

    /// Records every `(user, text)` it's asked to send and hands back a
    /// caller-supplied id, mirroring `HttpTransport`'s real shape without
    /// depending on `remy-gateway`.
    struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn send_message(&self, user: &UserId, text: &str) -> Result<String> {
            self.sent.lock().unwrap().push((user.as_str().to_string(), text.to_string()));
            Ok("inner-id".to_string())
        }
        async fn edit_message(&self, _user: &UserId, _id: &str, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_message_durably_logs_before_delegating_to_inner() {
        let queue = Arc::new(OutboundQueue::new(Connection::open_in_memory().unwrap(), 3, 7).unwrap());
        let inner = Arc::new(RecordingTransport { sent: Mutex::new(Vec::new()) });
        let transport = DurableTransport::new(Arc::clone(&queue), inner.clone() as Arc<dyn ChatTransport>);

        let id = transport.send_message(&UserId::from("u1"), "hi").await.unwrap();

        assert_eq!(id, "inner-id");
        assert_eq!(inner.sent.lock().unwrap().as_slice(), &[("u1".to_string(), "hi".to_string())]);
        assert_eq!(queue.depth().unwrap(), 0, "a successful send must not leave a row awaiting redelivery");
    }

    #[tokio::test]
    async fn edit_message_passes_straight_through() {
        let queue = Arc::new(OutboundQueue::new(Connection::open_in_memory().unwrap(), 3, 7).unwrap());
        let inner = Arc::new(RecordingTransport { sent: Mutex::new(Vec::new()) });
        let transport = DurableTransport::new(queue, inner as Arc<dyn ChatTransport>);

        transport.edit_message(&UserId::from("u1"), "inner-id", "edited").await.unwrap();
    }
}
