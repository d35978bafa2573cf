use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection};
use tokio::sync::watch;
use tracing::{error, info, warn};

use remy_core::ChatTransport;

use crate::error::Result;
use crate::types::{DeliveryStatus, OutboundEntry};

/// Write-ahead outbound message queue (spec §4.I), grounded in the
/// scheduler engine's 1-second `tokio::time::interval` + `watch::Receiver`
/// shutdown shape (`skynet-scheduler::engine::SchedulerEngine::run`),
/// applied to a delivery table instead of a jobs table.
pub struct OutboundQueue {
    conn: Mutex<Connection>,
    max_attempts: u32,
    retention_days: i64,
}

impl OutboundQueue {
    pub fn new(conn: Connection, max_attempts: u32, retention_days: i64) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_attempts,
            retention_days,
        })
    }

    /// Enqueues a message *before* any transport call is attempted, so a
    /// crash mid-send still leaves a durable pending row to replay.
    pub fn enqueue(&self, user_id: &str, content: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO outbound_queue (user_id, content, status, attempts, created_at, updated_at)
             VALUES (?1, ?2, 'pending', 0, ?3, ?3)",
            params![user_id, content, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// On startup, any row left in `sending` is evidence of a crash
    /// mid-delivery — reset it to `pending` so the processor retries it.
    pub fn replay_on_startup(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let n = conn.execute(
            "UPDATE outbound_queue SET status = 'pending', updated_at = ?1 WHERE status = 'sending'",
            params![now],
        )?;
        if n > 0 {
            warn!(count = n, "requeued in-flight deliveries interrupted by restart");
        }
        Ok(n)
    }

    fn due_pending(&self, limit: usize) -> Result<Vec<OutboundEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, content, status, attempts, last_error, message_id, created_at, updated_at
             FROM outbound_queue WHERE status = 'pending' ORDER BY created_at LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], row_to_entry)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Records the transport's own id for a delivered row, so a later
    /// `edit_message` (or a post-restart audit) can find it.
    fn record_message_id(&self, id: i64, message_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE outbound_queue SET message_id = ?1 WHERE id = ?2",
            params![message_id, id],
        )?;
        Ok(())
    }

    fn mark(&self, id: i64, status: DeliveryStatus, attempts: u32, error: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE outbound_queue SET status = ?1, attempts = ?2, last_error = ?3, updated_at = ?4 WHERE id = ?5",
            params![status.to_string(), attempts, error, now, id],
        )?;
        Ok(())
    }

    pub fn cleanup_old(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let cutoff = (Utc::now() - chrono::Duration::days(self.retention_days)).to_rfc3339();
        let n = conn.execute(
            "DELETE FROM outbound_queue WHERE status IN ('sent', 'failed') AND updated_at < ?1",
            params![cutoff],
        )?;
        Ok(n)
    }

    /// One poll tick: attempts delivery of every pending row via `transport`.
    async fn tick(&self, transport: &dyn ChatTransport) {
        let due = match self.due_pending(50) {
            Ok(d) => d,
            Err(e) => {
                error!("delivery queue poll failed: {e}");
                return;
            }
        };

        for entry in due {
            if self.mark(entry.id, DeliveryStatus::Sending, entry.attempts, None).is_err() {
                continue;
            }

            let user = remy_core::UserId::from(entry.user_id.clone());
            match transport.send_message(&user, &entry.content).await {
                Ok(_) => {
                    let _ = self.mark(entry.id, DeliveryStatus::Sent, entry.attempts + 1, None);
                    info!(id = entry.id, user_id = %entry.user_id, "delivered queued message");
                }
                Err(e) => {
                    let attempts = entry.attempts + 1;
                    if attempts >= self.max_attempts {
                        let _ = self.mark(entry.id, DeliveryStatus::Failed, attempts, Some(&e.to_string()));
                        error!(id = entry.id, attempts, "delivery permanently failed");
                    } else {
                        let _ = self.mark(entry.id, DeliveryStatus::Pending, attempts, Some(&e.to_string()));
                        warn!(id = entry.id, attempts, "delivery failed, will retry");
                    }
                }
            }
        }
    }

    /// Main event loop: polls every `poll_interval_secs` until `shutdown`
    /// broadcasts `true`.
    pub async fn run(
        self: Arc<Self>,
        transport: Arc<dyn ChatTransport>,
        poll_interval_secs: u64,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("outbound delivery queue started");
        if let Err(e) = self.replay_on_startup() {
            error!("delivery replay-on-startup failed: {e}");
        }

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(poll_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(transport.as_ref()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("outbound delivery queue shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Durably logs `content` for `user_id`, then attempts delivery through
    /// `transport` immediately — this is what lets a caller keep
    /// `ChatTransport::send_message`'s synchronous-id contract (a stable id
    /// to target with `edit_message` while a reply streams in) while still
    /// getting a write-ahead record first. A crash between the `enqueue`
    /// and this send attempt still leaves a `pending` row for `run`'s next
    /// tick (or `replay_on_startup` on the following boot) to redeliver; a
    /// failed attempt here is left `pending` for the same reason rather
    /// than being marked `failed` immediately.
    pub async fn send_now(&self, transport: &dyn ChatTransport, user_id: &str, content: &str) -> Result<String> {
        let id = self.enqueue(user_id, content)?;
        self.mark(id, DeliveryStatus::Sending, 0, None)?;

        let user = remy_core::UserId::from(user_id.to_string());
        match transport.send_message(&user, content).await {
            Ok(message_id) => {
                self.mark(id, DeliveryStatus::Sent, 1, None)?;
                self.record_message_id(id, &message_id)?;
                Ok(message_id)
            }
            Err(e) => {
                self.mark(id, DeliveryStatus::Pending, 0, Some(&e.to_string()))?;
                warn!(id, error = %e, "immediate delivery failed, queued for retry");
                Err(crate::error::DeliveryError::Transport(e.to_string()))
            }
        }
    }

    pub fn depth(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM outbound_queue WHERE status IN ('pending', 'sending')",
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboundEntry> {
    let status_str: String = row.get(3)?;
    Ok(OutboundEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        status: status_str.parse().unwrap_or(DeliveryStatus::Pending),
        attempts: row.get(4)?,
        last_error: row.get(5)?,
        message_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyTransport {
        fail_times: AtomicUsize,
    }

    #[async_trait]
    impl ChatTransport for FlakyTransport {
        async fn send_message(&self, _user: &remy_core::UserId, _text: &str) -> remy_core::Result<String> {
            if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(remy_core::RemyError::Transient("simulated outage".into()))
            } else {
                Ok("msg-1".to_string())
            }
        }
        async fn edit_message(&self, _user: &remy_core::UserId, _id: &str, _text: &str) -> remy_core::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn sending_row_is_replayed_as_pending_after_restart() {
        let queue = OutboundQueue::new(Connection::open_in_memory().unwrap(), 3, 7).unwrap();
        let id = queue.enqueue("u1", "hello").unwrap();
        queue.mark(id, DeliveryStatus::Sending, 0, None).unwrap();

        queue.replay_on_startup().unwrap();
        let due = queue.due_pending(10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let queue = Arc::new(OutboundQueue::new(Connection::open_in_memory().unwrap(), 5, 7).unwrap());
        queue.enqueue("u1", "hello").unwrap();
        let transport = FlakyTransport { fail_times: AtomicUsize::new(2) };

        queue.tick(&transport).await;
        queue.tick(&transport).await;
        queue.tick(&transport).await;

        assert_eq!(queue.depth().unwrap(), 0);
    }

    #[tokio::test]
    async fn permanent_failure_after_max_attempts() {
        let queue = Arc::new(OutboundQueue::new(Connection::open_in_memory().unwrap(), 2, 7).unwrap());
        queue.enqueue("u1", "hello").unwrap();
        let transport = FlakyTransport { fail_times: AtomicUsize::new(99) };

        queue.tick(&transport).await;
        queue.tick(&transport).await;

        assert_eq!(queue.depth().unwrap(), 0);
    }

    #[tokio::test]
    async fn send_now_logs_then_delivers_and_records_the_message_id() {
        let queue = OutboundQueue::new(Connection::open_in_memory().unwrap(), 3, 7).unwrap();
        let transport = FlakyTransport { fail_times: AtomicUsize::new(0) };

        let message_id = queue.send_now(&transport, "u1", "hello").await.unwrap();
        assert_eq!(message_id, "msg-1");
        assert_eq!(queue.depth().unwrap(), 0);

        let sent: String = queue
            .conn
            .lock()
            .unwrap()
            .query_row("SELECT message_id FROM outbound_queue WHERE user_id = 'u1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(sent, "msg-1");
    }

    #[tokio::test]
    async fn send_now_leaves_a_pending_row_for_the_background_loop_on_failure() {
        let queue = OutboundQueue::new(Connection::open_in_memory().unwrap(), 3, 7).unwrap();
        let transport = FlakyTransport { fail_times: AtomicUsize::new(99) };

        assert!(queue.send_now(&transport, "u1", "hello").await.is_err());
        assert_eq!(queue.depth().unwrap(), 1);

        let due = queue.due_pending(10).unwrap();
        assert_eq!(due.len(), 1, "a failed immediate send must still be retried by the poll loop");
    }
}
