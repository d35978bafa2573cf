use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use remy_core::{SessionKey, UserId};

/// Per-user lock + cancel-flag + rate-limit facade (spec §4.L/§5). Persistence
/// of turns belongs exclusively to `remy-convlog`; this manager only derives
/// session keys and serializes/cancels/throttles per-user activity, grounded
/// in the teacher's `AppState::active_operations: DashMap<String,
/// CancellationToken>` idiom (`skynet-gateway/src/app.rs`) rather than its
/// `skynet-sessions` SQLite table (which conflated locking with turn
/// storage).
pub struct SessionManager {
    user_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    cancel_flags: DashMap<String, CancellationToken>,
    /// Sliding-window ring buffer of request timestamps per user (spec §5:
    /// "a small ring-buffer counter per user"). No rate-limiting crate
    /// appears anywhere in the pack's dependency surface for this shape, so
    /// it's a plain `VecDeque` behind the same per-key `DashMap` idiom as
    /// `user_locks`/`cancel_flags`.
    rate_limits: DashMap<String, VecDeque<Instant>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            user_locks: DashMap::new(),
            cancel_flags: DashMap::new(),
            rate_limits: DashMap::new(),
        }
    }

    /// Today's (UTC) session key for `user`.
    pub fn current_session_key(&self, user: &UserId) -> SessionKey {
        SessionKey::today(user)
    }

    /// Acquires the per-user serialization lock. Held for the duration of
    /// one agentic-loop run so a second message from the same user queues
    /// up instead of interleaving tool calls against the same session file.
    pub async fn lock_user(&self, user: &UserId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = self
            .user_locks
            .entry(user.as_str().to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Returns the cancellation token for `user`, creating one if needed.
    /// A tool (or the `/cancel` control surface) calls `.cancel()` on the
    /// token returned here to interrupt an in-flight agentic loop.
    pub fn cancel_token(&self, user: &UserId) -> CancellationToken {
        self.cancel_flags
            .entry(user.as_str().to_string())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// Cancels and replaces the token, so a future turn starts uncancelled.
    pub fn cancel_and_reset(&self, user: &UserId) {
        if let Some(token) = self.cancel_flags.get(user.as_str()) {
            token.cancel();
        }
        self.cancel_flags.insert(user.as_str().to_string(), CancellationToken::new());
        debug!(user = user.as_str(), "cancelled in-flight operation");
    }

    /// Records one request for `user` and reports whether it's within the
    /// sliding window, pruning timestamps older than `window` first. A call
    /// that returns `false` is not itself recorded, so a user stays blocked
    /// until old entries age out rather than resetting on every attempt.
    pub fn check_rate_limit(&self, user: &UserId, window: Duration, max_requests: u32) -> bool {
        let mut entries = self.rate_limits.entry(user.as_str().to_string()).or_default();
        let now = Instant::now();
        while matches!(entries.front(), Some(t) if now.duration_since(*t) > window) {
            entries.pop_front();
        }
        if entries.len() >= max_requests as usize {
            return false;
        }
        entries.push_back(now);
        true
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_key_is_stable_within_a_day() {
        let mgr = SessionManager::new();
        let user = UserId::from("7");
        let a = mgr.current_session_key(&user);
        let b = mgr.current_session_key(&user);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn cancel_and_reset_cancels_old_token_not_new_one() {
        let mgr = SessionManager::new();
        let user = UserId::from("7");
        let old = mgr.cancel_token(&user);
        assert!(!old.is_cancelled());
        mgr.cancel_and_reset(&user);
        assert!(old.is_cancelled());
        let fresh = mgr.cancel_token(&user);
        assert!(!fresh.is_cancelled());
    }

    #[tokio::test]
    async fn per_user_locks_are_independent() {
        let mgr = SessionManager::new();
        let u1 = UserId::from("1");
        let u2 = UserId::from("2");
        let _g1 = mgr.lock_user(&u1).await;
        // Locking a different user must not block.
        let _g2 = tokio::time::timeout(std::time::Duration::from_millis(200), mgr.lock_user(&u2))
            .await
            .expect("lock for a different user should not contend");
    }

    #[tokio::test]
    async fn rate_limit_allows_up_to_max_then_blocks() {
        let mgr = SessionManager::new();
        let user = UserId::from("1");
        let window = std::time::Duration::from_secs(60);
        for _ in 0..10 {
            assert!(mgr.check_rate_limit(&user, window, 10));
        }
        assert!(!mgr.check_rate_limit(&user, window, 10), "the 11th request within the window should be blocked");
    }

    #[tokio::test]
    async fn rate_limit_resets_once_the_window_elapses() {
        let mgr = SessionManager::new();
        let user = UserId::from("1");
        let window = std::time::Duration::from_millis(30);
        assert!(mgr.check_rate_limit(&user, window, 1));
        assert!(!mgr.check_rate_limit(&user, window, 1));
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(mgr.check_rate_limit(&user, window, 1));
    }

    #[tokio::test]
    async fn rate_limits_are_independent_per_user() {
        let mgr = SessionManager::new();
        let u1 = UserId::from("1");
        let u2 = UserId::from("2");
        let window = std::time::Duration::from_secs(60);
        assert!(mgr.check_rate_limit(&u1, window, 1));
        assert!(!mgr.check_rate_limit(&u1, window, 1));
        assert!(mgr.check_rate_limit(&u2, window, 1), "a different user's count must not be shared");
    }
}
