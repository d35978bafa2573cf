use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;

use remy_core::SessionKey;

use crate::error::Result;
use crate::types::{ConversationTurn, Role};

/// Per-session append-only JSONL conversation log.
///
/// Grounded in the teacher's `AppState::active_operations: DashMap<String,
/// CancellationToken>` per-key concurrency idiom (`skynet-gateway/src/app.rs`),
/// applied here to a per-session-file lock rather than a DB row — the
/// ownership split this spec draws between the session manager (component L,
/// owns the key/lock semantics conceptually) and this crate (owns the bytes
/// on disk) means the lock itself lives here, next to the file it protects.
pub struct ConversationLog {
    root_dir: PathBuf,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl ConversationLog {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            locks: DashMap::new(),
        }
    }

    fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.root_dir.join(format!("{}.jsonl", key.as_str()))
    }

    fn lock_for(&self, key: &SessionKey) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(key.as_str().to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn append_turn(&self, key: &SessionKey, turn: ConversationTurn) -> Result<()> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        fs::create_dir_all(&self.root_dir).await?;
        let line = serde_json::to_string(&turn)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(key))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    pub async fn all_turns(&self, key: &SessionKey) -> Result<Vec<ConversationTurn>> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;
        self.read_turns_locked(key).await
    }

    pub async fn recent_turns(&self, key: &SessionKey, limit: usize) -> Result<Vec<ConversationTurn>> {
        let mut turns = self.all_turns(key).await?;
        if turns.len() > limit {
            turns = turns.split_off(turns.len() - limit);
        }
        Ok(turns)
    }

    async fn read_turns_locked(&self, key: &SessionKey) -> Result<Vec<ConversationTurn>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path).await?;
        let mut turns = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            turns.push(serde_json::from_str(line)?);
        }
        Ok(turns)
    }

    /// Rewrites the session file to a single `[COMPACTED SUMMARY]`-prefixed
    /// turn (spec §4.D compaction contract). Idempotent: compacting an
    /// already-compacted file just replaces the single summary line.
    pub async fn compact(&self, key: &SessionKey, summary: &str) -> Result<()> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let turn = ConversationTurn::new(
            Role::System,
            format!("{} {}", crate::types::COMPACTED_SUMMARY_PREFIX, summary),
        );
        let line = serde_json::to_string(&turn)?;

        fs::create_dir_all(&self.root_dir).await?;
        fs::write(self.path_for(key), format!("{line}\n")).await?;
        Ok(())
    }

    pub fn session_file_path(&self, key: &SessionKey) -> PathBuf {
        self.path_for(key)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remy_core::UserId;

    fn key() -> SessionKey {
        let user = UserId::from("1");
        let day = chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        SessionKey::for_day(&user, day)
    }

    #[tokio::test]
    async fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let log = ConversationLog::new(dir.path());
        let k = key();

        log.append_turn(&k, ConversationTurn::new(Role::User, "hi")).await.unwrap();
        log.append_turn(&k, ConversationTurn::new(Role::Assistant, "hello")).await.unwrap();

        let turns = log.all_turns(&k).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "hi");
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn compaction_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let log = ConversationLog::new(dir.path());
        let k = key();

        for i in 0..10 {
            log.append_turn(&k, ConversationTurn::new(Role::User, format!("msg {i}"))).await.unwrap();
        }
        log.compact(&k, "user discussed ten messages").await.unwrap();
        let first = log.all_turns(&k).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(first[0].is_compacted_summary());

        log.compact(&k, "re-summarized").await.unwrap();
        let second = log.all_turns(&k).await.unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn missing_session_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = ConversationLog::new(dir.path());
        let turns = log.all_turns(&key()).await.unwrap();
        assert!(turns.is_empty());
    }
}
