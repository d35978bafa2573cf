use serde::{Deserialize, Serialize};

/// Sentinel prefix marking a turn's content as tool-use bookkeeping rather
/// than user-facing text (spec §9 open question: kept as a textual prefix
/// over a JSON content-block array, matching the source's own choice).
pub const TOOL_TURN_PREFIX: &str = "[TOOL]";
/// Prefix marking a turn as the single summary produced by compaction.
pub const COMPACTED_SUMMARY_PREFIX: &str = "[COMPACTED SUMMARY]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// One line of a session's `.jsonl` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_tool_turn(&self) -> bool {
        self.content.starts_with(TOOL_TURN_PREFIX)
    }

    pub fn is_compacted_summary(&self) -> bool {
        self.content.starts_with(COMPACTED_SUMMARY_PREFIX)
    }
}
