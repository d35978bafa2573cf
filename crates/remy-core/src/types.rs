use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RemyError, Result};

/// Identifies an allow-listed user. Carried as an opaque string (the
/// transport's native id, e.g. a Telegram chat id) rather than a freshly
/// minted UUID — the allow-list in config is the source of truth for who
/// may talk to the assistant, not this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Session key of the form `user_<id>_<YYYYMMDD>` (UTC day the session
/// started). Used both as the sqlite row key and as the `<key>.jsonl`
/// filename stem, so it is validated against a strict identifier pattern
/// before ever touching the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    /// Derive today's (UTC) session key for a user.
    pub fn today(user: &UserId) -> Self {
        let day = chrono::Utc::now().format("%Y%m%d");
        Self(format!("user_{}_{}", sanitize_id_component(user.as_str()), day))
    }

    pub fn for_day(user: &UserId, day: chrono::NaiveDate) -> Self {
        Self(format!(
            "user_{}_{}",
            sanitize_id_component(user.as_str()),
            day.format("%Y%m%d")
        ))
    }

    /// Parse and validate an externally-supplied key (e.g. a filename stem
    /// read back off disk). Rejects anything that is not exactly
    /// `user_<identifier>_<8 digits>`, which rules out path traversal
    /// (`..`, `/`) and any other filesystem metacharacter.
    pub fn parse(raw: &str) -> Result<Self> {
        if SESSION_KEY_RE.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(RemyError::Validation(format!("invalid session key: {raw}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn sanitize_id_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

static SESSION_KEY_RE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r"^user_[0-9A-Za-z_-]+_[0-9]{8}$").expect("valid regex")
});

/// Token accounting for a single provider call. Additive across the turns
/// of an agentic-loop run: `usage_out.input + usage_out.output` must equal
/// the sum of every iteration's usage (spec invariant).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;
    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            input: self.input + rhs.input,
            output: self.output + rhs.output,
        }
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        self.input += rhs.input;
        self.output += rhs.output;
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = TokenUsage>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), |a, b| a + b)
    }
}

/// The chat-transport collaborator (spec §6): sending and editing messages
/// in whatever channel the user is on. The transport's own implementation
/// (Telegram, Discord, terminal, ...) is out of scope here; this trait is
/// the seam it must implement.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, user: &UserId, text: &str) -> Result<String>;
    async fn edit_message(&self, user: &UserId, message_id: &str, text: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_round_trip() {
        let user = UserId::from("42");
        let day = chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let key = SessionKey::for_day(&user, day);
        assert_eq!(key.as_str(), "user_42_20260801");
        let parsed = SessionKey::parse(key.as_str()).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn session_key_rejects_traversal() {
        assert!(SessionKey::parse("user_../../etc_20260801").is_err());
        assert!(SessionKey::parse("../escape").is_err());
        assert!(SessionKey::parse("user_42_2026080").is_err());
    }

    #[test]
    fn token_usage_is_additive() {
        let turns = vec![
            TokenUsage { input: 10, output: 5 },
            TokenUsage { input: 20, output: 8 },
            TokenUsage { input: 3, output: 1 },
        ];
        let total: TokenUsage = turns.iter().copied().sum();
        let expected: u64 = turns.iter().map(|t| t.total()).sum();
        assert_eq!(total.total(), expected);
    }
}
