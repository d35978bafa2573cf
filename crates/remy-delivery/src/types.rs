use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

/// A write-ahead outbound message (spec §3/§4.I). Enqueued *before* the
/// transport call is attempted, so a crash mid-send still has a durable
/// record to replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEntry {
    pub id: i64,
    pub user_id: String,
    pub content: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// The transport's own id for this message, once delivered — lets a
    /// follow-up `edit_message` target it after a restart.
    pub message_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
