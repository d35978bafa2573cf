use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an automation's pending fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationStatus {
    /// Waiting for its next fire time.
    Pending,
    /// A one-shot automation that has fired and self-removed.
    Completed,
    /// The scheduled window was skipped (e.g. engine was offline).
    Missed,
}

impl std::fmt::Display for AutomationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AutomationStatus::Pending => "pending",
            AutomationStatus::Completed => "completed",
            AutomationStatus::Missed => "missed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AutomationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AutomationStatus::Pending),
            "completed" => Ok(AutomationStatus::Completed),
            "missed" => Ok(AutomationStatus::Missed),
            other => Err(format!("unknown automation status: {other}")),
        }
    }
}

/// A cron-driven or one-shot trigger that feeds a synthetic user turn into
/// the agentic loop as if it were a user message.
///
/// *Invariant:* exactly one of `cron` or `fire_at` is non-empty (enforced
/// by [`Automation::validate`], not by the type system, since both fields
/// are persisted as nullable columns).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub id: String,
    pub user_id: String,
    pub label: String,
    /// Five-field cron expression, empty string if this is a one-shot.
    pub cron: String,
    /// One-shot fire time; `None` if this is cron-driven.
    pub fire_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub status: AutomationStatus,
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Automation {
    /// Validates the "exactly one of cron/fire_at" invariant before an
    /// automation is accepted by the store.
    pub fn validate(cron: &str, fire_at: &Option<DateTime<Utc>>) -> Result<(), String> {
        match (cron.is_empty(), fire_at.is_some()) {
            (false, false) | (true, true) => Ok(()),
            (true, false) => Err("automation must set either cron or fire_at".to_string()),
            (false, true) => Err("automation must not set both cron and fire_at".to_string()),
        }
    }

    pub fn is_one_shot(&self) -> bool {
        self.fire_at.is_some()
    }
}
