use serde::{Deserialize, Serialize};

/// The three kinds of row the knowledge store holds (spec §3 data model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Fact,
    Goal,
    ShoppingItem,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fact => write!(f, "fact"),
            Self::Goal => write!(f, "goal"),
            Self::ShoppingItem => write!(f, "shopping_item"),
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Self::Fact),
            "goal" => Ok(Self::Goal),
            "shopping_item" => Ok(Self::ShoppingItem),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

/// Categories that apply to `fact` rows only (spec §3). Other entity types
/// leave `category` unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    Name,
    Location,
    Occupation,
    Health,
    Medical,
    Finance,
    Hobby,
    Relationship,
    Preference,
    Deadline,
    Project,
    Other,
}

impl std::fmt::Display for FactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Name => "name",
            Self::Location => "location",
            Self::Occupation => "occupation",
            Self::Health => "health",
            Self::Medical => "medical",
            Self::Finance => "finance",
            Self::Hobby => "hobby",
            Self::Relationship => "relationship",
            Self::Preference => "preference",
            Self::Deadline => "deadline",
            Self::Project => "project",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for FactCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "location" => Ok(Self::Location),
            "occupation" => Ok(Self::Occupation),
            "health" => Ok(Self::Health),
            "medical" => Ok(Self::Medical),
            "finance" => Ok(Self::Finance),
            "hobby" => Ok(Self::Hobby),
            "relationship" => Ok(Self::Relationship),
            "preference" => Ok(Self::Preference),
            "deadline" => Ok(Self::Deadline),
            "project" => Ok(Self::Project),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown fact category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Done,
    Abandoned,
}

impl std::fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Done => write!(f, "done"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "done" => Ok(Self::Done),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(format!("unknown goal status: {other}")),
        }
    }
}

/// One row of the unified knowledge store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: i64,
    pub user_id: String,
    pub entity_type: EntityType,
    /// Only meaningful for `fact` rows.
    pub category: Option<FactCategory>,
    /// Only meaningful for `goal` rows.
    pub status: Option<GoalStatus>,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_referenced_at: Option<String>,
}

/// Category-histogram summary used by `get_memory_summary` (spec §4.A).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemorySummary {
    pub fact_count: usize,
    pub category_counts: std::collections::HashMap<String, usize>,
    pub active_goal_count: usize,
    pub shopping_item_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Complete,
    Abandoned,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Complete => "complete",
            Self::Abandoned => "abandoned",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PlanStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "complete" => Ok(Self::Complete),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(format!("unknown plan status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Done,
    Skipped,
    Blocked,
}

impl StepStatus {
    /// Status-line glyph (spec's plan tool family renders these inline),
    /// grounded in `original_source/remy/ai/tools/plans.py`'s `_STATUS_EMOJI`.
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Pending => "⬜",
            Self::InProgress => "🔄",
            Self::Done => "✅",
            Self::Skipped => "⏭️",
            Self::Blocked => "🚫",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Blocked => "blocked",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "skipped" => Ok(Self::Skipped),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("unknown step status: {other}")),
        }
    }
}

/// One logged attempt at a plan step (spec §3: "attempts are append-only").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub step_id: i64,
    pub outcome: String,
    pub notes: Option<String>,
    pub attempted_at: String,
}

/// One step of a plan (spec §3). `position` is unique within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: i64,
    pub plan_id: i64,
    pub position: i64,
    pub title: String,
    pub status: StepStatus,
    pub notes: Option<String>,
    pub attempts: Vec<Attempt>,
}

/// A multi-step plan with its steps and each step's attempt history,
/// returned in full by `get_plan`/`get_plan_by_title` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: PlanStatus,
    pub created_at: String,
    pub updated_at: String,
    pub steps: Vec<PlanStep>,
}

/// Lightweight row used by `list_plans` — step detail and attempt history
/// are dropped in favor of a per-status step count (spec's list view).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub id: i64,
    pub title: String,
    pub status: PlanStatus,
    pub total_steps: usize,
    pub step_counts: std::collections::HashMap<String, usize>,
    pub updated_at: String,
}
