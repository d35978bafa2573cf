//! Plan tracking tools — multi-step plans with per-step status and an
//! append-only attempt history.
//!
//! Five separate tools rather than one multi-action tool (unlike
//! [`super::reminder::ReminderTool`]), matching the original registration
//! shape in `remy/ai/tools/registry.py`: `create_plan`, `get_plan`,
//! `list_plans`, `update_plan_step`, `update_plan_status`.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use remy_core::types::UserId;
use remy_knowledge::{Plan, PlanStatus, PlanStore, StepStatus};
use serde_json::{json, Value};

use super::{Tool, ToolResult};

fn render_plan(plan: &Plan) -> String {
    let mut lines = vec![
        format!("📋 **{}** (ID {})", plan.title, plan.id),
        format!("Status: {}", plan.status),
    ];
    if let Some(description) = &plan.description {
        lines.push(format!("Description: {description}"));
    }
    lines.push(format!(
        "Created: {} | Updated: {}",
        &plan.created_at.get(..10).unwrap_or(&plan.created_at),
        &plan.updated_at.get(..10).unwrap_or(&plan.updated_at),
    ));
    lines.push(String::new());

    for step in &plan.steps {
        lines.push(format!(
            "{}. {} [{}] {} (step ID {})",
            step.position,
            step.status.emoji(),
            step.status,
            step.title,
            step.id,
        ));
        if let Some(notes) = &step.notes {
            lines.push(format!("   Notes: {notes}"));
        }
        for attempt in &step.attempts {
            let stamp = attempt.attempted_at.get(..16).unwrap_or(&attempt.attempted_at);
            let mut line = format!("   → {}: {}", stamp, attempt.outcome);
            if let Some(notes) = &attempt.notes {
                line.push_str(&format!(" — {notes}"));
            }
            lines.push(line);
        }
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// create_plan
// ---------------------------------------------------------------------------

pub struct CreatePlanTool {
    store: Arc<PlanStore>,
    user_id: UserId,
}

impl CreatePlanTool {
    pub fn new(store: Arc<PlanStore>, user_id: UserId) -> Self {
        Self { store, user_id }
    }
}

#[async_trait]
impl Tool for CreatePlanTool {
    fn name(&self) -> &str {
        "create_plan"
    }

    fn description(&self) -> &str {
        "Create a new multi-step plan. Use when the user describes a goal that has discrete \
         actions, may span days or weeks, or where individual steps may need to be retried. \
         Examples: 'make a plan to fix the fence', 'create a plan for switching energy \
         providers', 'I need to organise my tax return'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Short name for the plan (e.g. 'Fix the fence', 'Tax return 2026')."
                },
                "description": {
                    "type": "string",
                    "description": "Optional longer description of the plan's purpose or context."
                },
                "steps": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Ordered list of step titles (e.g. ['Get quotes', 'Hire contractor', 'Supervise work'])."
                }
            },
            "required": ["title", "steps"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let title = input.get("title").and_then(|v| v.as_str()).unwrap_or("").trim().to_string();
        let description = input
            .get("description")
            .and_then(|v| v.as_str())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        let steps: Vec<String> = input
            .get("steps")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        if title.is_empty() {
            return ToolResult::error("Please provide a title for the plan.");
        }
        if steps.is_empty() {
            return ToolResult::error("Please provide at least one step for the plan.");
        }

        let plan_id = match self
            .store
            .create_plan(self.user_id.as_str(), &title, description.as_deref(), &steps)
        {
            Ok(id) => id,
            Err(e) => return ToolResult::error(format!("Could not create plan: {e}")),
        };

        let step_list = steps
            .iter()
            .enumerate()
            .map(|(i, s)| format!("  {}. {}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n");

        ToolResult::success(format!(
            "✅ Plan created (ID {plan_id}): {title}\n\n\
             Steps:\n{step_list}\n\n\
             Use get_plan to see full details, or update_plan_step to log progress."
        ))
    }
}

// ---------------------------------------------------------------------------
// get_plan
// ---------------------------------------------------------------------------

pub struct GetPlanTool {
    store: Arc<PlanStore>,
    user_id: UserId,
}

impl GetPlanTool {
    pub fn new(store: Arc<PlanStore>, user_id: UserId) -> Self {
        Self { store, user_id }
    }
}

#[async_trait]
impl Tool for GetPlanTool {
    fn name(&self) -> &str {
        "get_plan"
    }

    fn description(&self) -> &str {
        "Retrieve a plan by ID or title, including all steps and their full attempt history. \
         Use when the user asks 'what's the status of my fence plan?', 'show me the tax plan', \
         or 'how's that project going?'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan_id": {
                    "type": "integer",
                    "description": "The plan ID (from list_plans). Use this if you know the ID."
                },
                "title": {
                    "type": "string",
                    "description": "Fuzzy title search if plan_id not known (e.g. 'fence', 'tax')."
                }
            },
            "required": []
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let plan_id = input.get("plan_id").and_then(|v| v.as_i64());
        let title = input.get("title").and_then(|v| v.as_str()).unwrap_or("").trim().to_string();

        if plan_id.is_none() && title.is_empty() {
            return ToolResult::error("Please provide either plan_id or a title to search for.");
        }

        let result = if let Some(id) = plan_id {
            self.store.get_plan(id)
        } else {
            self.store.get_plan_by_title(self.user_id.as_str(), &title)
        };

        match result {
            Ok(Some(plan)) => ToolResult::success(render_plan(&plan)),
            Ok(None) => {
                if let Some(id) = plan_id {
                    ToolResult::error(format!("No plan with ID {id} found."))
                } else {
                    ToolResult::error(format!("No plan matching '{title}' found."))
                }
            }
            Err(e) => ToolResult::error(format!("Could not fetch plan: {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// list_plans
// ---------------------------------------------------------------------------

pub struct ListPlansTool {
    store: Arc<PlanStore>,
    user_id: UserId,
}

impl ListPlansTool {
    pub fn new(store: Arc<PlanStore>, user_id: UserId) -> Self {
        Self { store, user_id }
    }
}

#[async_trait]
impl Tool for ListPlansTool {
    fn name(&self) -> &str {
        "list_plans"
    }

    fn description(&self) -> &str {
        "List the user's plans with step progress and last activity. Use when the user asks \
         'what plans do I have?', 'show my active plans', 'what am I working on?'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["active", "complete", "abandoned", "all"],
                    "description": "Filter by plan status. Default: 'active'."
                }
            },
            "required": []
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let status = input.get("status").and_then(|v| v.as_str()).unwrap_or("active").to_string();

        let plans = match self.store.list_plans(self.user_id.as_str(), &status) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Could not list plans: {e}")),
        };

        if plans.is_empty() {
            return if status == "all" {
                ToolResult::success("No plans found. Use create_plan to make one.")
            } else {
                ToolResult::success(format!(
                    "No {status} plans found. Use create_plan to make one, or list_plans with status='all' to see all."
                ))
            };
        }

        let mut lines = vec![format!("📋 Plans ({status}): {}", plans.len()), String::new()];
        for plan in &plans {
            let done = plan.step_counts.get("done").copied().unwrap_or(0);
            let in_progress = plan.step_counts.get("in_progress").copied().unwrap_or(0);
            let pending = plan.step_counts.get("pending").copied().unwrap_or(0);
            let blocked = plan.step_counts.get("blocked").copied().unwrap_or(0);

            let mut progress_parts = Vec::new();
            if done > 0 {
                progress_parts.push(format!("{done} done"));
            }
            if in_progress > 0 {
                progress_parts.push(format!("{in_progress} in progress"));
            }
            if pending > 0 {
                progress_parts.push(format!("{pending} pending"));
            }
            if blocked > 0 {
                progress_parts.push(format!("{blocked} blocked"));
            }
            let progress = if progress_parts.is_empty() {
                "no steps".to_string()
            } else {
                progress_parts.join(", ")
            };

            lines.push(format!("**{}** (ID {})", plan.title, plan.id));
            lines.push(format!("  [{} steps — {progress}]", plan.total_steps));
            lines.push(format!("  Last activity: {}", plan.updated_at.get(..10).unwrap_or(&plan.updated_at)));
            lines.push(String::new());
        }

        ToolResult::success(lines.join("\n"))
    }
}

// ---------------------------------------------------------------------------
// update_plan_step
// ---------------------------------------------------------------------------

pub struct UpdatePlanStepTool {
    store: Arc<PlanStore>,
}

impl UpdatePlanStepTool {
    pub fn new(store: Arc<PlanStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdatePlanStepTool {
    fn name(&self) -> &str {
        "update_plan_step"
    }

    fn description(&self) -> &str {
        "Update the status of a plan step and/or log a new attempt. Use when the user reports \
         progress: 'I called Jim — no answer', 'mark step 2 as done', 'step 1 is blocked \
         waiting on council approval', 'I tried again but still waiting'. Call get_plan first \
         to find the step_id."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "step_id": {
                    "type": "integer",
                    "description": "The step ID (from get_plan)."
                },
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "done", "skipped", "blocked"],
                    "description": "New status for the step. Omit to keep current status."
                },
                "attempt_outcome": {
                    "type": "string",
                    "description": "If this update is the result of an attempt, describe the outcome (e.g. 'no answer', 'sent email', 'approved', 'waiting for callback')."
                },
                "attempt_notes": {
                    "type": "string",
                    "description": "Additional notes about the attempt."
                }
            },
            "required": ["step_id"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let step_id = match input.get("step_id").and_then(|v| v.as_i64()) {
            Some(id) => id,
            None => return ToolResult::error("Please provide step_id. Use get_plan to find step IDs."),
        };
        let status = input.get("status").and_then(|v| v.as_str());
        let attempt_outcome = input
            .get("attempt_outcome")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let attempt_notes = input
            .get("attempt_notes")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let mut results = Vec::new();

        if let Some(status) = status {
            if StepStatus::from_str(status).is_err() {
                return ToolResult::error(format!("unknown step status: {status}"));
            }
            match self.store.update_step_status(step_id, status) {
                Ok(true) => results.push(format!("Status → {status}")),
                Ok(false) => return ToolResult::error(format!("No step with ID {step_id} found.")),
                Err(e) => return ToolResult::error(format!("Could not update step: {e}")),
            }
        }

        if let Some(outcome) = attempt_outcome {
            if let Err(e) = self.store.add_attempt(step_id, outcome, attempt_notes) {
                return ToolResult::error(format!("Could not update step: {e}"));
            }
            results.push(format!("Attempt logged: {outcome}"));

            if status.is_none() {
                if let Err(e) = self.store.update_step_status(step_id, "in_progress") {
                    return ToolResult::error(format!("Could not update step: {e}"));
                }
                results.push("Status → in_progress (auto)".to_string());
            }
        }

        if results.is_empty() {
            return ToolResult::error("No changes made. Provide status and/or attempt_outcome.");
        }

        ToolResult::success(format!("✅ Step {step_id} updated: {}", results.join("; ")))
    }
}

// ---------------------------------------------------------------------------
// update_plan_status
// ---------------------------------------------------------------------------

pub struct UpdatePlanStatusTool {
    store: Arc<PlanStore>,
}

impl UpdatePlanStatusTool {
    pub fn new(store: Arc<PlanStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdatePlanStatusTool {
    fn name(&self) -> &str {
        "update_plan_status"
    }

    fn description(&self) -> &str {
        "Mark an entire plan as complete or abandoned. Use when the user says 'I finished the \
         fence plan', 'mark the tax plan as done', 'abandon the energy switch plan — decided \
         to stay with current provider'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan_id": {
                    "type": "integer",
                    "description": "The plan ID (from list_plans)."
                },
                "status": {
                    "type": "string",
                    "enum": ["complete", "abandoned"],
                    "description": "New status for the plan."
                }
            },
            "required": ["plan_id", "status"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let plan_id = match input.get("plan_id").and_then(|v| v.as_i64()) {
            Some(id) => id,
            None => return ToolResult::error("Please provide plan_id. Use list_plans to find plan IDs."),
        };
        let status = match input.get("status").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::error("Please provide status ('complete' or 'abandoned')."),
        };

        if PlanStatus::from_str(status).is_err() {
            return ToolResult::error(format!("unknown plan status: {status}"));
        }

        match self.store.update_plan_status(plan_id, status) {
            Ok(true) => {
                if status == "complete" {
                    ToolResult::success(format!("✅ Plan {plan_id} marked as complete. Well done! 🎉"))
                } else {
                    ToolResult::success(format!("✅ Plan {plan_id} marked as {status}."))
                }
            }
            Ok(false) => ToolResult::error(format!("No plan with ID {plan_id} found.")),
            Err(e) => ToolResult::error(format!("Could not update plan: {e}")),
        }
    }
}
