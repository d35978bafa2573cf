//! `reminder` tool — schedule a proactive reminder via the scheduler engine.
//!
//! The AI calls this tool when the user asks "remind me in 2 hours",
//! "check in with me every evening", etc. The tool persists an automation
//! to SQLite via `SchedulerEngine`; the engine fires it and feeds a
//! synthetic user turn into the proactive pipeline at the scheduled time.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use remy_core::types::UserId;
use serde_json::{json, Value};

use crate::pipeline::context::MessageContext;

use super::{Tool, ToolResult};

/// AI tool that creates, lists, and removes scheduled reminders for one user.
pub struct ReminderTool<C: MessageContext + 'static> {
    ctx: Arc<C>,
    user_id: UserId,
}

impl<C: MessageContext + 'static> ReminderTool<C> {
    pub fn new(ctx: Arc<C>, user_id: UserId) -> Self {
        Self { ctx, user_id }
    }

    async fn add_reminder(&self, input: &Value) -> ToolResult {
        let label = match input.get("message").and_then(|v| v.as_str()) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => return ToolResult::error("'message' is required for the add action"),
        };

        let (cron, fire_at): (&str, Option<DateTime<Utc>>) = if let Some(cron) =
            input.get("recurring_cron").and_then(|v| v.as_str())
        {
            (cron, None)
        } else if let Some(fire_at) = input.get("fire_at").and_then(|v| v.as_str()) {
            match DateTime::parse_from_rfc3339(fire_at) {
                Ok(dt) => ("", Some(dt.with_timezone(&Utc))),
                Err(e) => return ToolResult::error(format!("invalid fire_at datetime: {e}")),
            }
        } else if let Some(secs) = input.get("fire_in_seconds").and_then(|v| v.as_i64()) {
            if secs <= 0 {
                return ToolResult::error("fire_in_seconds must be a positive integer");
            }
            ("", Some(Utc::now() + Duration::seconds(secs)))
        } else {
            return ToolResult::error(
                "one of 'fire_at', 'fire_in_seconds', or 'recurring_cron' is required for add",
            );
        };

        match self
            .ctx
            .scheduler()
            .add_automation(self.user_id.as_str(), &label, cron, fire_at)
        {
            Ok(automation) => ToolResult::success(format!(
                "Reminder scheduled!\n- ID: {}\n- Label: {}\n- Fires at: {}",
                automation.id,
                automation.label,
                automation
                    .next_run
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string()),
            )),
            Err(e) => ToolResult::error(format!("failed to schedule reminder: {e}")),
        }
    }

    async fn list_reminders(&self) -> ToolResult {
        match self.ctx.scheduler().list_automations() {
            Ok(automations) => {
                let mine: Vec<_> = automations
                    .into_iter()
                    .filter(|a| a.user_id == self.user_id.as_str())
                    .collect();
                if mine.is_empty() {
                    return ToolResult::success("No reminders scheduled.");
                }
                let mut out = format!("Scheduled reminders ({}):\n", mine.len());
                for a in &mine {
                    out.push_str(&format!(
                        "- ID: {} | Label: {} | Next: {} | Status: {}\n",
                        a.id,
                        a.label,
                        a.next_run.map(|t| t.to_rfc3339()).unwrap_or_else(|| "N/A".to_string()),
                        a.status,
                    ));
                }
                ToolResult::success(out)
            }
            Err(e) => ToolResult::error(format!("failed to list reminders: {e}")),
        }
    }

    async fn remove_reminder(&self, input: &Value) -> ToolResult {
        let id = match input.get("job_id").and_then(|v| v.as_str()) {
            Some(id) if !id.is_empty() => id,
            _ => return ToolResult::error("'job_id' is required for the remove action"),
        };

        match self.ctx.scheduler().remove_automation(id) {
            Ok(()) => ToolResult::success(format!("Reminder '{id}' removed.")),
            Err(e) => ToolResult::error(format!("failed to remove reminder: {e}")),
        }
    }
}

#[async_trait]
impl<C: MessageContext + 'static> Tool for ReminderTool<C> {
    fn name(&self) -> &str {
        "reminder"
    }

    fn description(&self) -> &str {
        "ALWAYS use this tool when the user asks to be reminded, notified, or checked in \
         on at a future time. The reminder is delivered as a message from you once it \
         fires. Do NOT respond with reminder text directly; call this tool instead. \
         Actions: 'add' (create), 'list' (view all), 'remove' (cancel by job_id)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "list", "remove"],
                    "description": "Operation: add a new reminder, list all reminders, or remove one."
                },
                "message": {
                    "type": "string",
                    "description": "What to remind the user about. Required for add."
                },
                "fire_at": {
                    "type": "string",
                    "description": "ISO-8601 UTC datetime when to fire (e.g. '2026-10-20T13:00:00Z')."
                },
                "fire_in_seconds": {
                    "type": "integer",
                    "description": "Seconds from now when to fire the reminder."
                },
                "recurring_cron": {
                    "type": "string",
                    "description": "Five-field cron expression for a recurring reminder, evaluated in the user's local timezone."
                },
                "job_id": {
                    "type": "string",
                    "description": "ID returned by a previous add. Required for remove."
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let action = match input.get("action").and_then(|v| v.as_str()) {
            Some(a) => a,
            None => return ToolResult::error("missing required field 'action'"),
        };

        match action {
            "add" => self.add_reminder(&input).await,
            "list" => self.list_reminders().await,
            "remove" => self.remove_reminder(&input).await,
            other => ToolResult::error(format!(
                "unknown action '{other}': must be 'add', 'list', or 'remove'"
            )),
        }
    }
}
