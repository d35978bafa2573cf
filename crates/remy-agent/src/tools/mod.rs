//! Tool registry for the agentic loop.
//!
//! Defines the `Tool` trait every tool implements, a `ToolRegistry` that
//! dispatches by name and converts executor panics/errors into a result
//! string instead of propagating, and `register_external` for collaborators
//! (calendar, mail, files, web search) that live outside this crate.

pub mod calendar;
pub mod knowledge;
pub mod plans;
pub mod reminder;
pub mod send_message;

/// Static name/description pairs for every tool this crate registers,
/// independent of any particular user's [`ToolRegistry`] instance — used by
/// the `/tools` slash command, which has no per-user context to build one.
pub fn static_catalog() -> Vec<(&'static str, &'static str)> {
    vec![
        ("knowledge_search", "Search stored facts, goals, and shopping-list items."),
        ("knowledge_write", "Save a fact, goal, or shopping-list item."),
        ("reminder", "Schedule, list, or cancel a proactive reminder."),
        ("send_message", "Send a standalone message outside the current reply."),
        ("calendar_events", "Look up events on the user's calendar (external collaborator)."),
        ("create_plan", "Create a new multi-step plan."),
        ("get_plan", "Retrieve a plan by ID or title, with full step and attempt history."),
        ("list_plans", "List the user's plans with step progress and last activity."),
        ("update_plan_step", "Update a plan step's status and/or log a new attempt."),
        ("update_plan_status", "Mark an entire plan as complete or abandoned."),
    ]
}

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::provider::ToolDefinition;

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text content returned to the LLM.
    pub content: String,
    /// Whether the tool execution failed.
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name for this tool (e.g. "reminder").
    fn name(&self) -> &str;
    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;
    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> serde_json::Value;
    /// Execute the tool with the given input.
    async fn execute(&self, input: serde_json::Value) -> ToolResult;
}

type ExternalExecutor =
    Box<dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> + Send + Sync>;

/// A tool backed by a plain async closure rather than a dedicated struct —
/// the shape external collaborators (calendar, mail, file access, web
/// search) register through [`ToolRegistry::register_external`].
struct ExternalTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
    executor: ExternalExecutor,
}

#[async_trait]
impl Tool for ExternalTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn input_schema(&self) -> serde_json::Value {
        self.input_schema.clone()
    }
    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        (self.executor)(input).await
    }
}

/// Name-keyed dispatch table (spec §4.E). Holds both in-core tools and
/// externally registered collaborators; execution never propagates an
/// error past the registry — a failing tool turns into an error-flagged
/// [`ToolResult`] the model sees as a normal turn.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Registers an out-of-scope collaborator by schema and executor instead
    /// of a dedicated `Tool` impl. `executor` receives the raw input object
    /// and returns the result text directly (errors are folded into the
    /// returned text by the caller, matching in-core tools).
    pub fn register_external<F, Fut>(&mut self, name: &str, description: &str, schema: serde_json::Value, executor: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        self.register(Box::new(ExternalTool {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: schema,
            executor: Box::new(move |input| Box::pin(executor(input))),
        }));
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn catalog(&self) -> Vec<(String, String)> {
        self.tools
            .values()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect()
    }

    /// Dispatches by name. Unknown names and panics inside a tool both
    /// surface as `"Tool <name> encountered an error: <msg>"` rather than
    /// aborting the loop.
    pub async fn dispatch(&self, name: &str, input: serde_json::Value) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::error(format!("Tool {name} encountered an error: unknown tool"));
        };

        match std::panic::AssertUnwindSafe(tool.execute(input))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panicked".to_string());
                ToolResult::error(format!("Tool {name} encountered an error: {msg}"))
            }
        }
    }
}
