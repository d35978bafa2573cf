//! Knowledge base tools — search and persist user facts, goals, and
//! shopping-list items.
//!
//! The knowledge base is the SQLite-backed `remy-knowledge` store, keyed by
//! entity type (fact/goal/shopping_item) with cosine-similarity merging on
//! facts. These tools are the model's only write path into it; everything
//! else it sees comes from `remy-memory`'s read-only context injection.
//!
//! Two tools:
//! - `knowledge_search` — keyword query, returns matching entries.
//! - `knowledge_write`  — persist a new fact/goal/shopping item.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use remy_core::types::UserId;
use remy_knowledge::types::{EntityType, FactCategory};

use crate::pipeline::context::MessageContext;

use super::{Tool, ToolResult};

// ---------------------------------------------------------------------------
// knowledge_search
// ---------------------------------------------------------------------------

/// Search the knowledge base by keyword, scoped to one user.
pub struct KnowledgeSearchTool<C: MessageContext + 'static> {
    ctx: Arc<C>,
    user_id: UserId,
}

impl<C: MessageContext + 'static> KnowledgeSearchTool<C> {
    pub fn new(ctx: Arc<C>, user_id: UserId) -> Self {
        Self { ctx, user_id }
    }
}

#[async_trait]
impl<C: MessageContext + 'static> Tool for KnowledgeSearchTool<C> {
    fn name(&self) -> &str {
        "knowledge_search"
    }

    fn description(&self) -> &str {
        "Search the persistent knowledge base for facts, goals, and shopping-list items \
         about this user. Use this before claiming not to know something the user may \
         have told you in an earlier conversation. Returns up to 5 matching entries."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keyword or phrase to search for (e.g. 'allergy', 'project deadline')."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let query = match input.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => q.to_string(),
            _ => return ToolResult::error("missing required parameter: query"),
        };

        match self
            .ctx
            .knowledge()
            .search_keyword(self.user_id.as_str(), &query, 5)
        {
            Ok(entries) if entries.is_empty() => {
                ToolResult::success(format!("No knowledge entries found for: {query}"))
            }
            Ok(entries) => {
                let mut out = format!("Found {} entry/entries:\n\n", entries.len());
                for entry in &entries {
                    out.push_str(&format!("### {} ({})\n", entry.entity_type, entry.id));
                    if let Some(category) = entry.category {
                        out.push_str(&format!("category: {category}\n"));
                    }
                    out.push_str(&entry.content);
                    out.push_str("\n\n---\n\n");
                }
                ToolResult::success(out.trim_end_matches("\n\n---\n\n").to_string())
            }
            Err(e) => ToolResult::error(format!("knowledge_search failed: {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// knowledge_write
// ---------------------------------------------------------------------------

/// Persist a fact, goal, or shopping-list item for one user.
pub struct KnowledgeWriteTool<C: MessageContext + 'static> {
    ctx: Arc<C>,
    user_id: UserId,
    fact_merge_threshold: f32,
}

impl<C: MessageContext + 'static> KnowledgeWriteTool<C> {
    pub fn new(ctx: Arc<C>, user_id: UserId, fact_merge_threshold: f32) -> Self {
        Self {
            ctx,
            user_id,
            fact_merge_threshold,
        }
    }
}

#[async_trait]
impl<C: MessageContext + 'static> Tool for KnowledgeWriteTool<C> {
    fn name(&self) -> &str {
        "knowledge_write"
    }

    fn description(&self) -> &str {
        "Save a fact, goal, or shopping-list item the user has shared so it persists across \
         sessions. A fact semantically similar to one already stored in the same category is \
         merged rather than duplicated."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "entity_type": {
                    "type": "string",
                    "enum": ["fact", "goal", "shopping_item"],
                },
                "category": {
                    "type": "string",
                    "description": "Required when entity_type is 'fact': name, location, occupation, health, medical, finance, hobby, relationship, preference, deadline, project, or other.",
                },
                "content": {
                    "type": "string",
                    "description": "The content to store."
                }
            },
            "required": ["entity_type", "content"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let entity_type = match input
            .get("entity_type")
            .and_then(|v| v.as_str())
            .map(EntityType::from_str)
        {
            Some(Ok(t)) => t,
            Some(Err(e)) => return ToolResult::error(e),
            None => return ToolResult::error("missing required parameter: entity_type"),
        };
        let content = match input.get("content").and_then(|v| v.as_str()) {
            Some(c) if !c.trim().is_empty() => c.trim().to_string(),
            _ => return ToolResult::error("missing required parameter: content"),
        };

        let result = match entity_type {
            EntityType::Fact => {
                let category = match input
                    .get("category")
                    .and_then(|v| v.as_str())
                    .map(FactCategory::from_str)
                {
                    Some(Ok(c)) => c,
                    Some(Err(e)) => return ToolResult::error(e),
                    None => return ToolResult::error("'category' is required when entity_type is 'fact'"),
                };
                self.ctx
                    .knowledge()
                    .upsert_fact(self.user_id.as_str(), category, &content, self.fact_merge_threshold)
                    .await
            }
            EntityType::Goal => self.ctx.knowledge().add_goal(self.user_id.as_str(), &content).await,
            EntityType::ShoppingItem => {
                self.ctx
                    .knowledge()
                    .add_shopping_item(self.user_id.as_str(), &content)
                    .await
            }
        };

        match result {
            Ok(id) => ToolResult::success(format!("Saved {entity_type} #{id}: {content}")),
            Err(e) => ToolResult::error(format!("knowledge_write failed: {e}")),
        }
    }
}
