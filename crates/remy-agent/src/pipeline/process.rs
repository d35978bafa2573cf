//! Non-streaming message pipeline — the regular (non-reminder) turn.
//!
//! Every turn is classified and routed first (spec §4 data flow:
//! `router.classify` ahead of the agentic loop). The routing matrix's own
//! target decides the path: categories the matrix sends to `primary` run
//! the full tool-capable agentic loop, same as before; categories it sends
//! to alt-A/alt-B/local (no tool support on those clients) run through
//! [`crate::router::Router::stream`] instead, getting its classification
//! cache and fallback-to-local chain for free.
//!
//! Steps: classify + route → load recent history → build system prompt
//! (persona + memory block + session info) → run either the tool loop or
//! the router stream → persist every turn it produced → return the final
//! text.

use std::sync::Arc;

use tracing::{info, warn};

use remy_core::types::UserId;
use remy_core::SessionKey;
use remy_convlog::{ConversationTurn, Role as LogRole};

use crate::agentic_loop::{self, LoopEvent};
use crate::provider::{ChatRequest, Message, ProviderError, Role as ProviderRole};
use crate::router::Target;
use crate::stream::StreamEvent;
use crate::tools::calendar;
use crate::tools::knowledge::{KnowledgeSearchTool, KnowledgeWriteTool};
use crate::tools::plans::{CreatePlanTool, GetPlanTool, ListPlansTool, UpdatePlanStatusTool, UpdatePlanStepTool};
use crate::tools::reminder::ReminderTool;
use crate::tools::send_message::SendMessageTool;
use crate::tools::ToolRegistry;

use super::compact::compact_session_if_needed;
use super::context::MessageContext;
use super::history::{tool_turns_from_round, turns_to_raw_messages};

const HISTORY_TURN_LIMIT: usize = 40;

/// Result of a completed non-streaming pipeline turn.
pub struct ProcessedMessage {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
}

/// Runs one full turn for `user_id` and persists the turns it produces.
///
/// Classifies and routes first: the routing matrix's own target decides
/// whether this turn gets the tool-capable agentic loop (`primary`) or a
/// plain routed stream through alt-A/alt-B/local (spec §4.G) with no tool
/// access. Either way the memory-augmented system prompt and conversation
/// history are shared.
pub async fn process_message_non_streaming<C: MessageContext + 'static>(
    ctx: &Arc<C>,
    user_id: &UserId,
    content: &str,
) -> Result<ProcessedMessage, ProviderError> {
    let session_key = SessionKey::today(user_id);

    let category = ctx.router().classify(content).await;
    let target = ctx.router().target_for(category, content);

    let memory_context = match ctx.memory().build_context(user_id.as_str(), content).await {
        Ok(block) => block,
        Err(e) => {
            warn!(error = %e, user = %user_id, "pipeline: memory context build failed, continuing without it");
            String::new()
        }
    };

    let history = match ctx.convlog().recent_turns(&session_key, HISTORY_TURN_LIMIT).await {
        Ok(turns) => turns,
        Err(e) => {
            warn!(error = %e, session = %session_key.as_str(), "pipeline: failed to load history");
            Vec::new()
        }
    };

    let turn_count = history.len() as u32;
    let now = chrono::Utc::now();
    let session_info = crate::prompt::SessionInfo {
        session_key: session_key.as_str().to_string(),
        turn_count,
        timestamp: now.format("%Y-%m-%d %H:%M UTC").to_string(),
    };
    let prompt_builder = ctx.agent().prompt().await;
    let system_prompt = prompt_builder.build_prompt(Some(&memory_context), Some(&session_info));
    let plain = system_prompt.to_plain_text();
    drop(prompt_builder);

    let (final_text, usage, model) = if matches!(target, Target::Primary) {
        run_tool_loop(ctx, user_id, &session_key, content, &history, plain, system_prompt).await?
    } else {
        run_routed_stream(ctx, content, &history, &plain).await?
    };

    info!(
        category = ?category,
        tokens_in = usage.0,
        tokens_out = usage.1,
        session = %session_key.as_str(),
        "pipeline: chat complete"
    );

    if !final_text.is_empty() {
        let _ = ctx
            .convlog()
            .append_turn(&session_key, ConversationTurn::new(LogRole::User, content))
            .await;
        let _ = ctx
            .convlog()
            .append_turn(&session_key, ConversationTurn::new(LogRole::Assistant, final_text.clone()))
            .await;

        let ctx_clone = Arc::clone(ctx);
        let sk = session_key.clone();
        tokio::spawn(async move {
            compact_session_if_needed(ctx_clone, sk).await;
        });
    }

    Ok(ProcessedMessage {
        content: final_text,
        model,
        tokens_in: usage.0,
        tokens_out: usage.1,
        stop_reason: "end_turn".to_string(),
    })
}

/// Tool-capable path: the primary provider, full agentic loop, persisting
/// every intermediate tool round as it completes.
async fn run_tool_loop<C: MessageContext + 'static>(
    ctx: &Arc<C>,
    user_id: &UserId,
    session_key: &SessionKey,
    content: &str,
    history: &[ConversationTurn],
    plain: String,
    system_prompt: crate::prompt::SystemPrompt,
) -> Result<(String, (u32, u32), String), ProviderError> {
    let tools = build_registry(ctx, user_id);

    let mut raw_messages = turns_to_raw_messages(history);
    raw_messages.push(serde_json::json!({ "role": "user", "content": content }));

    let model = ctx.agent().get_model().await;
    let request = ChatRequest {
        model,
        system: plain,
        system_prompt: Some(system_prompt),
        messages: Vec::<Message>::new(),
        max_tokens: 4096,
        stream: false,
        thinking: None,
        tools: tools.definitions(),
        raw_messages: Some(raw_messages),
    };

    let max_iterations = ctx.config().agent.max_tool_iterations;
    let (tx, mut rx) = tokio::sync::mpsc::channel::<LoopEvent>(64);

    let session_key_for_persist = session_key.clone();
    let ctx_for_persist = Arc::clone(ctx);
    let persist_task = tokio::spawn(async move {
        let mut final_text = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                LoopEvent::TextChunk(chunk) => final_text.push_str(&chunk),
                LoopEvent::ToolStatusChunk { .. } | LoopEvent::ToolResultChunk { .. } => {}
                LoopEvent::ToolTurnComplete {
                    assistant_blocks,
                    tool_result_blocks,
                } => {
                    let (assistant_turn, result_turn) = tool_turns_from_round(assistant_blocks, tool_result_blocks);
                    if let Err(e) = ctx_for_persist.convlog().append_turn(&session_key_for_persist, assistant_turn).await {
                        warn!(error = %e, "pipeline: failed to persist tool-use turn");
                    }
                    if let Err(e) = ctx_for_persist.convlog().append_turn(&session_key_for_persist, result_turn).await {
                        warn!(error = %e, "pipeline: failed to persist tool-result turn");
                    }
                    // Text accumulated ahead of a tool round belongs to that
                    // round's assistant turn, not the final reply.
                    final_text.clear();
                }
            }
        }
        final_text
    });

    let usage = agentic_loop::run(ctx.agent().provider(), &tools, request, max_iterations, tx).await?;
    let final_text = persist_task.await.unwrap_or_default();
    let model = ctx.agent().get_model().await;
    Ok((final_text, (usage.tokens_in as u32, usage.tokens_out as u32), model))
}

/// No-tool path: turns classified away from `primary` run through
/// [`crate::router::Router::stream`], getting its classification cache and
/// local-fallback chain instead of the tool loop.
async fn run_routed_stream<C: MessageContext + 'static>(
    ctx: &Arc<C>,
    content: &str,
    history: &[ConversationTurn],
    system: &str,
) -> Result<(String, (u32, u32), String), ProviderError> {
    let messages: Vec<Message> = history
        .iter()
        .filter(|t| !t.is_tool_turn() && !t.is_compacted_summary())
        .map(|t| Message {
            role: match t.role {
                LogRole::User => ProviderRole::User,
                LogRole::Assistant => ProviderRole::Assistant,
                LogRole::System => ProviderRole::System,
            },
            content: t.content.clone(),
        })
        .collect();

    let (tx, mut rx) = tokio::sync::mpsc::channel::<StreamEvent>(64);
    let router = ctx.router();
    let send = router.stream(content, &messages, Some(system), tx);
    let mut final_text = String::new();
    let recv = async {
        while let Some(event) = rx.recv().await {
            if let StreamEvent::TextDelta { text } = event {
                final_text.push_str(&text);
            }
        }
    };
    let (result, ()) = tokio::join!(send, recv);
    result?;

    let usage = router.last_usage().await;
    let model = router.last_model().await;
    Ok((final_text, (usage.tokens_in, usage.tokens_out), model))
}

/// Builds the per-user tool registry: knowledge search/write, reminders,
/// `send_message`, the plan-tracking family, plus the illustrative
/// `calendar_events` collaborator.
pub(crate) fn build_registry<C: MessageContext + 'static>(ctx: &Arc<C>, user_id: &UserId) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    let threshold = ctx.config().memory.fact_merge_threshold;
    let plans = Arc::clone(ctx.plans());
    tools.register(Box::new(KnowledgeSearchTool::new(Arc::clone(ctx), user_id.clone())));
    tools.register(Box::new(KnowledgeWriteTool::new(Arc::clone(ctx), user_id.clone(), threshold)));
    tools.register(Box::new(ReminderTool::new(Arc::clone(ctx), user_id.clone())));
    tools.register(Box::new(SendMessageTool::new(Arc::clone(ctx), user_id.clone())));
    tools.register(Box::new(CreatePlanTool::new(Arc::clone(&plans), user_id.clone())));
    tools.register(Box::new(GetPlanTool::new(Arc::clone(&plans), user_id.clone())));
    tools.register(Box::new(ListPlansTool::new(Arc::clone(&plans), user_id.clone())));
    tools.register(Box::new(UpdatePlanStepTool::new(Arc::clone(&plans))));
    tools.register(Box::new(UpdatePlanStatusTool::new(plans)));
    tools.register_external("calendar_events", calendar::description(), calendar::schema(), calendar::execute);
    tools
}
