//! Proactive pipeline (spec §4.K) — makes a fired [`Automation`] behave
//! exactly like a user message: same agentic loop, same tool access, same
//! persisted turn shape, delivered by editing a placeholder message instead
//! of replying to an inbound one.

use std::sync::Arc;

use tracing::{info, warn};

use remy_convlog::{ConversationTurn, Role};
use remy_core::types::UserId;
use remy_core::SessionKey;
use remy_scheduler::Automation;

use crate::agentic_loop::{self, LoopEvent};
use crate::classifier::approx_tokens;
use crate::provider::ChatRequest;

use super::context::MessageContext;
use super::history::{drop_trailing_orphan_tool_turn, tool_turns_from_round, turns_to_raw_messages};
use super::process::build_registry;

const HISTORY_TURN_LIMIT: usize = 40;
const HISTORY_TOKEN_BUDGET: usize = 16_000;
const REMINDER_PREAMBLE: &str = "You have been woken up by a scheduled reminder. Reason about \
    what it's asking and act on it using your tools; do not simply echo the reminder text back.";

/// Runs one proactive turn for a fired automation (spec §4.K steps 1-8).
pub async fn run_proactive_turn<C: MessageContext + 'static>(ctx: Arc<C>, automation: Automation) {
    let user_id = UserId::from(automation.user_id.clone());

    // Step 1: serialize against any concurrent message from the same user.
    let _guard = ctx.sessions().lock_user(&user_id).await;

    let session_key = SessionKey::today(&user_id);

    // Step 2: load and budget-trim recent history.
    let mut history = match ctx.convlog().recent_turns(&session_key, HISTORY_TURN_LIMIT).await {
        Ok(turns) => turns,
        Err(e) => {
            warn!(error = %e, automation = %automation.id, "proactive: failed to load history");
            Vec::new()
        }
    };
    trim_to_token_budget(&mut history, HISTORY_TOKEN_BUDGET);

    // Step 3: never resume on an unresolved tool call.
    drop_trailing_orphan_tool_turn(&mut history);

    // Step 4: synthesize the reminder turn. Not persisted until the stream
    // actually starts, so a crash before that point leaves nothing to
    // replay incorrectly on the next fire.
    let reminder_text = format!("[Reminder] {}", automation.label);

    // Step 5: augmented system prompt.
    let memory_context = match ctx.memory().build_context(user_id.as_str(), &automation.label).await {
        Ok(block) => block,
        Err(e) => {
            warn!(error = %e, user = %user_id, "proactive: memory context build failed");
            String::new()
        }
    };
    let prompt_builder = ctx.agent().prompt().await;
    let mut system_prompt = prompt_builder.build_prompt(Some(&memory_context), None);
    system_prompt.volatile_tier = format!("{}\n\n{}", system_prompt.volatile_tier, REMINDER_PREAMBLE);
    let plain = system_prompt.to_plain_text();
    drop(prompt_builder);

    // Step 6: placeholder message, obtained before the stream begins.
    let message_id = match ctx.transport().send_message(&user_id, "…").await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, automation = %automation.id, "proactive: failed to send placeholder");
            return;
        }
    };

    if let Err(e) = ctx
        .convlog()
        .append_turn(&session_key, ConversationTurn::new(Role::User, reminder_text.clone()))
        .await
    {
        warn!(error = %e, automation = %automation.id, "proactive: failed to persist reminder turn");
        return;
    }

    let mut raw_messages = turns_to_raw_messages(&history);
    raw_messages.push(serde_json::json!({ "role": "user", "content": reminder_text }));

    let tools = build_registry(&ctx, &user_id);
    let model = ctx.agent().get_model().await;
    let request = ChatRequest {
        model,
        system: plain,
        system_prompt: Some(system_prompt),
        messages: Vec::new(),
        max_tokens: 4096,
        stream: false,
        thinking: None,
        tools: tools.definitions(),
        raw_messages: Some(raw_messages),
    };

    // Step 7: run the agentic loop with full tool access, editing the
    // placeholder as text streams in and while tools are running.
    let max_iterations = ctx.config().agent.max_tool_iterations;
    let (tx, mut rx) = tokio::sync::mpsc::channel::<LoopEvent>(64);

    let ctx_for_edits = Arc::clone(&ctx);
    let user_for_edits = user_id.clone();
    let message_id_for_edits = message_id.clone();
    let session_key_for_persist = session_key.clone();
    let ctx_for_persist = Arc::clone(&ctx);
    let relay = tokio::spawn(async move {
        let mut final_text = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                LoopEvent::TextChunk(chunk) => {
                    final_text.push_str(&chunk);
                    let _ = ctx_for_edits
                        .transport()
                        .edit_message(&user_for_edits, &message_id_for_edits, &final_text)
                        .await;
                }
                LoopEvent::ToolStatusChunk { name, .. } => {
                    let _ = ctx_for_edits
                        .transport()
                        .edit_message(&user_for_edits, &message_id_for_edits, &format!("⚙️ Using {name}…"))
                        .await;
                }
                LoopEvent::ToolResultChunk { .. } => {}
                LoopEvent::ToolTurnComplete {
                    assistant_blocks,
                    tool_result_blocks,
                } => {
                    // Step 8: persist the round as two `[TOOL]`-sentinel turns.
                    let (assistant_turn, result_turn) = tool_turns_from_round(assistant_blocks, tool_result_blocks);
                    if let Err(e) = ctx_for_persist.convlog().append_turn(&session_key_for_persist, assistant_turn).await {
                        warn!(error = %e, "proactive: failed to persist tool-use turn");
                    }
                    if let Err(e) = ctx_for_persist.convlog().append_turn(&session_key_for_persist, result_turn).await {
                        warn!(error = %e, "proactive: failed to persist tool-result turn");
                    }
                    final_text.clear();
                }
            }
        }
        final_text
    });

    let result = agentic_loop::run(ctx.agent().provider(), &tools, request, max_iterations, tx).await;
    let final_text = relay.await.unwrap_or_default();

    match result {
        Ok(usage) => {
            info!(
                automation = %automation.id,
                tokens_in = usage.tokens_in,
                tokens_out = usage.tokens_out,
                "proactive: turn complete"
            );
        }
        Err(e) => {
            warn!(error = %e, automation = %automation.id, "proactive: agentic loop failed");
            let _ = ctx
                .transport()
                .edit_message(&user_id, &message_id, "Sorry, I ran into a problem handling that reminder.")
                .await;
            return;
        }
    }

    if !final_text.is_empty() {
        if let Err(e) = ctx
            .convlog()
            .append_turn(&session_key, ConversationTurn::new(Role::Assistant, final_text.clone()))
            .await
        {
            warn!(error = %e, automation = %automation.id, "proactive: failed to persist final turn");
        }
        let _ = ctx.transport().edit_message(&user_id, &message_id, &final_text).await;
    }
}

/// Drops turns from the front until the remaining history's approximate
/// token count fits `budget` (spec §5 agentic-loop history budgeting).
fn trim_to_token_budget(turns: &mut Vec<ConversationTurn>, budget: usize) {
    let mut total: usize = turns.iter().map(|t| approx_tokens(&t.content)).sum();
    while total > budget && !turns.is_empty() {
        let dropped = turns.remove(0);
        total -= approx_tokens(&dropped.content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_to_token_budget_leaves_short_history_untouched() {
        let mut turns = vec![
            ConversationTurn::new(Role::User, "a".repeat(40)),
            ConversationTurn::new(Role::Assistant, "b".repeat(40)),
        ];
        trim_to_token_budget(&mut turns, 1000);
        assert_eq!(turns.len(), 2);
    }

    #[test]
    fn trim_to_token_budget_drops_oldest_first() {
        let mut turns = vec![
            ConversationTurn::new(Role::User, "old".repeat(100)),
            ConversationTurn::new(Role::Assistant, "new".repeat(100)),
        ];
        // budget fits only the newer turn's ~75 tokens, not both.
        trim_to_token_budget(&mut turns, 80);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "new".repeat(100));
    }

    #[test]
    fn trim_to_token_budget_can_empty_history_under_tiny_budget() {
        let mut turns = vec![ConversationTurn::new(Role::User, "x".repeat(400))];
        trim_to_token_budget(&mut turns, 1);
        assert!(turns.is_empty());
    }

    #[test]
    fn reminder_preamble_is_appended_to_volatile_tier() {
        assert!(REMINDER_PREAMBLE.contains("scheduled reminder"));
    }
}
