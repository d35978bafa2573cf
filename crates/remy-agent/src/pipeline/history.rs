//! Shared conversation-turn <-> raw-message helpers (spec §4.D tool-turn
//! sentinel). Both the regular and proactive pipelines read and write
//! session turns through these so the on-disk encoding only lives in one
//! place.

use remy_convlog::{ConversationTurn, Role, TOOL_TURN_PREFIX};
use serde_json::Value;

/// Turns a session's stored turns into the raw JSON message list a provider
/// expects, reconstructing structured tool_use/tool_result blocks out of the
/// `[TOOL]`-prefixed turns written by [`tool_turns_from_round`].
pub fn turns_to_raw_messages(turns: &[ConversationTurn]) -> Vec<Value> {
    turns
        .iter()
        .filter_map(|t| {
            let role = match t.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            };
            if t.is_tool_turn() {
                let json = t.content.strip_prefix(TOOL_TURN_PREFIX)?.trim_start();
                let blocks: Value = serde_json::from_str(json).ok()?;
                Some(serde_json::json!({ "role": role, "content": blocks }))
            } else {
                Some(serde_json::json!({ "role": role, "content": t.content }))
            }
        })
        .collect()
}

/// Builds the two durable turns a single agentic-loop round-trip produces
/// (spec §4.H `ToolTurnComplete`, §4.D tool-turn sentinel): one assistant
/// turn carrying the tool_use blocks, one user turn carrying the results.
pub fn tool_turns_from_round(assistant_blocks: Vec<Value>, tool_result_blocks: Vec<Value>) -> (ConversationTurn, ConversationTurn) {
    let assistant = ConversationTurn::new(
        Role::Assistant,
        format!("{TOOL_TURN_PREFIX} {}", Value::Array(assistant_blocks)),
    );
    let user = ConversationTurn::new(
        Role::User,
        format!("{TOOL_TURN_PREFIX} {}", Value::Array(tool_result_blocks)),
    );
    (assistant, user)
}

/// Drops a trailing tool-use turn with no matching tool-result turn after
/// it (spec §4.K step 3) — history must not end on an unresolved tool call.
/// In this crate's encoding a tool round is always written as an assistant
/// turn immediately followed by its user tool-result turn, so an orphan can
/// only be the very last turn when it's an assistant tool turn.
pub fn drop_trailing_orphan_tool_turn(turns: &mut Vec<ConversationTurn>) {
    if matches!(turns.last(), Some(t) if t.is_tool_turn() && t.role == Role::Assistant) {
        turns.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(role: Role, content: &str) -> ConversationTurn {
        ConversationTurn::new(role, content)
    }

    fn tool_turn(role: Role, blocks: Value) -> ConversationTurn {
        ConversationTurn::new(role, format!("{TOOL_TURN_PREFIX} {blocks}"))
    }

    #[test]
    fn turns_to_raw_messages_roundtrips_plain_turns() {
        let turns = vec![plain(Role::User, "hi"), plain(Role::Assistant, "hello")];
        let raw = turns_to_raw_messages(&turns);
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0]["role"], "user");
        assert_eq!(raw[0]["content"], "hi");
        assert_eq!(raw[1]["role"], "assistant");
        assert_eq!(raw[1]["content"], "hello");
    }

    #[test]
    fn turns_to_raw_messages_reconstructs_tool_blocks() {
        let blocks = serde_json::json!([{"type": "tool_use", "id": "t1", "name": "reminder", "input": {}}]);
        let turns = vec![tool_turn(Role::Assistant, blocks.clone())];
        let raw = turns_to_raw_messages(&turns);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0]["role"], "assistant");
        assert_eq!(raw[0]["content"], blocks);
    }

    #[test]
    fn turns_to_raw_messages_skips_unparseable_tool_turn() {
        let turns = vec![ConversationTurn::new(Role::Assistant, format!("{TOOL_TURN_PREFIX} not json"))];
        let raw = turns_to_raw_messages(&turns);
        assert!(raw.is_empty());
    }

    #[test]
    fn tool_turns_from_round_tags_both_sides() {
        let assistant_blocks = vec![serde_json::json!({"type": "tool_use", "id": "t1"})];
        let result_blocks = vec![serde_json::json!({"type": "tool_result", "tool_use_id": "t1"})];
        let (assistant_turn, result_turn) = tool_turns_from_round(assistant_blocks, result_blocks);

        assert_eq!(assistant_turn.role, Role::Assistant);
        assert!(assistant_turn.is_tool_turn());
        assert_eq!(result_turn.role, Role::User);
        assert!(result_turn.is_tool_turn());
    }

    #[test]
    fn drop_trailing_orphan_tool_turn_removes_unresolved_assistant_call() {
        let mut turns = vec![
            plain(Role::User, "remind me"),
            tool_turn(Role::Assistant, serde_json::json!([{"type": "tool_use"}])),
        ];
        drop_trailing_orphan_tool_turn(&mut turns);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "remind me");
    }

    #[test]
    fn drop_trailing_orphan_tool_turn_keeps_resolved_round() {
        let mut turns = vec![
            tool_turn(Role::Assistant, serde_json::json!([{"type": "tool_use"}])),
            tool_turn(Role::User, serde_json::json!([{"type": "tool_result"}])),
        ];
        drop_trailing_orphan_tool_turn(&mut turns);
        assert_eq!(turns.len(), 2);
    }

    #[test]
    fn drop_trailing_orphan_tool_turn_noop_on_plain_history() {
        let mut turns = vec![plain(Role::User, "hi"), plain(Role::Assistant, "hello")];
        drop_trailing_orphan_tool_turn(&mut turns);
        assert_eq!(turns.len(), 2);
    }
}
