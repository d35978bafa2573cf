//! Session compaction (spec §4.D) — rewrites a long session file down to a
//! single `[COMPACTED SUMMARY]` turn once it grows past a turn threshold.
//!
//! The summary itself is produced by one router-routed LLM call classified
//! as `summarization`, keeping this off the tool-capable primary provider
//! whenever the transcript is short enough for alt-A to handle it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use remy_core::SessionKey;

use crate::stream::StreamEvent;

use super::context::MessageContext;

const COMPACT_THRESHOLD: usize = 40;

/// Compact a session's conversation log once it exceeds `COMPACT_THRESHOLD`
/// turns. Intended to run as a fire-and-forget `tokio::spawn` after an
/// assistant turn is persisted.
pub async fn compact_session_if_needed<C: MessageContext + 'static>(ctx: Arc<C>, session_key: SessionKey) {
    let turns = match ctx.convlog().all_turns(&session_key).await {
        Ok(turns) => turns,
        Err(e) => {
            warn!(error = %e, session = %session_key.as_str(), "compact: failed to read session turns");
            return;
        }
    };

    if turns.len() < COMPACT_THRESHOLD {
        return;
    }

    info!(
        session = %session_key.as_str(),
        turns = turns.len(),
        "compact: threshold reached, summarising session"
    );

    let transcript: String = turns
        .iter()
        .filter(|t| !t.is_tool_turn())
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = format!(
        "Summarize the key facts, decisions, and open threads from this conversation \
         in a few dense sentences a future assistant turn can use as context:\n\n{transcript}"
    );

    let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);
    let system = "You write terse, factual conversation summaries. No preamble.";
    let send = ctx.router().stream(&prompt, &[], Some(system), tx);
    let mut summary = String::new();
    let recv = async {
        while let Some(event) = rx.recv().await {
            if let StreamEvent::TextDelta { text } = event {
                summary.push_str(&text);
            }
        }
    };

    let (result, ()) = tokio::join!(send, recv);
    if let Err(e) = result {
        warn!(error = %e, session = %session_key.as_str(), "compact: summary call failed");
        return;
    }
    if summary.trim().is_empty() {
        warn!(session = %session_key.as_str(), "compact: summary call returned no text");
        return;
    }

    match ctx.convlog().compact(&session_key, summary.trim()).await {
        Ok(()) => info!(session = %session_key.as_str(), "compact: session compacted"),
        Err(e) => warn!(error = %e, session = %session_key.as_str(), "compact: write failed"),
    }
}
