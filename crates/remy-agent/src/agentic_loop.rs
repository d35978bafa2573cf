//! The agentic tool-use loop — the core behavior of every turn.
//!
//! Flow: prompt → LLM stream → if tool_use → dispatch tools → inject
//! results → LLM stream → repeat. Stops when a turn's `stop_reason` isn't
//! `tool_use`, the iteration ceiling is hit, or the provider call fails.
//!
//! Generalizes the non-streaming request/response loop into a tagged
//! [`LoopEvent`] stream so callers can render partial text and tool
//! status as they happen instead of waiting for the whole turn.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::provider::{ChatRequest, LlmProvider, ProviderError};
use crate::retry;
use crate::stream::StreamEvent;
use crate::tools::ToolRegistry;

/// Events emitted while running one full agentic turn.
#[derive(Debug, Clone)]
pub enum LoopEvent {
    /// Incremental assistant text.
    TextChunk(String),
    /// A tool call has started; `input_preview` is a truncated rendering of
    /// its arguments for "Using `<tool>`…" style status lines.
    ToolStatusChunk {
        name: String,
        id: String,
        input_preview: String,
    },
    /// A tool call finished.
    ToolResultChunk {
        name: String,
        id: String,
        result: String,
    },
    /// One full model/tool round-trip completed — the raw content blocks
    /// the caller should persist as conversation turns.
    ToolTurnComplete {
        assistant_blocks: Vec<Value>,
        tool_result_blocks: Vec<Value>,
    },
}

/// Aggregate token usage across every iteration of the loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopUsage {
    pub tokens_in: u64,
    pub tokens_out: u64,
}

const INPUT_PREVIEW_CHARS: usize = 120;

/// Runs the agentic loop, emitting [`LoopEvent`]s through `tx` as they
/// happen, until the model stops calling tools or `max_iterations` is hit.
///
/// Retry applies only to *initiating* an iteration's stream: once any event
/// has been delivered for that iteration, a mid-stream failure propagates
/// instead of restarting the iteration. Tool dispatch never retries — a
/// failing tool's result just becomes the text the model sees next.
pub async fn run(
    provider: &dyn LlmProvider,
    tools: &ToolRegistry,
    initial_request: ChatRequest,
    max_iterations: u32,
    tx: mpsc::Sender<LoopEvent>,
) -> Result<LoopUsage, ProviderError> {
    let mut raw_messages: Vec<Value> = if let Some(ref raw) = initial_request.raw_messages {
        raw.clone()
    } else {
        initial_request
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect()
    };

    let mut usage = LoopUsage::default();

    for iteration in 0..max_iterations {
        let mut req = initial_request.clone();
        req.raw_messages = Some(raw_messages.clone());

        debug!(iteration, "agentic loop iteration");

        let (text, tool_calls, stop_reason, tokens_in, tokens_out) =
            stream_one_iteration(provider, &req, &tx).await?;
        usage.tokens_in += tokens_in as u64;
        usage.tokens_out += tokens_out as u64;

        if tool_calls.is_empty() || stop_reason != "tool_use" {
            info!(iteration, "agentic loop complete — no more tool calls");
            return Ok(usage);
        }

        let mut assistant_blocks: Vec<Value> = Vec::new();
        if !text.is_empty() {
            assistant_blocks.push(serde_json::json!({ "type": "text", "text": text }));
        }
        for call in &tool_calls {
            assistant_blocks.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.input,
            }));
        }

        let mut tool_result_blocks: Vec<Value> = Vec::new();
        for call in &tool_calls {
            let preview = truncate_preview(&call.input.to_string());
            let _ = tx
                .send(LoopEvent::ToolStatusChunk {
                    name: call.name.clone(),
                    id: call.id.clone(),
                    input_preview: preview,
                })
                .await;

            let result = tools.dispatch(&call.name, call.input.clone()).await;

            let _ = tx
                .send(LoopEvent::ToolResultChunk {
                    name: call.name.clone(),
                    id: call.id.clone(),
                    result: result.content.clone(),
                })
                .await;

            tool_result_blocks.push(serde_json::json!({
                "type": "tool_result",
                "tool_use_id": call.id,
                "content": result.content,
                "is_error": result.is_error,
            }));
        }

        let _ = tx
            .send(LoopEvent::ToolTurnComplete {
                assistant_blocks: assistant_blocks.clone(),
                tool_result_blocks: tool_result_blocks.clone(),
            })
            .await;

        raw_messages.push(serde_json::json!({ "role": "assistant", "content": assistant_blocks }));
        raw_messages.push(serde_json::json!({ "role": "user", "content": tool_result_blocks }));
    }

    warn!(max_iterations, "agentic loop hit iteration ceiling");
    Ok(usage)
}

/// Streams a single iteration, retrying the stream *initiation* per
/// [`retry::backoff_for`] as long as no event has reached the caller yet.
async fn stream_one_iteration(
    provider: &dyn LlmProvider,
    req: &ChatRequest,
    tx: &mpsc::Sender<LoopEvent>,
) -> Result<(String, Vec<crate::provider::ToolCall>, String, u32, u32), ProviderError> {
    let mut attempt: u32 = 0;
    loop {
        let (inner_tx, mut inner_rx) = mpsc::channel::<StreamEvent>(64);

        let mut text = String::new();
        let mut tool_calls: Vec<crate::provider::ToolCall> = Vec::new();
        let mut stop_reason = String::new();
        let mut tokens_in = 0u32;
        let mut tokens_out = 0u32;
        let mut first_event_seen = false;
        let mut stream_err: Option<ProviderError> = None;

        // The provider's own send_stream future is driven concurrently with
        // draining `inner_rx` below, since both borrow `provider`/`req` for
        // the same lifetime rather than needing a spawned task.
        let mut send_fut = std::pin::pin!(provider.send_stream(req, inner_tx));
        let mut send_done = false;

        loop {
            if send_done {
                let Some(event) = inner_rx.recv().await else {
                    break;
                };
                apply_event(
                    event, tx, &mut text, &mut tool_calls, &mut stop_reason,
                    &mut tokens_in, &mut tokens_out, &mut first_event_seen, &mut stream_err,
                ).await;
                continue;
            }
            tokio::select! {
                biased;
                event = inner_rx.recv() => {
                    if let Some(event) = event {
                        apply_event(
                            event, tx, &mut text, &mut tool_calls, &mut stop_reason,
                            &mut tokens_in, &mut tokens_out, &mut first_event_seen, &mut stream_err,
                        ).await;
                    }
                }
                result = &mut send_fut => {
                    send_done = true;
                    if let Err(e) = result {
                        stream_err = Some(e);
                    }
                }
            }
        }

        match stream_err {
            None => return Ok((text, tool_calls, stop_reason, tokens_in, tokens_out)),
            Some(e) if first_event_seen => return Err(e),
            Some(e) => match retry::backoff_for(attempt, &e) {
                Some(wait) => {
                    warn!(attempt, wait_ms = wait.as_millis() as u64, error = %e, "retrying agentic loop iteration start");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn apply_event(
    event: StreamEvent,
    tx: &mpsc::Sender<LoopEvent>,
    text: &mut String,
    tool_calls: &mut Vec<crate::provider::ToolCall>,
    stop_reason: &mut String,
    tokens_in: &mut u32,
    tokens_out: &mut u32,
    first_event_seen: &mut bool,
    stream_err: &mut Option<ProviderError>,
) {
    *first_event_seen = true;
    match event {
        StreamEvent::TextDelta { text: delta } => {
            text.push_str(&delta);
            let _ = tx.send(LoopEvent::TextChunk(delta)).await;
        }
        StreamEvent::Thinking { .. } => {}
        StreamEvent::ToolUse { id, name, input } => {
            tool_calls.push(crate::provider::ToolCall { id, name, input });
        }
        StreamEvent::Done {
            tokens_in: ti,
            tokens_out: to,
            stop_reason: sr,
            ..
        } => {
            *tokens_in = ti;
            *tokens_out = to;
            *stop_reason = sr;
        }
        StreamEvent::Error { message } => {
            *stream_err = Some(ProviderError::Parse(message));
        }
    }
}

fn truncate_preview(s: &str) -> String {
    if s.chars().count() <= INPUT_PREVIEW_CHARS {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(INPUT_PREVIEW_CHARS).collect();
        format!("{truncated}…")
    }
}
