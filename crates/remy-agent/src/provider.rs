use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::prompt::SystemPrompt;
use crate::stream::StreamEvent;
use crate::thinking::ThinkingLevel;

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Tool definition sent to the LLM API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool call extracted from the LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Request to an LLM provider (spec §4.F: shared shape across all five
/// clients).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    /// Plain text system prompt (used by non-Anthropic providers).
    pub system: String,
    /// Optional 3-tier prompt with cache breakpoints (Anthropic only).
    pub system_prompt: Option<SystemPrompt>,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub stream: bool,
    /// Optional thinking level for extended reasoning (Anthropic only).
    pub thinking: Option<ThinkingLevel>,
    /// Tools to expose to the LLM. Empty when the caller grants none.
    pub tools: Vec<ToolDefinition>,
    /// Raw JSON messages for the tool loop (overrides `messages` when set) —
    /// lets the agentic loop carry structured tool_use/tool_result blocks
    /// across iterations.
    pub raw_messages: Option<Vec<serde_json::Value>>,
}

/// Response from an LLM provider (non-streaming).
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
    /// Tool calls requested by the LLM. Empty when no tools are called.
    pub tool_calls: Vec<ToolCall>,
}

/// Common interface for all five LLM provider clients (spec §4.F). Every
/// client authenticates with a plain API key resolved from
/// `RemyConfig::providers`; there is no OAuth exchange in this system.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Send a non-streaming chat request, wait for full response.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Stream response events through a channel.
    /// Default: falls back to non-streaming send, emits TextDelta + Done.
    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let resp = self.send(req).await?;
        let _ = tx.send(StreamEvent::TextDelta { text: resp.content }).await;
        let _ = tx
            .send(StreamEvent::Done {
                model: resp.model,
                tokens_in: resp.tokens_in,
                tokens_out: resp.tokens_out,
                stop_reason: resp.stop_reason,
            })
            .await;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// HTTP 5xx/overload — retried with 2s * 2^attempt backoff (spec §4.F).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ProviderError::Api { status, .. } if *status >= 500)
            || matches!(self, ProviderError::Unavailable(_))
    }
}

impl From<ProviderError> for remy_core::RemyError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Cancelled => remy_core::RemyError::Cancelled,
            ProviderError::Unavailable(m) => remy_core::RemyError::ServiceUnavailable(m),
            ProviderError::RateLimited { .. } => remy_core::RemyError::Transient(e.to_string()),
            other if other.is_server_error() => remy_core::RemyError::Transient(other.to_string()),
            other => remy_core::RemyError::Permanent(other.to_string()),
        }
    }
}
