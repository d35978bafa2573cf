//! `send_message` tool — lets the model push a standalone message to the
//! user's channel, outside its current streamed reply (e.g. to report that
//! a background step finished).

use std::sync::Arc;

use async_trait::async_trait;
use remy_core::types::UserId;

use crate::pipeline::context::MessageContext;

use super::{Tool, ToolResult};

pub struct SendMessageTool<C: MessageContext + 'static> {
    ctx: Arc<C>,
    user_id: UserId,
}

impl<C: MessageContext + 'static> SendMessageTool<C> {
    pub fn new(ctx: Arc<C>, user_id: UserId) -> Self {
        Self { ctx, user_id }
    }
}

#[async_trait]
impl<C: MessageContext + 'static> Tool for SendMessageTool<C> {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a standalone message to the user's channel, separate from your current reply. \
         Use this sparingly — most responses should just be returned as plain text."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The text message to send."
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let message = match input.get("message").and_then(|v| v.as_str()) {
            Some(m) if !m.is_empty() => m,
            _ => return ToolResult::error("missing or empty 'message' parameter"),
        };

        match self.ctx.transport().send_message(&self.user_id, message).await {
            Ok(_) => ToolResult::success("Message sent."),
            Err(e) => ToolResult::error(format!("send_message failed: {e}")),
        }
    }
}
