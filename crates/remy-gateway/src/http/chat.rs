//! Full-pipeline chat endpoint — POST /chat
//!
//! Uses the shared `process_message_non_streaming` pipeline, giving the
//! caller access to tools (knowledge search/write, reminders, send_message),
//! session history, and memory context through the full agentic loop.
//!
//! Auth: `X-User-Id` header, checked against `config.allowed_users`.
//!
//! Request:  `{"message": "hello"}`
//! Response: `{"reply": "...", "model": "...", "tokens_in": 0, "tokens_out": 0}`
//! Error:    `{"error": "..."}`

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use remy_agent::pipeline::{process_message_non_streaming, slash};
use remy_agent::provider::ProviderError;
use remy_core::types::UserId;

use crate::app::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

#[derive(Serialize)]
pub struct ChatError {
    pub error: String,
}

/// POST /chat — full-pipeline non-streaming chat turn.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, (StatusCode, Json<ChatError>)> {
    let user_id = match authenticate(&state, &headers) {
        Some(u) => u,
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ChatError {
                    error: "set 'X-User-Id' header to an allow-listed user id".to_string(),
                }),
            ))
        }
    };

    if req.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ChatError {
                error: "message cannot be empty".to_string(),
            }),
        ));
    }

    let window = std::time::Duration::from_secs(state.config.agent.rate_limit_window_secs);
    if !state
        .sessions
        .check_rate_limit(&user_id, window, state.config.agent.rate_limit_max_requests)
    {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(ChatError {
                error: "rate limit exceeded: too many messages per minute".to_string(),
            }),
        ));
    }

    if let Some(reply) = slash::handle_slash_command(&req.message, state.as_ref()).await {
        return Ok(Json(ChatReply {
            reply,
            model: "gateway".to_string(),
            tokens_in: 0,
            tokens_out: 0,
        }));
    }

    let _guard = state.sessions.lock_user(&user_id).await;

    match process_message_non_streaming(&state, &user_id, &req.message).await {
        Ok(r) => Ok(Json(ChatReply {
            reply: r.content,
            model: r.model,
            tokens_in: r.tokens_in,
            tokens_out: r.tokens_out,
        })),
        Err(ProviderError::Cancelled) => Ok(Json(ChatReply {
            reply: "Operation cancelled.".to_string(),
            model: "gateway".to_string(),
            tokens_in: 0,
            tokens_out: 0,
        })),
        Err(e) => {
            warn!(error = %e, "POST /chat failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatError { error: e.to_string() }),
            ))
        }
    }
}

/// Returns the caller's user id if `X-User-Id` names an allow-listed user.
pub(crate) fn authenticate(state: &AppState, headers: &HeaderMap) -> Option<UserId> {
    let raw = headers.get("x-user-id")?.to_str().ok()?;
    let user = UserId::from(raw);
    state.config.is_allowed(&user).then_some(user)
}
