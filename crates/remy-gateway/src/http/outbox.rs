//! Outbox polling endpoint — GET /outbox
//!
//! Clients poll this to receive proactive pushes (reminder results,
//! scheduled briefings) queued by [`crate::app::HttpTransport`] while the
//! client wasn't otherwise talking to `/chat`.
//!
//! Auth: same `X-User-Id` header as `/chat`.
//! Response: `{"messages": [{"id": "...", "text": "..."}]}`

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use crate::app::AppState;
use crate::http::chat::authenticate;

#[derive(Serialize)]
pub struct OutboxEntry {
    pub id: String,
    pub text: String,
}

#[derive(Serialize)]
pub struct OutboxResponse {
    pub messages: Vec<OutboxEntry>,
}

#[derive(Serialize)]
pub struct OutboxError {
    pub error: String,
}

/// GET /outbox — drain and return all pending outbound entries for a user.
pub async fn outbox_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<OutboxResponse>, (StatusCode, Json<OutboxError>)> {
    let user_id = authenticate(&state, &headers).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(OutboxError {
                error: "set 'X-User-Id' header to an allow-listed user id".to_string(),
            }),
        )
    })?;

    let messages = state
        .http_transport
        .drain(&user_id)
        .into_iter()
        .map(|(id, text)| OutboxEntry { id, text })
        .collect();

    Ok(Json(OutboxResponse { messages }))
}
