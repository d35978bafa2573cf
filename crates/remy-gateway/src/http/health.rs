//! Health/admin endpoints (spec §6): `/health`, `/ready`, `/diagnostics`,
//! and an optional `/metrics` gated behind `gateway.metrics_enabled`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::app::AppState;

static STARTED_AT: OnceLock<Instant> = OnceLock::new();
static READY: AtomicBool = AtomicBool::new(false);

/// Stamps the process start time; call once at boot so uptime is measured
/// from process start rather than from the first request.
pub fn started_at() -> Instant {
    *STARTED_AT.get_or_init(Instant::now)
}

/// Flipped once database init and the scheduler's tick loop are both up.
pub fn mark_ready() {
    READY.store(true, Ordering::SeqCst);
}

/// GET /health — plain liveness probe, no dependency checks.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_s": started_at().elapsed().as_secs(),
    }))
}

/// GET /ready — 200 once startup finished, 503 `{"status":"starting"}` until then.
pub async fn ready_handler() -> (StatusCode, Json<Value>) {
    if READY.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "starting" })))
    }
}

/// GET /diagnostics — provider health, queue depth, recent router fallbacks.
pub async fn diagnostics_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let last_model = state.router.last_model().await;
    let last_usage = state.router.last_usage().await;
    let delivery_queue_depth = state.delivery_queue.depth().unwrap_or_default();
    Json(json!({
        "status": "ok",
        "uptime_s": started_at().elapsed().as_secs(),
        "last_routed_model": last_model,
        "last_tokens_in": last_usage.tokens_in,
        "last_tokens_out": last_usage.tokens_out,
        "allowed_users": state.config.allowed_users.len(),
        "delivery_queue_depth": delivery_queue_depth,
    }))
}

/// GET /metrics — minimal Prometheus exposition, only mounted when
/// `gateway.metrics_enabled` is set (spec §6 marks this endpoint optional).
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    let usage = state.router.last_usage().await;
    format!(
        "# HELP remy_last_tokens_in Tokens in on the most recent routed call\n\
         # TYPE remy_last_tokens_in gauge\n\
         remy_last_tokens_in {}\n\
         # HELP remy_last_tokens_out Tokens out on the most recent routed call\n\
         # TYPE remy_last_tokens_out gauge\n\
         remy_last_tokens_out {}\n",
        usage.tokens_in, usage.tokens_out,
    )
}
