use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use remy_agent::pipeline::MessageContext;
use remy_agent::router::Router;
use remy_agent::runtime::AgentRuntime;
use remy_convlog::ConversationLog;
use remy_core::types::UserId;
use remy_core::{ChatTransport, RemyConfig, Result};
use remy_delivery::OutboundQueue;
use remy_knowledge::{KnowledgeStore, PlanStore};
use remy_memory::MemoryInjector;
use remy_scheduler::SchedulerEngine;
use remy_sessions::SessionManager;

/// Central shared state — passed as `Arc<AppState>` to all Axum handlers
/// and to the scheduler's fired-automation receiver loop.
pub struct AppState {
    pub config: RemyConfig,
    pub agent: AgentRuntime,
    pub router: Router,
    pub convlog: ConversationLog,
    pub knowledge: Arc<KnowledgeStore>,
    /// Separate connection to the same `knowledge.db` file as `knowledge`
    /// (the established pattern here — see `knowledge_conn`/`embeddings_conn`
    /// in `main.rs` — rather than a shared handle into `KnowledgeStore`'s
    /// private connection).
    pub plans: Arc<PlanStore>,
    pub memory: MemoryInjector,
    /// Shared so the scheduler's own tick loop (spawned separately, see
    /// `main.rs`) can keep running while HTTP handlers and tools still
    /// read/write automations through this same handle.
    pub scheduler: Arc<SchedulerEngine>,
    pub sessions: SessionManager,
    /// Concrete transport, kept alongside the trait-object handle below so
    /// `GET /outbox` can drain it directly without downcasting.
    pub http_transport: Arc<HttpTransport>,
    /// Write-ahead log every `transport.send_message` goes through first
    /// (spec §3/§4.I). The background retry loop (`main.rs`) polls this
    /// same handle via `http_transport` directly, so it never re-enqueues
    /// what it's retrying.
    pub delivery_queue: Arc<OutboundQueue>,
    pub transport: Arc<dyn ChatTransport>,
}

impl MessageContext for AppState {
    fn agent(&self) -> &AgentRuntime {
        &self.agent
    }

    fn router(&self) -> &Router {
        &self.router
    }

    fn convlog(&self) -> &ConversationLog {
        &self.convlog
    }

    fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    fn plans(&self) -> &Arc<PlanStore> {
        &self.plans
    }

    fn memory(&self) -> &MemoryInjector {
        &self.memory
    }

    fn scheduler(&self) -> &SchedulerEngine {
        self.scheduler.as_ref()
    }

    fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    fn config(&self) -> &RemyConfig {
        &self.config
    }
}

/// Delivery mechanism for `POST /chat`'s synchronous replies and for
/// proactive pushes alike: every send/edit lands in a per-user outbox,
/// drained by `GET /outbox/{user}`. Grounded in the teacher's
/// notification-polling endpoint, generalised from a session-keyed queue
/// of plain strings to one keyed by stable message ids so edits can target
/// an exact entry.
pub struct HttpTransport {
    outbox: DashMap<String, Vec<(String, String)>>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self { outbox: DashMap::new() }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send_message(&self, user: &UserId, text: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.outbox
            .entry(user.as_str().to_string())
            .or_default()
            .push((id.clone(), text.to_string()));
        Ok(id)
    }

    async fn edit_message(&self, user: &UserId, message_id: &str, text: &str) -> Result<()> {
        if let Some(mut entries) = self.outbox.get_mut(user.as_str()) {
            if let Some(entry) = entries.iter_mut().find(|(id, _)| id == message_id) {
                entry.1 = text.to_string();
            }
        }
        Ok(())
    }
}

impl HttpTransport {
    /// Atomically drains every pending `(message_id, text)` entry for `user`.
    pub fn drain(&self, user: &UserId) -> Vec<(String, String)> {
        self.outbox
            .remove(user.as_str())
            .map(|(_, msgs)| msgs)
            .unwrap_or_default()
    }
}

/// Assemble the full Axum router (spec §6 health/admin surface plus chat).
pub fn build_router(state: Arc<AppState>) -> axum::Router {
    let mut router = axum::Router::new()
        .route("/health", axum::routing::get(crate::http::health::health_handler))
        .route("/ready", axum::routing::get(crate::http::health::ready_handler))
        .route(
            "/diagnostics",
            axum::routing::get(crate::http::health::diagnostics_handler),
        )
        .route("/chat", axum::routing::post(crate::http::chat::chat_handler))
        .route("/outbox", axum::routing::get(crate::http::outbox::outbox_handler));

    if state.config.gateway.metrics_enabled {
        router = router.route("/metrics", axum::routing::get(crate::http::health::metrics_handler));
    }

    router
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
