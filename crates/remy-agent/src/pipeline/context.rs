//! Shared context interface for the single channel-agnostic pipeline.
//!
//! `MessageContext` is the trait the gateway's app state implements so the
//! pipeline crate never depends on a concrete transport or storage wiring.
//! Memory is split across three collaborators rather than one unified
//! manager: `remy-convlog` owns turn persistence, `remy-knowledge` owns
//! facts/goals/shopping items, and `remy-memory` assembles the two into the
//! context block injected ahead of a user turn.

use std::sync::Arc;

use remy_convlog::ConversationLog;
use remy_knowledge::{KnowledgeStore, PlanStore};
use remy_memory::MemoryInjector;
use remy_scheduler::SchedulerEngine;
use remy_sessions::SessionManager;

use crate::router::Router;
use crate::runtime::AgentRuntime;

/// Minimal context interface required by the shared message pipeline.
///
/// Implemented by `AppState` in `remy-gateway`.
pub trait MessageContext: Send + Sync {
    fn agent(&self) -> &AgentRuntime;
    fn router(&self) -> &Router;
    fn convlog(&self) -> &ConversationLog;
    fn knowledge(&self) -> &KnowledgeStore;
    fn plans(&self) -> &Arc<PlanStore>;
    fn memory(&self) -> &MemoryInjector;
    fn scheduler(&self) -> &SchedulerEngine;
    fn sessions(&self) -> &SessionManager;
    fn transport(&self) -> &Arc<dyn remy_core::ChatTransport>;
    fn config(&self) -> &remy_core::RemyConfig;
}
