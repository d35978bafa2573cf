use std::net::SocketAddr;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use remy_agent::ollama::OllamaProvider;
use remy_agent::openai::OpenAiProvider;
use remy_agent::pipeline::run_proactive_turn;
use remy_agent::prompt::PromptBuilder;
use remy_agent::provider::LlmProvider;
use remy_agent::router::Router;
use remy_agent::runtime::AgentRuntime;
use remy_convlog::ConversationLog;
use remy_core::config::RemyConfig;
use remy_delivery::{DurableTransport, OutboundQueue};
use remy_embeddings::EmbeddingStore;
use remy_knowledge::{KnowledgeStore, PlanStore};
use remy_memory::MemoryInjector;
use remy_scheduler::{resolve_timezone, SchedulerEngine};
use remy_sessions::SessionManager;

mod app;
mod http;

use app::{AppState, HttpTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "remy_gateway=info,tower_http=debug".into()),
        )
        .init();
    let _ = crate::http::health::started_at();

    let config_path = std::env::var("REMY_CONFIG").ok();
    let config = RemyConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        panic!("failed to load config: {e}");
    });

    std::fs::create_dir_all(&config.database.data_dir)?;
    std::fs::create_dir_all(config.database.sessions_dir())?;
    std::fs::create_dir_all(config.database.logs_dir())?;

    let knowledge_conn = Connection::open(config.database.knowledge_db_path())?;
    let embeddings_conn = Connection::open(config.database.knowledge_db_path())?;
    let embeddings = Arc::new(EmbeddingStore::new(embeddings_conn)?);
    let knowledge = Arc::new(KnowledgeStore::new(knowledge_conn, Arc::clone(&embeddings))?);
    let plans_conn = Connection::open(config.database.knowledge_db_path())?;
    let plans = Arc::new(PlanStore::new(plans_conn)?);
    let memory = MemoryInjector::new(Arc::clone(&knowledge), Arc::clone(&embeddings), config.memory.injector_max_chars);

    let convlog = ConversationLog::new(config.database.sessions_dir());
    let sessions = SessionManager::new();

    let tz = resolve_timezone(&config.agent.local_timezone);
    let (fired_tx, mut fired_rx) = mpsc::channel(64);
    let scheduler_conn = Connection::open(format!("{}/scheduler.db", config.database.data_dir))?;
    let scheduler = Arc::new(SchedulerEngine::new(scheduler_conn, Some(fired_tx), tz)?);
    if let Err(e) = scheduler.ensure_builtin_automations(&config.allowed_users, &config.scheduler) {
        warn!(error = %e, "failed to seed built-in automations");
    }

    let primary_provider = build_primary_provider(&config)?;
    let router_primary_provider = build_primary_provider(&config)?;
    let router = Router::new(
        router_primary_provider,
        build_openai_compat(&config.providers.alt_a),
        build_openai_compat(&config.providers.alt_b),
        Box::new(OllamaProvider::new(Some(config.providers.local_base_url.clone()))),
    );

    let prompt = PromptBuilder::load(None, None);
    let agent = AgentRuntime::new(primary_provider, prompt, config.agent.primary_model.clone());

    let http_transport = Arc::new(HttpTransport::new());
    let delivery_conn = Connection::open(config.database.delivery_db_path())?;
    let delivery_queue = Arc::new(OutboundQueue::new(
        delivery_conn,
        config.delivery.max_attempts,
        config.delivery.retention_days,
    )?);
    let transport: Arc<dyn remy_core::ChatTransport> = Arc::new(DurableTransport::new(
        Arc::clone(&delivery_queue),
        http_transport.clone() as Arc<dyn remy_core::ChatTransport>,
    ));

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let delivery_poll_interval_secs = config.delivery.poll_interval_secs;

    let state = Arc::new(AppState {
        config,
        agent,
        router,
        convlog,
        knowledge,
        plans,
        memory,
        scheduler,
        sessions,
        http_transport,
        delivery_queue,
        transport,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let scheduler = Arc::clone(&state.scheduler);
        let scheduler_shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            scheduler.run(scheduler_shutdown_rx).await;
        });
    }

    {
        // Retries go through the plain `http_transport`, never the
        // `DurableTransport` wrapper, so a redelivery attempt doesn't
        // re-enqueue the row it's already working through.
        let queue = Arc::clone(&state.delivery_queue);
        let retry_transport = Arc::clone(&state.http_transport) as Arc<dyn remy_core::ChatTransport>;
        let delivery_shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            queue.run(retry_transport, delivery_poll_interval_secs, delivery_shutdown_rx).await;
        });
    }

    let proactive_state = Arc::clone(&state);
    tokio::spawn(async move {
        while let Some(automation) = fired_rx.recv().await {
            let ctx = Arc::clone(&proactive_state);
            tokio::spawn(async move {
                run_proactive_turn(ctx, automation).await;
            });
        }
    });

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    http::health::mark_ready();

    let router_app = app::build_router(Arc::clone(&state));
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("remy gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, router_app).await {
        error!(error = %e, "gateway server exited");
    }

    Ok(())
}

fn build_primary_provider(config: &RemyConfig) -> anyhow::Result<Box<dyn LlmProvider>> {
    let creds = config
        .providers
        .primary
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("providers.primary is required"))?;
    Ok(Box::new(remy_agent::anthropic::AnthropicProvider::new(
        creds.api_key.clone(),
        creds.base_url.clone(),
    )))
}

fn build_openai_compat(creds: &Option<remy_core::config::ProviderCredentials>) -> Option<Box<dyn LlmProvider>> {
    creds
        .as_ref()
        .map(|c| Box::new(OpenAiProvider::new(c.api_key.clone(), c.base_url.clone())) as Box<dyn LlmProvider>)
}
