//! Classification-driven router (spec §4.G) — picks a provider/tier per
//! turn instead of a fixed priority-ordered failover chain.
//!
//! Four providers sit behind this router: `primary` (Anthropic-shaped, tool
//! use), `alt_a` and `alt_b` (OpenAI-compatible SSE, no tools), and `local`
//! (Ollama-compatible, the fallback of last resort). Routing decisions are
//! keyed off the turn's category and its approximate token count; a
//! provider failure never bubbles up to the caller directly — it degrades
//! to the local model with an inline banner first.

use tokio::sync::{mpsc, RwLock};
use tracing::warn;

use crate::classifier::{approx_tokens, Category, Classifier};
use crate::provider::{ChatRequest, LlmProvider, Message, ProviderError, Role};
use crate::stream::StreamEvent;

const LONG_CONTEXT_TOKENS: usize = 128_000;
const LARGE_SUMMARY_TOKENS: usize = 100_000;
const LARGE_ROUTINE_TOKENS: usize = 50_000;

/// Which configured provider a routing decision points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Primary,
    AltA,
    AltB,
    Local,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouterUsage {
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// Routes a turn across the primary/alt-A/alt-B/local providers, classifying
/// it first and falling back to the local model on any upstream failure.
pub struct Router {
    primary: Box<dyn LlmProvider>,
    alt_a: Option<Box<dyn LlmProvider>>,
    alt_b: Option<Box<dyn LlmProvider>>,
    local: Box<dyn LlmProvider>,
    classifier: Classifier,
    last_usage: RwLock<RouterUsage>,
    last_model: RwLock<String>,
}

impl Router {
    pub fn new(
        primary: Box<dyn LlmProvider>,
        alt_a: Option<Box<dyn LlmProvider>>,
        alt_b: Option<Box<dyn LlmProvider>>,
        local: Box<dyn LlmProvider>,
    ) -> Self {
        Self {
            primary,
            alt_a,
            alt_b,
            local,
            classifier: Classifier::new(),
            last_usage: RwLock::new(RouterUsage::default()),
            last_model: RwLock::new(String::new()),
        }
    }

    pub async fn last_usage(&self) -> RouterUsage {
        *self.last_usage.read().await
    }

    pub async fn last_model(&self) -> String {
        self.last_model.read().await.clone()
    }

    /// Classifies `text` into a [`Category`] without routing or streaming
    /// anything — the entry point callers outside this module use to learn
    /// the routing matrix's decision for a turn before deciding how to act
    /// on it (e.g. whether a turn needs full tool access).
    pub async fn classify(&self, text: &str) -> Category {
        self.classifier.classify(text).await
    }

    /// Resolves the routing matrix's target for an already-classified turn.
    pub(crate) fn target_for(&self, category: Category, text: &str) -> Target {
        route(category, approx_tokens(text))
    }

    /// Streams a response for `text`, classifying it and picking a
    /// provider/tier per the routing matrix. `messages` is the prior
    /// history; `text` (the latest turn) is appended if not already last.
    pub async fn stream(
        &self,
        text: &str,
        messages: &[Message],
        system: Option<&str>,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        *self.last_usage.write().await = RouterUsage::default();
        *self.last_model.write().await = String::new();

        let category = self.classifier.classify(text).await;
        let target = self.target_for(category, text);

        let mut req = ChatRequest {
            model: String::new(),
            system: system.unwrap_or_default().to_string(),
            system_prompt: None,
            messages: messages.to_vec(),
            max_tokens: 4096,
            stream: true,
            thinking: None,
            tools: Vec::new(),
            raw_messages: None,
        };
        if req.messages.last().map(|m| m.content.as_str()) != Some(text) {
            req.messages.push(Message {
                role: Role::User,
                content: text.to_string(),
            });
        }

        let provider = self.provider_for(target);
        req.model = provider.name().to_string();

        match self.stream_through(provider, &req, &tx).await {
            Ok(()) => Ok(()),
            Err((e, sent_any)) => {
                if matches!(target, Target::Local) || sent_any {
                    return Err(e);
                }
                warn!(provider = provider.name(), error = %e, "provider failed, falling back to local");
                let _ = tx
                    .send(StreamEvent::TextDelta {
                        text: format!(
                            "⚠️ {} unavailable — responding via local model",
                            provider.name()
                        ),
                    })
                    .await;

                let mut local_req = req;
                local_req.model = self.local.name().to_string();
                self.stream_through(self.local.as_ref(), &local_req, &tx)
                    .await
                    .map_err(|(e, _)| ProviderError::Unavailable(format!("local fallback also failed: {e}")))?;
                *self.last_model.write().await = self.local.name().to_string();
                Ok(())
            }
        }
    }

    /// Drives `provider.send_stream` to completion, forwarding each event to
    /// `tx` as it arrives rather than buffering the whole response first.
    /// On failure, the `bool` in the error tuple reports whether any event
    /// had already reached the caller — once that happens the stream can no
    /// longer be silently replaced by a fallback attempt.
    async fn stream_through(
        &self,
        provider: &dyn LlmProvider,
        req: &ChatRequest,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<(), (ProviderError, bool)> {
        let (inner_tx, mut inner_rx) = mpsc::channel::<StreamEvent>(64);
        let send = provider.send_stream(req, inner_tx);
        tokio::pin!(send);

        let mut sent_any = false;
        let result = loop {
            tokio::select! {
                biased;
                event = inner_rx.recv() => {
                    if let Some(event) = event {
                        sent_any = true;
                        self.record_usage(&event).await;
                        let _ = tx.send(event).await;
                    }
                }
                result = &mut send => break result,
            }
        };
        while let Ok(event) = inner_rx.try_recv() {
            sent_any = true;
            self.record_usage(&event).await;
            let _ = tx.send(event).await;
        }
        result.map_err(|e| (e, sent_any))
    }

    fn provider_for(&self, target: Target) -> &dyn LlmProvider {
        match target {
            Target::Primary => self.primary.as_ref(),
            Target::AltA => self.alt_a.as_deref().unwrap_or(self.primary.as_ref()),
            Target::AltB => self.alt_b.as_deref().unwrap_or(self.primary.as_ref()),
            Target::Local => self.local.as_ref(),
        }
    }

    async fn record_usage(&self, event: &StreamEvent) {
        if let StreamEvent::Done {
            model,
            tokens_in,
            tokens_out,
            ..
        } = event
        {
            let mut usage = self.last_usage.write().await;
            usage.tokens_in += tokens_in;
            usage.tokens_out += tokens_out;
            *self.last_model.write().await = model.clone();
        }
    }
}

/// The fixed routing matrix (spec §4.G).
pub(crate) fn route(category: Category, approx_tokens: usize) -> Target {
    match category {
        Category::Routine if approx_tokens < LARGE_ROUTINE_TOKENS => Target::AltA,
        Category::Routine => Target::Primary,
        Category::Summarization if approx_tokens < LARGE_SUMMARY_TOKENS => Target::Primary,
        Category::Summarization => Target::AltA,
        Category::Reasoning if approx_tokens > LONG_CONTEXT_TOKENS => Target::AltB,
        Category::Reasoning => Target::Primary,
        Category::Coding if approx_tokens < LONG_CONTEXT_TOKENS => Target::Primary,
        Category::Coding => Target::AltB,
        Category::Safety => Target::Primary,
        Category::Persona => Target::AltB,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routine_short_goes_to_alt_a() {
        assert_eq!(route(Category::Routine, 10), Target::AltA);
    }

    #[test]
    fn routine_long_goes_to_primary() {
        assert_eq!(route(Category::Routine, 60_000), Target::Primary);
    }

    #[test]
    fn summarization_short_goes_to_primary() {
        assert_eq!(route(Category::Summarization, 10), Target::Primary);
    }

    #[test]
    fn summarization_long_goes_to_alt_a() {
        assert_eq!(route(Category::Summarization, 150_000), Target::AltA);
    }

    #[test]
    fn reasoning_past_long_context_goes_to_alt_b() {
        assert_eq!(route(Category::Reasoning, 200_000), Target::AltB);
    }

    #[test]
    fn coding_within_context_goes_to_primary() {
        assert_eq!(route(Category::Coding, 1_000), Target::Primary);
    }

    #[test]
    fn coding_past_context_goes_to_alt_b() {
        assert_eq!(route(Category::Coding, 130_000), Target::AltB);
    }

    #[test]
    fn safety_always_primary() {
        assert_eq!(route(Category::Safety, 5), Target::Primary);
        assert_eq!(route(Category::Safety, 500_000), Target::Primary);
    }

    #[test]
    fn persona_goes_to_alt_b() {
        assert_eq!(route(Category::Persona, 5), Target::AltB);
    }

    struct AlwaysFail(&'static str);
    #[async_trait::async_trait]
    impl LlmProvider for AlwaysFail {
        fn name(&self) -> &str {
            self.0
        }
        async fn send(&self, _req: &ChatRequest) -> Result<crate::provider::ChatResponse, ProviderError> {
            Err(ProviderError::Unavailable("intentional failure".into()))
        }
    }

    struct AlwaysOk(&'static str);
    #[async_trait::async_trait]
    impl LlmProvider for AlwaysOk {
        fn name(&self) -> &str {
            self.0
        }
        async fn send(&self, req: &ChatRequest) -> Result<crate::provider::ChatResponse, ProviderError> {
            Ok(crate::provider::ChatResponse {
                content: "ok".to_string(),
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "stop".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn falls_back_to_local_when_chosen_provider_is_unavailable() {
        let router = Router::new(
            Box::new(AlwaysFail("primary")),
            Some(Box::new(AlwaysFail("alt_a"))),
            Some(Box::new(AlwaysFail("alt_b"))),
            Box::new(AlwaysOk("local")),
        );
        let (tx, mut rx) = mpsc::channel(16);
        // Long and matches the summary-keyword regex, routing to `primary`.
        let text = "please summarize this long and rambling conversation for me right now";
        router
            .stream(text, &[], None, tx)
            .await
            .expect("local fallback should succeed");

        let mut saw_banner = false;
        let mut saw_text = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                StreamEvent::TextDelta { text } if text.starts_with("⚠️") => saw_banner = true,
                StreamEvent::TextDelta { text } if text == "ok" => saw_text = true,
                _ => {}
            }
        }
        assert!(saw_banner);
        assert!(saw_text);
        assert_eq!(router.last_model().await, "local");
    }

    #[tokio::test]
    async fn errors_when_local_fallback_also_fails() {
        let router = Router::new(
            Box::new(AlwaysFail("primary")),
            None,
            None,
            Box::new(AlwaysFail("local")),
        );
        let (tx, _rx) = mpsc::channel(16);
        let result = router.stream("hi", &[], None, tx).await;
        assert!(result.is_err());
    }

    struct ChunkThenFail(&'static str);
    #[async_trait::async_trait]
    impl LlmProvider for ChunkThenFail {
        fn name(&self) -> &str {
            self.0
        }
        async fn send(&self, _req: &ChatRequest) -> Result<crate::provider::ChatResponse, ProviderError> {
            unreachable!("send_stream is overridden")
        }
        async fn send_stream(
            &self,
            _req: &ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), ProviderError> {
            tx.send(StreamEvent::TextDelta { text: "partial".into() }).await.ok();
            Err(ProviderError::Unavailable("dropped mid-stream".into()))
        }
    }

    #[tokio::test]
    async fn propagates_error_once_a_chunk_already_reached_the_caller() {
        // Long text classified as `summarization`, routed to `primary`.
        let router = Router::new(
            Box::new(ChunkThenFail("primary")),
            None,
            None,
            Box::new(AlwaysOk("local")),
        );
        let (tx, mut rx) = mpsc::channel(16);
        let text = "please summarize this long and rambling conversation for me right now";
        let result = router.stream(text, &[], None, tx).await;
        assert!(result.is_err(), "a partially-sent stream must not silently fall back");

        let first = rx.try_recv().expect("the partial chunk should have been forwarded already");
        assert!(matches!(first, StreamEvent::TextDelta { text } if text == "partial"));
    }
}
