use std::sync::Arc;

use remy_core::sanitize::escape_foreign_tags;
use remy_embeddings::EmbeddingStore;
use remy_knowledge::{source_type_for, EntityType, GoalStatus, KnowledgeItem, KnowledgeStore};

/// Tags a fact/goal's own content is allowed to contain uncorrupted — the
/// only structural tags this block ever wraps content in (spec §5 prompt
/// injection containment: everything else gets escaped).
const ALLOWED_TAGS: &[&str] = &["memory", "facts", "goals", "fact", "goal"];

/// Builds the `<memory>` prompt block injected ahead of a user turn.
///
/// Grounded in `skynet-memory::manager::MemoryManager::build_user_context`'s
/// cache-then-render shape, generalized from a flat category-priority list
/// to the spec's three-stage retrieval (semantic → keyword → recency) for
/// facts, plus an always-included active-goals list.
pub struct MemoryInjector {
    knowledge: Arc<KnowledgeStore>,
    embeddings: Arc<EmbeddingStore>,
    max_chars: usize,
}

impl MemoryInjector {
    pub fn new(knowledge: Arc<KnowledgeStore>, embeddings: Arc<EmbeddingStore>, max_chars: usize) -> Self {
        Self {
            knowledge,
            embeddings,
            max_chars,
        }
    }

    /// `query_text` is normally the latest user message; it drives the
    /// semantic/keyword retrieval of relevant facts. Returns the empty
    /// string when there is nothing to inject (spec §4.C block format).
    pub async fn build_context(&self, user_id: &str, query_text: &str) -> remy_core::Result<String> {
        let facts = self.retrieve_relevant_facts(user_id, query_text, 5).await?;
        let goals = self
            .knowledge
            .list(user_id, EntityType::Goal)
            .map_err(Into::<remy_core::RemyError>::into)?
            .into_iter()
            .filter(|g| g.status == Some(GoalStatus::Active))
            .collect::<Vec<_>>();

        if facts.is_empty() && goals.is_empty() {
            return Ok(String::new());
        }

        let mut out = String::from("<memory>\n<facts>\n");
        for f in &facts {
            push_bounded(&mut out, &render_item(f, "fact"), self.max_chars);
        }
        out.push_str("</facts>\n<goals>\n");
        for g in &goals {
            push_bounded(&mut out, &render_item(g, "goal"), self.max_chars);
        }
        out.push_str("</goals>\n</memory>\n");

        for id in facts.iter().chain(goals.iter()).map(|i| i.id) {
            let _ = self.knowledge.update_last_referenced(id);
        }

        Ok(out)
    }

    /// Composes `base_prompt` with the memory block (spec §4.C): unchanged
    /// when there's nothing to inject, otherwise the block is appended
    /// after a blank line.
    pub async fn build_system_prompt(
        &self,
        user_id: &str,
        current_message: &str,
        base_prompt: &str,
    ) -> remy_core::Result<String> {
        let block = self.build_context(user_id, current_message).await?;
        if block.is_empty() {
            Ok(base_prompt.to_string())
        } else {
            Ok(format!("{base_prompt}\n\n{block}"))
        }
    }

    async fn retrieve_relevant_facts(
        &self,
        user_id: &str,
        query_text: &str,
        limit: usize,
    ) -> remy_core::Result<Vec<KnowledgeItem>> {
        if query_text.trim().is_empty() {
            return Ok(self
                .knowledge
                .most_recent(user_id, limit)
                .map_err(Into::<remy_core::RemyError>::into)?
                .into_iter()
                .filter(|i| i.entity_type == EntityType::Fact)
                .collect());
        }

        let semantic_hits = self
            .embeddings
            .search_similar_for_type(user_id, source_type_for(EntityType::Fact), query_text, limit)
            .await
            .map_err(Into::<remy_core::RemyError>::into)?;

        if !semantic_hits.is_empty() {
            let items: Vec<KnowledgeItem> = semantic_hits
                .into_iter()
                .filter_map(|m| self.knowledge.get(m.source_id).ok().flatten())
                .filter(|i| i.entity_type == EntityType::Fact)
                .collect();
            if !items.is_empty() {
                return Ok(items);
            }
        }

        let keyword_hits = self
            .knowledge
            .search_keyword(user_id, query_text, limit)
            .map_err(Into::<remy_core::RemyError>::into)?;
        let keyword_facts: Vec<KnowledgeItem> = keyword_hits
            .into_iter()
            .filter(|i| i.entity_type == EntityType::Fact)
            .collect();
        if !keyword_facts.is_empty() {
            return Ok(keyword_facts);
        }

        Ok(self
            .knowledge
            .most_recent(user_id, limit)
            .map_err(Into::<remy_core::RemyError>::into)?
            .into_iter()
            .filter(|i| i.entity_type == EntityType::Fact)
            .collect())
    }
}

fn render_item(item: &KnowledgeItem, tag: &str) -> String {
    let escaped = escape_foreign_tags(&item.content, ALLOWED_TAGS);
    if tag == "fact" {
        let category = item.category.map(|c| c.to_string()).unwrap_or_else(|| "other".to_string());
        format!("<fact category='{category}'>{escaped}</fact>\n")
    } else {
        format!("<{tag}>{escaped}</{tag}>\n")
    }
}

fn push_bounded(out: &mut String, line: &str, max_chars: usize) {
    if out.len() + line.len() <= max_chars {
        out.push_str(line);
    }
}
