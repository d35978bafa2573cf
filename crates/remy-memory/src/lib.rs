pub mod injector;

pub use injector::MemoryInjector;

#[cfg(test)]
mod tests {
    use super::*;
    use remy_embeddings::EmbeddingStore;
    use remy_knowledge::{FactCategory, KnowledgeStore};
    use rusqlite::Connection;
    use std::sync::Arc;

    async fn injector() -> (MemoryInjector, Arc<KnowledgeStore>) {
        let embeddings = Arc::new(EmbeddingStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let knowledge = Arc::new(KnowledgeStore::new(Connection::open_in_memory().unwrap(), embeddings.clone()).unwrap());
        (MemoryInjector::new(knowledge.clone(), embeddings, 4000), knowledge)
    }

    #[tokio::test]
    async fn injected_block_escapes_foreign_tags() {
        let (inj, knowledge) = injector().await;
        knowledge
            .upsert_fact("u1", FactCategory::Other, "my nickname is <script>hi</script>", 0.3)
            .await
            .unwrap();

        let block = inj.build_context("u1", "what is my nickname").await.unwrap();
        assert!(block.starts_with("<memory>"));
        assert!(block.contains("<fact category='other'>"));
        assert!(!block.contains("<script>"));
    }

    #[tokio::test]
    async fn empty_memory_returns_empty_string() {
        let (inj, _knowledge) = injector().await;
        let block = inj.build_context("u1", "hello").await.unwrap();
        assert!(block.is_empty());
    }

    #[tokio::test]
    async fn build_system_prompt_is_unchanged_when_memory_is_empty() {
        let (inj, _knowledge) = injector().await;
        let prompt = inj.build_system_prompt("u1", "hello", "You are Remy.").await.unwrap();
        assert_eq!(prompt, "You are Remy.");
    }

    #[tokio::test]
    async fn build_system_prompt_appends_block_after_blank_line() {
        let (inj, knowledge) = injector().await;
        knowledge.upsert_fact("u1", FactCategory::Location, "lives in Boston", 0.3).await.unwrap();
        let prompt = inj.build_system_prompt("u1", "where do I live", "You are Remy.").await.unwrap();
        assert!(prompt.starts_with("You are Remy.\n\n<memory>"));
    }

    #[tokio::test]
    async fn sessions_are_isolated_by_user() {
        let (inj, knowledge) = injector().await;
        knowledge.upsert_fact("u1", FactCategory::Location, "lives in Boston", 0.3).await.unwrap();
        let block = inj.build_context("u2", "where do I live").await.unwrap();
        assert!(block.is_empty());
    }
}
