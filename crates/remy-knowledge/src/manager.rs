use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use tracing::debug;

use remy_embeddings::EmbeddingStore;

use crate::error::Result;
use crate::types::*;

/// The embedding `source_type` string each entity type is scoped under, so
/// an ANN lookup for one kind of row (e.g. a fact) never surfaces another
/// kind's rows (spec §3 embedding data model: `source_type` examples
/// include `knowledge_fact`/`knowledge_goal`).
pub fn source_type_for(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Fact => "knowledge_fact",
        EntityType::Goal => "knowledge_goal",
        EntityType::ShoppingItem => "knowledge_shopping_item",
    }
}

/// Manages the unified knowledge store (facts/goals/shopping items) for all
/// users, with embedding-backed semantic dedup on write.
///
/// Grounded in `skynet-memory::manager::MemoryManager`'s
/// `Mutex<Connection>` + confidence-wins-on-conflict upsert shape, adapted
/// from single-table category priority to the richer entity-type/category
/// model with cosine-distance merge instead of a bare confidence compare.
pub struct KnowledgeStore {
    db: Mutex<Connection>,
    embeddings: Arc<EmbeddingStore>,
}

impl KnowledgeStore {
    pub fn new(conn: Connection, embeddings: Arc<EmbeddingStore>) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            embeddings,
        })
    }

    /// Inserts a fact, merges it into an existing semantically-similar fact
    /// of the same category (cosine distance below `threshold`), or aborts
    /// with no write if an identical fact already exists (spec §3 dedup
    /// protocol stage 1). Returns the row id that ends up holding the
    /// content (existing, merged, or newly inserted).
    pub async fn upsert_fact(
        &self,
        user_id: &str,
        category: FactCategory,
        content: &str,
        threshold: f32,
    ) -> Result<i64> {
        if let Some(id) = self.find_exact_match(user_id, EntityType::Fact, content)? {
            debug!(user_id, id, "exact-match fact already exists, skipping write");
            return Ok(id);
        }

        let candidates = self
            .embeddings
            .search_similar_for_type(user_id, source_type_for(EntityType::Fact), content, 5)
            .await?;

        let merge_target = {
            let db = self.db.lock().unwrap();
            candidates.into_iter().find_map(|m| {
                if m.distance >= threshold {
                    return None;
                }
                let same_category: Option<String> = db
                    .query_row(
                        "SELECT category FROM knowledge WHERE id = ?1 AND user_id = ?2 AND entity_type = 'fact'",
                        params![m.source_id, user_id],
                        |row| row.get(0),
                    )
                    .ok();
                match same_category {
                    Some(cat) if cat == category.to_string() => Some(m.source_id),
                    _ => None,
                }
            })
        };

        let id = if let Some(id) = merge_target {
            debug!(user_id, id, "merging fact into existing semantically-similar row");
            self.update_content(id, content)?;
            id
        } else {
            self.insert(user_id, EntityType::Fact, Some(category), None, content)?
        };

        self.embeddings.upsert(user_id, source_type_for(EntityType::Fact), id, content).await?;
        Ok(id)
    }

    /// Exact-match dedup only (spec §3: "Goals and shopping items use
    /// exact-match dedup only").
    pub async fn add_goal(&self, user_id: &str, content: &str) -> Result<i64> {
        if let Some(id) = self.find_exact_match(user_id, EntityType::Goal, content)? {
            debug!(user_id, id, "exact-match goal already exists, skipping write");
            return Ok(id);
        }
        let id = self.insert(user_id, EntityType::Goal, None, Some(GoalStatus::Active), content)?;
        self.embeddings.upsert(user_id, source_type_for(EntityType::Goal), id, content).await?;
        Ok(id)
    }

    /// Exact-match dedup only (spec §3).
    pub async fn add_shopping_item(&self, user_id: &str, content: &str) -> Result<i64> {
        if let Some(id) = self.find_exact_match(user_id, EntityType::ShoppingItem, content)? {
            debug!(user_id, id, "exact-match shopping item already exists, skipping write");
            return Ok(id);
        }
        let id = self.insert(user_id, EntityType::ShoppingItem, None, None, content)?;
        self.embeddings.upsert(user_id, source_type_for(EntityType::ShoppingItem), id, content).await?;
        Ok(id)
    }

    /// Case-insensitive exact content match scoped to one user + entity
    /// type (spec §3 dedup protocol stage 1, and the sole dedup rule for
    /// goals/shopping items).
    fn find_exact_match(&self, user_id: &str, entity_type: EntityType, content: &str) -> Result<Option<i64>> {
        let db = self.db.lock().unwrap();
        Ok(db
            .query_row(
                "SELECT id FROM knowledge WHERE user_id = ?1 AND entity_type = ?2 AND LOWER(content) = LOWER(?3)",
                params![user_id, entity_type.to_string(), content],
                |row| row.get(0),
            )
            .ok())
    }

    fn insert(
        &self,
        user_id: &str,
        entity_type: EntityType,
        category: Option<FactCategory>,
        status: Option<GoalStatus>,
        content: &str,
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO knowledge (user_id, entity_type, category, status, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                user_id,
                entity_type.to_string(),
                category.map(|c| c.to_string()),
                status.map(|s| s.to_string()),
                content,
                now
            ],
        )?;
        let id = db.last_insert_rowid();
        sync_fts_insert(&db, id, content)?;
        Ok(id)
    }

    fn update_content(&self, id: i64, content: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let old_content: Option<String> = db
            .query_row("SELECT content FROM knowledge WHERE id = ?1", params![id], |r| r.get(0))
            .ok();
        db.execute(
            "UPDATE knowledge SET content = ?1, updated_at = ?2 WHERE id = ?3",
            params![content, now, id],
        )?;
        if let Some(old) = old_content {
            sync_fts_delete(&db, id, &old)?;
        }
        sync_fts_insert(&db, id, content)?;
        Ok(())
    }

    pub fn update_status(&self, id: i64, status: GoalStatus) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "UPDATE knowledge SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.to_string(), now, id],
        )?;
        Ok(())
    }

    pub fn update_last_referenced(&self, id: i64) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "UPDATE knowledge SET last_referenced_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        Ok(())
    }

    pub fn delete(&self, user_id: &str, id: i64) -> Result<()> {
        let db = self.db.lock().unwrap();
        let row: Option<(String, String)> = db
            .query_row(
                "SELECT content, entity_type FROM knowledge WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .ok();
        let entity_type = row.as_ref().and_then(|(_, et)| et.parse::<EntityType>().ok());
        if let Some((content, _)) = &row {
            sync_fts_delete(&db, id, content)?;
            db.execute("DELETE FROM knowledge WHERE id = ?1", params![id])?;
        }
        drop(db);
        if let Some(entity_type) = entity_type {
            self.embeddings.delete(user_id, source_type_for(entity_type), id)?;
        }
        Ok(())
    }

    pub fn get(&self, id: i64) -> Result<Option<KnowledgeItem>> {
        let db = self.db.lock().unwrap();
        Ok(db
            .query_row(
                "SELECT id, user_id, entity_type, category, status, content, created_at, updated_at, last_referenced_at
                 FROM knowledge WHERE id = ?1",
                params![id],
                row_to_item,
            )
            .ok())
    }

    pub fn list(&self, user_id: &str, entity_type: EntityType) -> Result<Vec<KnowledgeItem>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, entity_type, category, status, content, created_at, updated_at, last_referenced_at
             FROM knowledge WHERE user_id = ?1 AND entity_type = ?2
             ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id, entity_type.to_string()], row_to_item)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Keyword fallback used by the memory injector when semantic search
    /// yields nothing useful (spec §4.C retrieval order).
    pub fn search_keyword(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<KnowledgeItem>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT k.id, k.user_id, k.entity_type, k.category, k.status, k.content,
                    k.created_at, k.updated_at, k.last_referenced_at
             FROM knowledge k
             JOIN knowledge_fts f ON k.id = f.rowid
             WHERE k.user_id = ?1 AND knowledge_fts MATCH ?2
             ORDER BY rank
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![user_id, query, limit], row_to_item)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Most-recently-updated rows — the final fallback stage when both
    /// semantic and keyword search come up empty.
    pub fn most_recent(&self, user_id: &str, limit: usize) -> Result<Vec<KnowledgeItem>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, entity_type, category, status, content, created_at, updated_at, last_referenced_at
             FROM knowledge WHERE user_id = ?1 ORDER BY updated_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit], row_to_item)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get_memory_summary(&self, user_id: &str) -> Result<MemorySummary> {
        let db = self.db.lock().unwrap();
        let mut summary = MemorySummary::default();

        let mut stmt = db.prepare(
            "SELECT category, COUNT(*) FROM knowledge WHERE user_id = ?1 AND entity_type = 'fact' GROUP BY category",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let cat: Option<String> = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((cat.unwrap_or_else(|| "other".to_string()), count as usize))
        })?;
        for r in rows.filter_map(|r| r.ok()) {
            summary.fact_count += r.1;
            summary.category_counts.insert(r.0, r.1);
        }

        summary.active_goal_count = db
            .query_row(
                "SELECT COUNT(*) FROM knowledge WHERE user_id = ?1 AND entity_type = 'goal' AND status = 'active'",
                params![user_id],
                |row| row.get::<_, i64>(0),
            )
            .unwrap_or(0) as usize;

        summary.shopping_item_count = db
            .query_row(
                "SELECT COUNT(*) FROM knowledge WHERE user_id = ?1 AND entity_type = 'shopping_item'",
                params![user_id],
                |row| row.get::<_, i64>(0),
            )
            .unwrap_or(0) as usize;

        debug!(user_id, fact_count = summary.fact_count, "computed memory summary");
        Ok(summary)
    }
}

fn sync_fts_insert(db: &Connection, id: i64, content: &str) -> rusqlite::Result<()> {
    db.execute(
        "INSERT INTO knowledge_fts(rowid, content) VALUES (?1, ?2)",
        params![id, content],
    )?;
    Ok(())
}

fn sync_fts_delete(db: &Connection, id: i64, content: &str) -> rusqlite::Result<()> {
    db.execute(
        "INSERT INTO knowledge_fts(knowledge_fts, rowid, content) VALUES('delete', ?1, ?2)",
        params![id, content],
    )?;
    Ok(())
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeItem> {
    let entity_type_str: String = row.get(2)?;
    let category_str: Option<String> = row.get(3)?;
    let status_str: Option<String> = row.get(4)?;
    Ok(KnowledgeItem {
        id: row.get(0)?,
        user_id: row.get(1)?,
        entity_type: entity_type_str.parse().unwrap_or(EntityType::Fact),
        category: category_str.and_then(|s| s.parse().ok()),
        status: status_str.and_then(|s| s.parse().ok()),
        content: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        last_referenced_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> KnowledgeStore {
        let embeddings = Arc::new(EmbeddingStore::new(Connection::open_in_memory().unwrap()).unwrap());
        KnowledgeStore::new(Connection::open_in_memory().unwrap(), embeddings).unwrap()
    }

    #[tokio::test]
    async fn duplicate_facts_merge_instead_of_duplicating() {
        let store = store();
        let id1 = store
            .upsert_fact("u1", FactCategory::Occupation, "I work as a veterinarian", 0.3)
            .await
            .unwrap();
        let id2 = store
            .upsert_fact("u1", FactCategory::Occupation, "I am a veterinarian by profession", 0.3)
            .await
            .unwrap();
        assert_eq!(id1, id2, "semantically similar same-category facts should merge");

        let facts = store.list("u1", EntityType::Fact).unwrap();
        assert_eq!(facts.len(), 1);
    }

    #[tokio::test]
    async fn different_categories_never_merge() {
        let store = store();
        let id1 = store
            .upsert_fact("u1", FactCategory::Occupation, "veterinarian", 0.9)
            .await
            .unwrap();
        let id2 = store
            .upsert_fact("u1", FactCategory::Hobby, "veterinarian-themed trivia", 0.9)
            .await
            .unwrap();
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn delete_removes_item_and_embedding() {
        let store = store();
        let id = store.add_goal("u1", "Run a marathon").await.unwrap();
        store.delete("u1", id).unwrap();
        assert!(store.get(id).unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_summary_counts_by_category() {
        let store = store();
        store.upsert_fact("u1", FactCategory::Health, "allergic to peanuts", 0.3).await.unwrap();
        store.upsert_fact("u1", FactCategory::Location, "lives in Austin", 0.3).await.unwrap();
        store.add_goal("u1", "learn guitar").await.unwrap();

        let summary = store.get_memory_summary("u1").unwrap();
        assert_eq!(summary.fact_count, 2);
        assert_eq!(summary.active_goal_count, 1);
    }

    #[tokio::test]
    async fn exact_duplicate_fact_aborts_with_no_new_row() {
        let store = store();
        let id1 = store
            .upsert_fact("u1", FactCategory::Location, "I live in Denver", 0.01)
            .await
            .unwrap();
        let id2 = store
            .upsert_fact("u1", FactCategory::Location, "i live in denver", 0.01)
            .await
            .unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.list("u1", EntityType::Fact).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exact_duplicate_goal_is_not_added_twice() {
        let store = store();
        let id1 = store.add_goal("u1", "Run a marathon").await.unwrap();
        let id2 = store.add_goal("u1", "run a marathon").await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.list("u1", EntityType::Goal).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exact_duplicate_shopping_item_is_not_added_twice() {
        let store = store();
        let id1 = store.add_shopping_item("u1", "Milk").await.unwrap();
        let id2 = store.add_shopping_item("u1", "milk").await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.list("u1", EntityType::ShoppingItem).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn embeddings_are_scoped_by_entity_type() {
        let store = store();
        store.upsert_fact("u1", FactCategory::Hobby, "loves hiking", 0.3).await.unwrap();
        store.add_goal("u1", "loves hiking").await.unwrap();

        let fact_hits = store
            .embeddings
            .search_similar_for_type("u1", source_type_for(EntityType::Fact), "loves hiking", 5)
            .await
            .unwrap();
        let goal_hits = store
            .embeddings
            .search_similar_for_type("u1", source_type_for(EntityType::Goal), "loves hiking", 5)
            .await
            .unwrap();
        assert_eq!(fact_hits.len(), 1);
        assert_eq!(goal_hits.len(), 1);
        assert_ne!(fact_hits[0].source_id, goal_hits[0].source_id);
    }
}
