use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::embedder::{self, MODEL_NAME};
use crate::error::Result;
use crate::types::Match;

/// Sqlite-backed vector store with brute-force cosine-similarity search —
/// the "ANN" of spec §4.B. Legitimate at single-user scale: a full scan of
/// a few thousand rows costs microseconds, and no ANN/vector-database crate
/// exists anywhere in the teacher's own dependency tree to reach for instead.
pub struct EmbeddingStore {
    db: Mutex<Connection>,
}

impl EmbeddingStore {
    pub fn new(conn: Connection) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Embeds `text` and upserts the vector for `(user_id, source_type, source_id)`.
    /// Returns the row id, which callers link back into their own tables
    /// (e.g. `KnowledgeItem.embedding_id`).
    pub async fn upsert(
        &self,
        user_id: &str,
        source_type: &str,
        source_id: i64,
        text: &str,
    ) -> Result<i64> {
        let vector = embedder::embed(text).await?;
        self.upsert_vector(user_id, source_type, source_id, text, &vector)
    }

    pub fn upsert_vector(
        &self,
        user_id: &str,
        source_type: &str,
        source_id: i64,
        content_text: &str,
        vector: &[f32],
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let bytes = embedder::vector_to_bytes(vector);
        let id: i64 = db.query_row(
            "INSERT INTO embeddings (user_id, source_type, source_id, content_text, model_name, vector, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id, source_type, source_id) DO UPDATE SET
                content_text = excluded.content_text,
                model_name = excluded.model_name,
                vector = excluded.vector,
                created_at = excluded.created_at
             RETURNING id",
            params![user_id, source_type, source_id, content_text, MODEL_NAME, bytes, now],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn delete(&self, user_id: &str, source_type: &str, source_id: i64) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM embeddings WHERE user_id = ?1 AND source_type = ?2 AND source_id = ?3",
            params![user_id, source_type, source_id],
        )?;
        Ok(())
    }

    /// Returns the vector stored for one source row, if any.
    pub fn get_vector(&self, user_id: &str, source_type: &str, source_id: i64) -> Result<Option<Vec<f32>>> {
        let db = self.db.lock().unwrap();
        let bytes: Option<Vec<u8>> = db
            .query_row(
                "SELECT vector FROM embeddings WHERE user_id = ?1 AND source_type = ?2 AND source_id = ?3",
                params![user_id, source_type, source_id],
                |row| row.get(0),
            )
            .ok();
        Ok(bytes.map(|b| embedder::bytes_to_vector(&b)))
    }

    /// Brute-force cosine search over every row scoped to `user_id` +
    /// `source_type`, sorted nearest-first. Returns an empty vec (never an
    /// error) when the index is empty or unavailable, per spec contract.
    pub async fn search_similar_for_type(
        &self,
        user_id: &str,
        source_type: &str,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<Match>> {
        let query_vector = embedder::embed(query_text).await?;
        self.search_similar_vector(user_id, source_type, &query_vector, limit)
    }

    pub fn search_similar_vector(
        &self,
        user_id: &str,
        source_type: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<Match>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, source_id, source_type, content_text, vector
             FROM embeddings WHERE user_id = ?1 AND source_type = ?2",
        )?;
        let rows = stmt.query_map(params![user_id, source_type], |row| {
            let id: i64 = row.get(0)?;
            let source_id: i64 = row.get(1)?;
            let source_type: String = row.get(2)?;
            let content_text: String = row.get(3)?;
            let bytes: Vec<u8> = row.get(4)?;
            Ok((id, source_id, source_type, content_text, bytes))
        })?;

        let mut matches: Vec<Match> = rows
            .filter_map(|r| r.ok())
            .map(|(id, source_id, source_type, content_text, bytes)| {
                let vector = embedder::bytes_to_vector(&bytes);
                let distance = embedder::cosine_distance(query_vector, &vector);
                Match {
                    id,
                    source_id,
                    source_type,
                    content_text,
                    distance,
                }
            })
            .collect();

        matches.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap());
        matches.truncate(limit);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_store() -> EmbeddingStore {
        EmbeddingStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn upsert_then_search_finds_nearest() {
        let store = mem_store();
        store.upsert("u1", "fact", 1, "I live in Portland").await.unwrap();
        store.upsert("u1", "fact", 2, "I work as a nurse").await.unwrap();

        let hits = store
            .search_similar_for_type("u1", "fact", "Where do I live?", 5)
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].source_id, 1);
        assert_eq!(hits[0].source_type, "fact");
        assert_eq!(hits[0].content_text, "I live in Portland");
    }

    #[tokio::test]
    async fn upsert_returns_same_id_on_update() {
        let store = mem_store();
        let first = store.upsert("u1", "fact", 1, "original text").await.unwrap();
        let second = store.upsert("u1", "fact", 1, "revised text").await.unwrap();
        assert_eq!(first, second);

        let hits = store
            .search_similar_for_type("u1", "fact", "revised text", 5)
            .await
            .unwrap();
        assert_eq!(hits[0].content_text, "revised text");
    }

    #[tokio::test]
    async fn search_scoped_by_user() {
        let store = mem_store();
        store.upsert("u1", "fact", 1, "shared text").await.unwrap();
        let hits = store
            .search_similar_for_type("u2", "fact", "shared text", 5)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_from_search() {
        let store = mem_store();
        store.upsert("u1", "fact", 1, "temporary fact").await.unwrap();
        store.delete("u1", "fact", 1).unwrap();
        let hits = store
            .search_similar_for_type("u1", "fact", "temporary fact", 5)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
