use rusqlite::{Connection, Result};

/// Idempotent schema init, grounded in the teacher's `create_user_memory_table`
/// / `create_fts_index` style `execute_batch` pairing.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS embeddings (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id      TEXT NOT NULL,
            source_type  TEXT NOT NULL,
            source_id    INTEGER NOT NULL,
            content_text TEXT NOT NULL DEFAULT '',
            model_name   TEXT NOT NULL,
            vector       BLOB NOT NULL,
            created_at   TEXT NOT NULL,
            UNIQUE(user_id, source_type, source_id)
        );
        CREATE INDEX IF NOT EXISTS idx_embeddings_scope
            ON embeddings(user_id, source_type);",
    )
}
