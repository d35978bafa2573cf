use rusqlite::{Connection, Result};

/// Idempotent schema init, grounded in the teacher's `user_memory`/
/// `user_memory_fts` pairing (`skynet-memory/src/db.rs`).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_knowledge_table(conn)?;
    create_fts_index(conn)?;
    Ok(())
}

/// Schema for the plan-tracking tables (spec §3), sharing `knowledge.db`
/// with the main `knowledge` table but kept in their own tables/module
/// (`plans.rs`) rather than folded into the entity-type model above, since
/// a plan's steps and attempts are themselves structured rows, not a
/// single piece of content.
pub fn init_plans_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS plans (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL,
            title       TEXT NOT NULL,
            description TEXT,
            status      TEXT NOT NULL DEFAULT 'active',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_plans_user_status
            ON plans(user_id, status);

        CREATE TABLE IF NOT EXISTS plan_steps (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            plan_id     INTEGER NOT NULL,
            position    INTEGER NOT NULL,
            title       TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'pending',
            notes       TEXT,
            UNIQUE(plan_id, position)
        );
        CREATE INDEX IF NOT EXISTS idx_plan_steps_plan
            ON plan_steps(plan_id);

        CREATE TABLE IF NOT EXISTS plan_attempts (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            step_id       INTEGER NOT NULL,
            outcome       TEXT NOT NULL,
            notes         TEXT,
            attempted_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_plan_attempts_step
            ON plan_attempts(step_id);",
    )
}

fn create_knowledge_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS knowledge (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id             TEXT NOT NULL,
            entity_type         TEXT NOT NULL,
            category            TEXT,
            status              TEXT,
            content             TEXT NOT NULL,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL,
            last_referenced_at  TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_knowledge_user_type
            ON knowledge(user_id, entity_type);
        CREATE INDEX IF NOT EXISTS idx_knowledge_user_category
            ON knowledge(user_id, category);",
    )
}

/// External-content FTS5 index over `content`, synced manually on write —
/// backs the memory injector's keyword fallback stage (spec §4.C).
fn create_fts_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_fts
            USING fts5(content, content='knowledge', content_rowid='id');",
    )
}
