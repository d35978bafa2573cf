use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `automations` table (idempotent) and an index on `next_run`
/// so the polling query stays efficient with thousands of rows.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS automations (
            id          TEXT    NOT NULL PRIMARY KEY,
            user_id     TEXT    NOT NULL,
            label       TEXT    NOT NULL,
            cron        TEXT    NOT NULL DEFAULT '',
            fire_at     TEXT,
            last_run_at TEXT,
            status      TEXT    NOT NULL DEFAULT 'pending',
            next_run    TEXT,
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        ) STRICT;

        -- Efficient polling: SELECT … WHERE next_run <= ?  ORDER BY next_run
        CREATE INDEX IF NOT EXISTS idx_automations_next_run ON automations (next_run);
        CREATE INDEX IF NOT EXISTS idx_automations_user ON automations (user_id);
        ",
    )?;
    Ok(())
}
