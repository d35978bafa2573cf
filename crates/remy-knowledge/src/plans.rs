use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::error::{KnowledgeError, Result};
use crate::types::{Attempt, Plan, PlanStatus, PlanStep, PlanSummary, StepStatus};

/// Multi-step plan tracking (spec §3), sharing `knowledge.db` with
/// `KnowledgeStore` via its own connection to the same file rather than a
/// shared handle — the same two-connections-one-file pattern
/// `remy-gateway::main` already uses for `KnowledgeStore`/`EmbeddingStore`.
///
/// Grounded in `original_source/remy/ai/tools/plans.py`'s five executor
/// functions (`exec_create_plan`/`exec_get_plan`/`exec_list_plans`/
/// `exec_update_plan_step`/`exec_update_plan_status`), which this store
/// backs one-to-one.
pub struct PlanStore {
    db: Mutex<Connection>,
}

impl PlanStore {
    pub fn new(conn: Connection) -> Result<Self> {
        crate::db::init_plans_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Creates a plan and its ordered steps in one transaction, positions
    /// numbered from 1 (spec §3: "step positions are unique within a
    /// plan"). Returns the new plan's id.
    pub fn create_plan(&self, user_id: &str, title: &str, description: Option<&str>, steps: &[String]) -> Result<i64> {
        let mut db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO plans (user_id, title, description, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'active', ?4, ?4)",
            params![user_id, title, description, now],
        )?;
        let plan_id = tx.last_insert_rowid();
        for (i, step_title) in steps.iter().enumerate() {
            tx.execute(
                "INSERT INTO plan_steps (plan_id, position, title, status) VALUES (?1, ?2, ?3, 'pending')",
                params![plan_id, (i + 1) as i64, step_title],
            )?;
        }
        tx.commit()?;
        Ok(plan_id)
    }

    pub fn get_plan(&self, plan_id: i64) -> Result<Option<Plan>> {
        let db = self.db.lock().unwrap();
        self.load_plan(&db, "id = ?1", params![plan_id])
    }

    /// Case-insensitive substring match on title, most recently updated
    /// match wins when more than one plan matches.
    pub fn get_plan_by_title(&self, user_id: &str, title_query: &str) -> Result<Option<Plan>> {
        let db = self.db.lock().unwrap();
        let pattern = format!("%{}%", title_query.to_lowercase());
        self.load_plan(
            &db,
            "user_id = ?1 AND LOWER(title) LIKE ?2 ORDER BY updated_at DESC",
            params![user_id, pattern],
        )
    }

    fn load_plan(&self, db: &Connection, where_clause: &str, query_params: &[&dyn rusqlite::ToSql]) -> Result<Option<Plan>> {
        let sql = format!(
            "SELECT id, user_id, title, description, status, created_at, updated_at
             FROM plans WHERE {where_clause} LIMIT 1"
        );
        let plan = db
            .query_row(&sql, query_params, |row| {
                let status_str: String = row.get(4)?;
                Ok(Plan {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                    status: status_str.parse().unwrap_or(PlanStatus::Active),
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                    steps: Vec::new(),
                })
            })
            .ok();

        let Some(mut plan) = plan else {
            return Ok(None);
        };
        plan.steps = self.load_steps(db, plan.id)?;
        Ok(Some(plan))
    }

    fn load_steps(&self, db: &Connection, plan_id: i64) -> Result<Vec<PlanStep>> {
        let mut stmt = db.prepare(
            "SELECT id, plan_id, position, title, status, notes
             FROM plan_steps WHERE plan_id = ?1 ORDER BY position",
        )?;
        let mut steps: Vec<PlanStep> = stmt
            .query_map(params![plan_id], |row| {
                let status_str: String = row.get(4)?;
                Ok(PlanStep {
                    id: row.get(0)?,
                    plan_id: row.get(1)?,
                    position: row.get(2)?,
                    title: row.get(3)?,
                    status: status_str.parse().unwrap_or(StepStatus::Pending),
                    notes: row.get(5)?,
                    attempts: Vec::new(),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        for step in &mut steps {
            step.attempts = self.load_attempts(db, step.id)?;
        }
        Ok(steps)
    }

    fn load_attempts(&self, db: &Connection, step_id: i64) -> Result<Vec<Attempt>> {
        let mut stmt = db.prepare(
            "SELECT id, step_id, outcome, notes, attempted_at
             FROM plan_attempts WHERE step_id = ?1 ORDER BY attempted_at",
        )?;
        let rows = stmt.query_map(params![step_id], |row| {
            Ok(Attempt {
                id: row.get(0)?,
                step_id: row.get(1)?,
                outcome: row.get(2)?,
                notes: row.get(3)?,
                attempted_at: row.get(4)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// `status` of `"all"` returns every plan regardless of status.
    pub fn list_plans(&self, user_id: &str, status: &str) -> Result<Vec<PlanSummary>> {
        let db = self.db.lock().unwrap();
        let mut stmt = if status == "all" {
            db.prepare(
                "SELECT id, title, status, updated_at FROM plans WHERE user_id = ?1 ORDER BY updated_at DESC",
            )?
        } else {
            db.prepare(
                "SELECT id, title, status, updated_at FROM plans
                 WHERE user_id = ?1 AND status = ?2 ORDER BY updated_at DESC",
            )?
        };

        let rows: Vec<(i64, String, String, String)> = if status == "all" {
            stmt.query_map(params![user_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .filter_map(|r| r.ok())
            .collect()
        } else {
            stmt.query_map(params![user_id, status], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .filter_map(|r| r.ok())
            .collect()
        };

        let mut summaries = Vec::with_capacity(rows.len());
        for (id, title, status_str, updated_at) in rows {
            let step_counts = self.step_counts(&db, id)?;
            let total_steps = step_counts.values().sum();
            summaries.push(PlanSummary {
                id,
                title,
                status: status_str.parse().unwrap_or(PlanStatus::Active),
                total_steps,
                step_counts,
                updated_at,
            });
        }
        Ok(summaries)
    }

    fn step_counts(&self, db: &Connection, plan_id: i64) -> Result<HashMap<String, usize>> {
        let mut stmt = db.prepare("SELECT status, COUNT(*) FROM plan_steps WHERE plan_id = ?1 GROUP BY status")?;
        let rows = stmt.query_map(params![plan_id], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count as usize))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Validates `status` against [`StepStatus`] before writing. Returns
    /// `Ok(false)` when no step with `step_id` exists.
    pub fn update_step_status(&self, step_id: i64, status: &str) -> Result<bool> {
        let parsed: StepStatus = status.parse().map_err(KnowledgeError::InvalidStatus)?;
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE plan_steps SET status = ?1 WHERE id = ?2",
            params![parsed.to_string(), step_id],
        )?;
        Ok(n > 0)
    }

    /// Logs an attempt against a step (spec §3: append-only). Returns the
    /// new attempt's id.
    pub fn add_attempt(&self, step_id: i64, outcome: &str, notes: Option<&str>) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO plan_attempts (step_id, outcome, notes, attempted_at) VALUES (?1, ?2, ?3, ?4)",
            params![step_id, outcome, notes, now],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Validates `status` against [`PlanStatus`] before writing. Returns
    /// `Ok(false)` when no plan with `plan_id` exists.
    pub fn update_plan_status(&self, plan_id: i64, status: &str) -> Result<bool> {
        let parsed: PlanStatus = status.parse().map_err(KnowledgeError::InvalidStatus)?;
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let n = db.execute(
            "UPDATE plans SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![parsed.to_string(), now, plan_id],
        )?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PlanStore {
        PlanStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn create_and_get_plan_round_trips_steps() {
        let store = store();
        let steps = vec!["Get quotes".to_string(), "Hire contractor".to_string()];
        let id = store.create_plan("u1", "Fix the fence", Some("backyard"), &steps).unwrap();

        let plan = store.get_plan(id).unwrap().unwrap();
        assert_eq!(plan.title, "Fix the fence");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].position, 1);
        assert_eq!(plan.steps[1].position, 2);
        assert_eq!(plan.steps[0].status, StepStatus::Pending);
    }

    #[test]
    fn get_plan_by_title_is_case_insensitive_substring_match() {
        let store = store();
        store.create_plan("u1", "Tax Return 2026", None, &["File forms".to_string()]).unwrap();

        let plan = store.get_plan_by_title("u1", "tax").unwrap().unwrap();
        assert_eq!(plan.title, "Tax Return 2026");
    }

    #[test]
    fn update_step_status_rejects_unknown_status() {
        let store = store();
        let id = store.create_plan("u1", "Plan", None, &["Step 1".to_string()]).unwrap();
        let plan = store.get_plan(id).unwrap().unwrap();
        let step_id = plan.steps[0].id;

        assert!(store.update_step_status(step_id, "bogus").is_err());
        assert!(store.update_step_status(step_id, "done").is_ok());
        let plan = store.get_plan(id).unwrap().unwrap();
        assert_eq!(plan.steps[0].status, StepStatus::Done);
    }

    #[test]
    fn update_step_status_returns_false_for_unknown_step() {
        let store = store();
        assert!(!store.update_step_status(999, "done").unwrap());
    }

    #[test]
    fn add_attempt_is_append_only_and_visible_via_get_plan() {
        let store = store();
        let id = store.create_plan("u1", "Plan", None, &["Call Jim".to_string()]).unwrap();
        let step_id = store.get_plan(id).unwrap().unwrap().steps[0].id;

        store.add_attempt(step_id, "no answer", None).unwrap();
        store.add_attempt(step_id, "left voicemail", Some("tried again at 5pm")).unwrap();

        let plan = store.get_plan(id).unwrap().unwrap();
        assert_eq!(plan.steps[0].attempts.len(), 2);
        assert_eq!(plan.steps[0].attempts[0].outcome, "no answer");
        assert_eq!(plan.steps[0].attempts[1].notes.as_deref(), Some("tried again at 5pm"));
    }

    #[test]
    fn list_plans_filters_by_status_and_counts_steps() {
        let store = store();
        let active = store.create_plan("u1", "Active plan", None, &["a".to_string(), "b".to_string()]).unwrap();
        let done = store.create_plan("u1", "Done plan", None, &["a".to_string()]).unwrap();
        store.update_plan_status(done, "complete").unwrap();

        let active_plans = store.list_plans("u1", "active").unwrap();
        assert_eq!(active_plans.len(), 1);
        assert_eq!(active_plans[0].id, active);
        assert_eq!(active_plans[0].total_steps, 2);
        assert_eq!(active_plans[0].step_counts.get("pending"), Some(&2));

        let all_plans = store.list_plans("u1", "all").unwrap();
        assert_eq!(all_plans.len(), 2);
    }

    #[test]
    fn update_plan_status_rejects_unknown_status() {
        let store = store();
        let id = store.create_plan("u1", "Plan", None, &["a".to_string()]).unwrap();
        assert!(store.update_plan_status(id, "bogus").is_err());
        assert!(store.update_plan_status(id, "abandoned").is_ok());
    }

    #[test]
    fn update_plan_status_returns_false_for_unknown_plan() {
        let store = store();
        assert!(!store.update_plan_status(999, "complete").unwrap());
    }

    #[test]
    fn step_positions_are_unique_within_a_plan() {
        let store = store();
        let steps = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let id = store.create_plan("u1", "Plan", None, &steps).unwrap();
        let plan = store.get_plan(id).unwrap().unwrap();
        let positions: Vec<i64> = plan.steps.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }
}
