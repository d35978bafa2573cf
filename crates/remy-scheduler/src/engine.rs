use std::sync::Mutex;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use remy_core::config::SchedulerConfig;
use remy_core::types::UserId;
use rusqlite::{params, Connection};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    schedule::{compute_next_run, next_cron_occurrence},
    types::{Automation, AutomationStatus},
};

fn fmt_opt(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(|d| d.to_rfc3339())
}

fn parse_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn row_to_automation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Automation> {
    let status_str: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(Automation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        label: row.get(2)?,
        cron: row.get(3)?,
        fire_at: parse_opt(row.get(4)?),
        last_run_at: parse_opt(row.get(5)?),
        status: status_str.parse().unwrap_or(AutomationStatus::Pending),
        next_run: parse_opt(row.get(7)?),
        created_at: parse_opt(Some(created_at)).unwrap_or_else(Utc::now),
        updated_at: parse_opt(Some(updated_at)).unwrap_or_else(Utc::now),
    })
}

const SELECT_COLUMNS: &str =
    "id, user_id, label, cron, fire_at, last_run_at, status, next_run, created_at, updated_at";

/// Cron-driven and one-shot trigger store (spec §4.J). Each automation
/// contributes one registered row keyed by its id; [`SchedulerEngine::run`]
/// polls every second, fires due rows into `fired_tx`, and advances or
/// retires them — the same 1-second `tokio::time::interval` shape as the
/// teacher's job engine, applied to an automation table instead of a
/// generic job table.
pub struct SchedulerEngine {
    conn: Mutex<Connection>,
    fired_tx: Option<mpsc::Sender<Automation>>,
    tz: Tz,
}

impl SchedulerEngine {
    /// Create a new engine, initialising the DB schema if needed.
    ///
    /// Pass `Some(tx)` to receive a copy of every fired [`Automation`] via
    /// mpsc; the send is non-blocking (`try_send`) so the tick loop is
    /// never stalled by a slow consumer.
    pub fn new(conn: Connection, fired_tx: Option<mpsc::Sender<Automation>>, tz: Tz) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            fired_tx,
            tz,
        })
    }

    /// Adds a new automation. `cron` xor `fire_at` must be set — enforced by
    /// [`Automation::validate`].
    pub fn add_automation(
        &self,
        user_id: &str,
        label: &str,
        cron: &str,
        fire_at: Option<DateTime<Utc>>,
    ) -> Result<Automation> {
        self.add_automation_with_id(&Uuid::new_v4().to_string(), user_id, label, cron, fire_at)
    }

    /// Same as [`Self::add_automation`] but with a caller-supplied id,
    /// `INSERT OR IGNORE`d so built-in jobs can be re-registered on every
    /// startup without duplicating rows.
    pub fn add_automation_with_id(
        &self,
        id: &str,
        user_id: &str,
        label: &str,
        cron: &str,
        fire_at: Option<DateTime<Utc>>,
    ) -> Result<Automation> {
        Automation::validate(cron, &fire_at).map_err(SchedulerError::InvalidSchedule)?;

        let now = Utc::now();
        let next_run = if let Some(at) = fire_at {
            if at > now {
                Some(at)
            } else {
                None
            }
        } else {
            next_cron_occurrence(cron, now, self.tz)
        };
        let now_str = now.to_rfc3339();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO automations
             (id, user_id, label, cron, fire_at, last_run_at, status, next_run, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,NULL,'pending',?6,?7,?7)",
            params![id, user_id, label, cron, fmt_opt(fire_at), fmt_opt(next_run), now_str],
        )?;
        info!(automation_id = %id, %user_id, %label, "automation registered");

        Ok(conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM automations WHERE id = ?1"),
            [id],
            row_to_automation,
        )?)
    }

    pub fn remove_automation(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM automations WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::NotFound { id: id.to_string() });
        }
        info!(automation_id = %id, "automation removed");
        Ok(())
    }

    /// Loads every persisted automation, grouped by user, used at startup
    /// to repopulate the in-memory fire schedule.
    pub fn load_user_automations(&self) -> Result<std::collections::HashMap<String, Vec<Automation>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM automations ORDER BY created_at"))?;
        let rows = stmt.query_map([], row_to_automation)?;

        let mut by_user: std::collections::HashMap<String, Vec<Automation>> =
            std::collections::HashMap::new();
        for r in rows.filter_map(|r| r.ok()) {
            by_user.entry(r.user_id.clone()).or_default().push(r);
        }
        Ok(by_user)
    }

    pub fn list_automations(&self) -> Result<Vec<Automation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM automations ORDER BY created_at"))?;
        let rows = stmt.query_map([], row_to_automation)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Registers the three built-in automations (morning briefing, evening
    /// check-in, nightly consolidation/reindex) for each allowed user, using
    /// deterministic ids so re-running at startup never duplicates rows.
    pub fn ensure_builtin_automations(&self, users: &[UserId], config: &SchedulerConfig) -> Result<()> {
        for user in users {
            self.add_automation_with_id(
                &format!("builtin:briefing:{user}"),
                user.as_str(),
                "Morning briefing",
                &config.morning_briefing_cron,
                None,
            )?;
            self.add_automation_with_id(
                &format!("builtin:checkin:{user}"),
                user.as_str(),
                "Evening check-in",
                &config.evening_checkin_cron,
                None,
            )?;
            self.add_automation_with_id(
                &format!("builtin:consolidation:{user}"),
                user.as_str(),
                "Nightly memory consolidation and reindex",
                &config.nightly_consolidation_cron,
                None,
            )?;
        }
        Ok(())
    }

    /// Main event loop. Polls every second until `shutdown` broadcasts `true`.
    ///
    /// Takes `Arc<Self>` rather than `Self` so a caller can keep a shared
    /// handle alive for `add_automation`/`list_automations` calls from HTTP
    /// handlers or tools while this loop runs concurrently.
    pub async fn run(self: std::sync::Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        self.mark_missed_on_startup();

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    // --- private helpers ---------------------------------------------------

    /// On startup, mark any pending automation whose next_run is in the past
    /// as Missed. The synthetic turn is never backfilled for a missed fire.
    fn mark_missed_on_startup(&self) {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        match conn.execute(
            "UPDATE automations SET status = 'missed', updated_at = ?1
             WHERE status = 'pending' AND next_run IS NOT NULL AND next_run < ?1",
            [&now],
        ) {
            Ok(n) if n > 0 => warn!(count = n, "automations marked missed on startup"),
            Err(e) => error!("missed-on-startup query failed: {e}"),
            _ => {}
        }
    }

    /// Process all automations whose next_run has arrived.
    fn tick(&self) -> Result<()> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let due: Vec<Automation> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM automations
                 WHERE status = 'pending' AND next_run IS NOT NULL AND next_run <= ?1"
            ))?;
            let rows: Vec<_> = stmt
                .query_map([&now_str], row_to_automation)?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        for automation in due {
            // One-shot automations self-remove after firing; cron ones
            // advance to their next occurrence and stay pending.
            let next = if automation.is_one_shot() {
                None
            } else {
                compute_next_run(&automation, now)
            };
            let new_status = if next.is_none() {
                AutomationStatus::Completed
            } else {
                AutomationStatus::Pending
            };

            info!(automation_id = %automation.id, label = %automation.label, "automation fired");

            {
                let conn = self.conn.lock().unwrap();
                // Idempotence (spec §4.J): last_run_at only moves forward once
                // this row update succeeds; the synthetic turn's own
                // persistence is the pipeline's responsibility downstream.
                conn.execute(
                    "UPDATE automations SET status=?1, last_run_at=?2, next_run=?3, updated_at=?2
                     WHERE id=?4",
                    params![new_status.to_string(), now_str, fmt_opt(next), automation.id],
                )?;
            }

            if automation.is_one_shot() {
                let _ = self.remove_automation(&automation.id);
            }

            if let Some(ref tx) = self.fired_tx {
                let fired = Automation {
                    last_run_at: Some(now),
                    status: new_status,
                    next_run: next,
                    ..automation
                };
                if tx.try_send(fired).is_err() {
                    warn!("delivery channel full or closed — fire dropped");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SchedulerEngine {
        SchedulerEngine::new(Connection::open_in_memory().unwrap(), None, Tz::UTC).unwrap()
    }

    #[test]
    fn rejects_automation_with_neither_cron_nor_fire_at() {
        let e = engine();
        assert!(e.add_automation("u1", "bad", "", None).is_err());
    }

    #[test]
    fn rejects_automation_with_both_cron_and_fire_at() {
        let e = engine();
        assert!(e
            .add_automation("u1", "bad", "0 7 * * *", Some(Utc::now()))
            .is_err());
    }

    #[test]
    fn cron_automation_advances_next_run_without_self_removing() {
        let e = engine();
        let automation = e.add_automation("u1", "briefing", "* * * * *", None).unwrap();
        assert!(automation.next_run.is_some());
        assert!(!automation.is_one_shot());
    }

    #[test]
    fn one_shot_automation_self_removes_after_firing() {
        let e = engine();
        let past = Utc::now() - chrono::Duration::seconds(5);
        let automation = e.add_automation("u1", "reminder", "", Some(past)).unwrap();
        // next_run is None because fire_at is already in the past, but the
        // row is still present until the tick loop processes and removes it.
        assert!(automation.next_run.is_none());
    }

    #[test]
    fn builtin_automations_are_idempotent_across_restarts() {
        let e = engine();
        let config = SchedulerConfig::default();
        let users = vec![UserId::from("alice")];
        e.ensure_builtin_automations(&users, &config).unwrap();
        e.ensure_builtin_automations(&users, &config).unwrap();
        assert_eq!(e.list_automations().unwrap().len(), 3);
    }
}
