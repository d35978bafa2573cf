use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::types::Automation;

/// Compute the next UTC fire time for `automation` starting strictly *after*
/// `from`, evaluating cron expressions in `tz` (spec §4.J: "all cron
/// expressions are evaluated in a configurable local timezone").
///
/// Returns `None` when the automation is exhausted: a one-shot whose
/// `fire_at` has already passed, or a cron expression with no further
/// occurrences (the `cron` crate never reports this for standard five-field
/// expressions, but the conversion is kept fallible for malformed input).
pub fn compute_next_run(automation: &Automation, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(at) = automation.fire_at {
        return if at > from { Some(at) } else { None };
    }
    next_cron_occurrence(&automation.cron, from, Tz::UTC)
}

/// Same as [`compute_next_run`] but for a raw cron expression, used by the
/// built-in jobs (morning briefing, evening check-in, nightly consolidation)
/// which are configured directly from [`remy_core::config::SchedulerConfig`]
/// rather than through an `Automation` row.
pub fn next_cron_occurrence(expression: &str, from: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    let schedule = cron::Schedule::from_str(expression).ok()?;
    let from_local = from.with_timezone(&tz);
    schedule
        .after(&from_local)
        .next()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Resolves a configured IANA timezone name, falling back to UTC on an
/// unrecognized name rather than failing startup.
pub fn resolve_timezone(name: &str) -> Tz {
    Tz::from_str(name).unwrap_or(Tz::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn daily_seven_am_rolls_to_tomorrow_when_past() {
        let from = Utc.with_ymd_and_hms(2026, 8, 1, 8, 0, 0).unwrap();
        let next = next_cron_occurrence("0 7 * * *", from, Tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 2, 7, 0, 0).unwrap());
    }

    #[test]
    fn daily_seven_am_same_day_when_still_ahead() {
        let from = Utc.with_ymd_and_hms(2026, 8, 1, 6, 0, 0).unwrap();
        let next = next_cron_occurrence("0 7 * * *", from, Tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 1, 7, 0, 0).unwrap());
    }

    #[test]
    fn one_shot_exhausted_once_past() {
        let from = Utc.with_ymd_and_hms(2026, 8, 1, 8, 0, 0).unwrap();
        let automation = Automation {
            id: "a1".into(),
            user_id: "u1".into(),
            label: "test".into(),
            cron: String::new(),
            fire_at: Some(Utc.with_ymd_and_hms(2026, 8, 1, 7, 0, 0).unwrap()),
            last_run_at: None,
            status: crate::types::AutomationStatus::Pending,
            next_run: None,
            created_at: from,
            updated_at: from,
        };
        assert_eq!(compute_next_run(&automation, from), None);
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        assert_eq!(resolve_timezone("Not/A_Zone"), Tz::UTC);
    }
}
