//! `remy-scheduler` — cron-driven and one-shot automation engine with
//! SQLite persistence.
//!
//! # Overview
//!
//! Automations are persisted to a SQLite `automations` table. The
//! [`engine::SchedulerEngine`] polls the database every second and fires
//! any row whose `next_run` has arrived, feeding it into the proactive
//! pipeline as a synthetic user turn. Cron-driven automations advance to
//! their next occurrence; one-shot automations (`fire_at` set) self-remove.
//!
//! All cron expressions are evaluated against a configurable IANA timezone
//! ([`schedule::resolve_timezone`]).

pub mod db;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod types;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use schedule::{compute_next_run, next_cron_occurrence, resolve_timezone};
pub use types::{Automation, AutomationStatus};
