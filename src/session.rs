//! Charge session tracking for Teslabus
//!
//! The vehicle API has no notion of a session, so a session starts when a
//! charging observation reports zero energy added. The start survives
//! restarts through the persisted state.

use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::persistence::PersistentState;
use chrono::{DateTime, SubsecRound, TimeZone, Utc};

/// What an observation did to the session start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    /// Energy added was zero while charging: a new session began now
    Reset,
    /// Charging was seen with no recorded start; now was adopted
    Adopted,
}

/// Tracks the start of the current charge session
#[derive(Debug)]
pub struct ChargeSessionTracker {
    start: Option<DateTime<Utc>>,
    session_id: Option<String>,
    logger: StructuredLogger,
}

impl ChargeSessionTracker {
    pub fn new() -> Self {
        Self {
            start: None,
            session_id: None,
            logger: get_logger_with_context(LogContext::new("session")),
        }
    }

    /// Restore from persisted state
    pub fn from_state(state: &PersistentState) -> Self {
        let mut tracker = Self::new();
        tracker.start = state
            .charge_session_start
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        tracker.session_id.clone_from(&state.session_id);
        tracker
    }

    pub const fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Apply a charging observation. Only called while the vehicle reports
    /// `Charging`; the start is reset exactly when `energy_added` is zero.
    pub fn observe_charging(&mut self, energy_added: f64, now: DateTime<Utc>) -> Option<SessionChange> {
        if energy_added == 0.0 {
            self.begin(now);
            self.logger.info(&format!(
                "New charge session {} started at {}",
                self.session_id.as_deref().unwrap_or("-"),
                now.to_rfc3339()
            ));
            return Some(SessionChange::Reset);
        }
        if self.start.is_none() {
            self.begin(now);
            self.logger.info(&format!(
                "Charging in progress with no recorded start, adopting {}",
                now.to_rfc3339()
            ));
            return Some(SessionChange::Adopted);
        }
        None
    }

    /// Seconds since the session start, floored at zero; zero without a start
    pub fn charging_time(&self, now: DateTime<Utc>) -> u64 {
        self.start
            .map_or(0, |start| u64::try_from((now - start).num_seconds()).unwrap_or(0))
    }

    // Whole seconds, matching what the state file can hold
    fn begin(&mut self, now: DateTime<Utc>) {
        self.start = Some(now.trunc_subsecs(0));
        self.session_id = Some(uuid::Uuid::new_v4().to_string());
    }
}

impl Default for ChargeSessionTracker {
    fn default() -> Self {
        Self::new()
    }
}
