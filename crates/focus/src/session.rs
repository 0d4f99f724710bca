//! Focus session types and the persisted timer state
//!
//! The timer never counts down in memory. While running, the only source of
//! truth is `end_timestamp`; remaining time is recomputed from the wall clock
//! every time somebody asks, so a suspended process picks up exactly where
//! the clock says it should be.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::FocusConfig;

/// Lifecycle of the active countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    #[default]
    Idle,
    Running,
    Paused,
}

impl TimerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerMode::Idle => "idle",
            TimerMode::Running => "running",
            TimerMode::Paused => "paused",
        }
    }
}

/// Which phase is active or was last configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    /// Work interval; blocking may apply and completion is credited
    #[default]
    Focus,
    /// Rest interval; never credited
    Break,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Focus => "focus",
            SessionType::Break => "break",
        }
    }

    /// Heading shown to the user
    pub fn label(&self) -> &'static str {
        match self {
            SessionType::Focus => "Focus Session",
            SessionType::Break => "Break Time",
        }
    }

    /// The phase that follows this one
    pub fn next(&self) -> Self {
        match self {
            SessionType::Focus => SessionType::Break,
            SessionType::Break => SessionType::Focus,
        }
    }
}

/// The singleton timer record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub mode: TimerMode,
    pub session_type: SessionType,
    /// Seconds left while idle or paused; stale while running
    pub remaining_seconds: u32,
    /// Set if and only if `mode` is running
    pub end_timestamp: Option<DateTime<Utc>>,
    /// Full length of the current session, credited on natural completion
    #[serde(default)]
    pub session_minutes: u32,
}

impl SessionState {
    /// Initial state of a fresh install
    pub fn new(config: &FocusConfig) -> Self {
        Self::idle(SessionType::Focus, config)
    }

    /// An idle session of the given type with its full configured duration
    pub fn idle(session_type: SessionType, config: &FocusConfig) -> Self {
        Self {
            mode: TimerMode::Idle,
            session_type,
            remaining_seconds: config.duration_seconds(session_type),
            end_timestamp: None,
            session_minutes: config.duration_minutes(session_type),
        }
    }

    pub fn is_running(&self) -> bool {
        self.mode == TimerMode::Running
    }

    /// Remaining seconds as of `now`, never negative
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u32 {
        match (self.mode, self.end_timestamp) {
            (TimerMode::Running, Some(end)) => seconds_until(end, now),
            _ => self.remaining_seconds,
        }
    }

    /// A running session whose deadline has passed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!((self.mode, self.end_timestamp), (TimerMode::Running, Some(end)) if end <= now)
    }

    /// Progress through the current session as a percentage (0-100)
    pub fn progress_percent(&self, now: DateTime<Utc>) -> u32 {
        let total = self.session_minutes * 60;
        if total == 0 {
            return 0;
        }
        let remaining = self.remaining_at(now).min(total);
        ((total - remaining) * 100) / total
    }

    /// `end_timestamp` is present exactly while running
    pub fn is_consistent(&self) -> bool {
        self.is_running() == self.end_timestamp.is_some()
    }

    /// Restore the running/end-timestamp invariant on a record read from disk
    pub fn repaired(mut self) -> Self {
        if self.is_consistent() {
            return self;
        }
        warn!(
            "Timer state out of sync (mode {}, end {:?}), repairing",
            self.mode.as_str(),
            self.end_timestamp
        );
        if self.is_running() {
            self.mode = TimerMode::Paused;
        } else {
            self.end_timestamp = None;
        }
        self
    }
}

/// Whole seconds from `now` until `end`, rounded up and clamped at zero
pub fn seconds_until(end: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let millis = end.signed_duration_since(now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        ((millis + 999) / 1000).min(u32::MAX as i64) as u32
    }
}

/// A session that ran out naturally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub session_type: SessionType,
    /// Minutes credited to the daily stats (zero for breaks)
    pub credited_minutes: u32,
    /// Calendar day the session ended on
    pub day: NaiveDate,
    /// When the deadline passed
    pub ended_at: DateTime<Utc>,
}

/// What a surface needs to render the timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub state: SessionState,
    pub remaining_seconds: u32,
    pub blocking_active: bool,
    pub taken_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn running(end: DateTime<Utc>) -> SessionState {
        SessionState {
            mode: TimerMode::Running,
            session_type: SessionType::Focus,
            remaining_seconds: 1500,
            end_timestamp: Some(end),
            session_minutes: 25,
        }
    }

    #[test]
    fn test_fresh_state_defaults() {
        let state = SessionState::new(&FocusConfig::default());
        assert_eq!(state.mode, TimerMode::Idle);
        assert_eq!(state.session_type, SessionType::Focus);
        assert_eq!(state.remaining_seconds, 1500);
        assert_eq!(state.session_minutes, 25);
        assert!(state.end_timestamp.is_none());
        assert!(state.is_consistent());
    }

    #[test]
    fn test_remaining_follows_wall_clock() {
        let state = running(at(1500));
        assert_eq!(state.remaining_at(at(0)), 1500);
        assert_eq!(state.remaining_at(at(1000)), 500);
        assert_eq!(state.remaining_at(at(1500)), 0);
        // Long suspension never goes negative
        assert_eq!(state.remaining_at(at(86_400)), 0);
    }

    #[test]
    fn test_partial_seconds_round_up() {
        let state = running(at(10));
        let now = at(9) + Duration::milliseconds(1);
        assert_eq!(state.remaining_at(now), 1);
        assert!(!state.is_due(now));
        assert!(state.is_due(at(10)));
    }

    #[test]
    fn test_idle_ignores_end_timestamp() {
        let state = SessionState::new(&FocusConfig::default());
        assert_eq!(state.remaining_at(at(99_999)), 1500);
        assert!(!state.is_due(at(99_999)));
    }

    #[test]
    fn test_progress() {
        let state = running(at(750));
        assert_eq!(state.progress_percent(at(0)), 50);
        assert_eq!(state.progress_percent(at(750)), 100);
    }

    #[test]
    fn test_repair_running_without_deadline() {
        let mut state = running(at(0));
        state.end_timestamp = None;
        let repaired = state.repaired();
        assert_eq!(repaired.mode, TimerMode::Paused);
        assert!(repaired.is_consistent());

        let mut idle = SessionState::new(&FocusConfig::default());
        idle.end_timestamp = Some(at(5));
        assert!(idle.repaired().end_timestamp.is_none());
    }

    #[test]
    fn test_session_type_alternates() {
        for st in [SessionType::Focus, SessionType::Break] {
            assert_ne!(st.next(), st);
            assert_eq!(st.next().next(), st);
        }
        assert_eq!(SessionType::Focus.as_str(), "focus");
        assert_eq!(SessionType::Break.as_str(), "break");
    }

    #[test]
    fn test_state_uses_camel_case_keys() {
        let value = serde_json::to_value(running(at(0))).unwrap();
        assert_eq!(value["mode"], "running");
        assert_eq!(value["sessionType"], "focus");
        assert_eq!(value["remainingSeconds"], 1500);
        assert!(value["endTimestamp"].is_string());
    }
}
