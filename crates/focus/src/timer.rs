//! Timer controller: the only writer of the timer state
//!
//! ## State transitions
//!
//! ```text
//! idle --start--> running --pause--> paused --start--> running
//!   ^                |
//!   |           deadline passes (seen at the next poll or command)
//!   |                v
//!   +---- idle, next phase (focus <-> break)
//! reset: any mode -> idle, full duration of the current phase
//! ```
//!
//! Every command follows the same shape: load config and state, settle a
//! completion that is already due, apply the command, then persist state and
//! stats in a single write. Block rules are recomputed only after that write
//! succeeded and only when the mode or phase changed. A failed write leaves
//! the previously persisted state untouched.

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use crate::blocking::{is_blocking_active, BlockRuleManager, RequestBlocker, RuleSet};
use crate::config::FocusConfig;
use crate::error::Result;
use crate::notify::{Notification, Notifier};
use crate::session::{Completion, SessionState, SessionType, TimerMode, TimerSnapshot};
use crate::store::{FocusStore, KvStore};

/// Source of wall-clock time
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Calendar day of an instant in the user's local time zone
pub fn local_day(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

/// Result of a controller command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub snapshot: TimerSnapshot,
    /// Set when this call observed a session running out
    pub completion: Option<Completion>,
}

/// Owns the session state machine
pub struct TimerController<S, B, C = SystemClock> {
    store: FocusStore<S>,
    rules: BlockRuleManager<B>,
    clock: C,
    notifier: Option<Box<dyn Notifier>>,
}

impl<S: KvStore, B: RequestBlocker> TimerController<S, B, SystemClock> {
    pub fn new(kv: S, blocker: B) -> Self {
        Self::with_clock(kv, blocker, SystemClock)
    }
}

impl<S: KvStore, B: RequestBlocker, C: Clock> TimerController<S, B, C> {
    pub fn with_clock(kv: S, blocker: B, clock: C) -> Self {
        Self {
            store: FocusStore::new(kv),
            rules: BlockRuleManager::new(blocker),
            clock,
            notifier: None,
        }
    }

    /// Announce completions through `notifier` when notifications are enabled
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    pub fn store(&self) -> &FocusStore<S> {
        &self.store
    }

    pub fn rules(&self) -> &BlockRuleManager<B> {
        &self.rules
    }

    /// Start or resume the countdown. No-op while already running.
    pub fn start(&mut self) -> Result<Outcome> {
        self.transition("start", |state, config, now| match state.mode {
            TimerMode::Running => {}
            TimerMode::Idle => {
                *state = SessionState::idle(state.session_type, config);
                begin(state, now);
            }
            TimerMode::Paused => {
                if state.remaining_seconds == 0 {
                    state.remaining_seconds = config.duration_seconds(state.session_type);
                    state.session_minutes = config.duration_minutes(state.session_type);
                }
                begin(state, now);
            }
        })
    }

    /// Freeze the countdown. No-op unless running.
    pub fn pause(&mut self) -> Result<Outcome> {
        self.transition("pause", |state, _, now| {
            if state.is_running() {
                state.remaining_seconds = state.remaining_at(now);
                state.end_timestamp = None;
                state.mode = TimerMode::Paused;
            }
        })
    }

    /// Back to idle with the full duration of the current phase. Never credits.
    pub fn reset(&mut self) -> Result<Outcome> {
        self.transition("reset", |state, config, _| {
            *state = SessionState::idle(state.session_type, config);
        })
    }

    /// Recompute remaining time, completing the session if its deadline passed
    pub fn poll(&mut self) -> Result<Outcome> {
        self.transition("poll", |_, _, _| {})
    }

    /// Recompute and install block rules for the current state and config
    pub fn update_block_rules(&mut self) -> Result<RuleSet> {
        self.poll()?;
        let config = self.store.load_config()?;
        let state = self.store.load_state(&config)?;

        let rule_set = BlockRuleManager::<B>::recompute(&state, &config);
        if let Err(e) = self.rules.apply(&rule_set) {
            error!("Failed to update block rules: {}", e);
            return Err(e);
        }
        Ok(rule_set)
    }

    /// Wipe every daily stats entry
    pub fn clear_stats(&mut self) -> Result<()> {
        self.store.clear_stats()?;
        Ok(())
    }

    fn transition<F>(&mut self, command: &'static str, apply: F) -> Result<Outcome>
    where
        F: FnOnce(&mut SessionState, &FocusConfig, DateTime<Utc>),
    {
        let config = self.store.load_config()?;
        let now = self.clock.now();
        let before = self.store.load_state(&config)?;
        let mut state = before.clone();

        let mut stats = None;
        let due_at = state.end_timestamp.filter(|_| state.is_due(now));
        let completion = match due_at {
            Some(ended_at) => {
                let completion = complete(&mut state, &config, ended_at);
                if completion.session_type == SessionType::Focus {
                    let mut ledger = self.store.load_stats()?;
                    ledger.record_focus(completion.day, completion.credited_minutes);
                    stats = Some(ledger);
                }
                Some(completion)
            }
            None => None,
        };

        apply(&mut state, &config, now);

        if state != before || stats.is_some() {
            self.store.commit(&state, stats.as_ref())?;
            debug!(
                "{}: {} {} -> {} {}",
                command,
                before.session_type.as_str(),
                before.mode.as_str(),
                state.session_type.as_str(),
                state.mode.as_str()
            );
        }

        if state.mode != before.mode || state.session_type != before.session_type {
            self.refresh_rules(&state, &config);
        }

        if let Some(completion) = &completion {
            info!(
                "{} session completed on {} ({} minutes credited)",
                completion.session_type.as_str(),
                completion.day,
                completion.credited_minutes
            );
            self.announce(completion, &config);
        }

        Ok(Outcome {
            snapshot: TimerSnapshot {
                remaining_seconds: state.remaining_at(now),
                blocking_active: is_blocking_active(&state, &config),
                state,
                taken_at: now,
            },
            completion,
        })
    }

    /// Rule failures never undo a timer transition
    fn refresh_rules(&mut self, state: &SessionState, config: &FocusConfig) {
        let rule_set = BlockRuleManager::<B>::recompute(state, config);
        if let Err(e) = self.rules.apply(&rule_set) {
            error!("Failed to apply block rules, timer continues unblocked: {}", e);
        }
    }

    fn announce(&self, completion: &Completion, config: &FocusConfig) {
        if !config.notifications_enabled {
            return;
        }
        let Some(notifier) = &self.notifier else {
            return;
        };
        let next = config.duration_minutes(completion.session_type.next());
        if let Err(e) = notifier.notify(&Notification::for_completion(completion, next)) {
            warn!("Failed to send notification: {}", e);
        }
    }
}

/// Start the countdown from the current remaining time
fn begin(state: &mut SessionState, now: DateTime<Utc>) {
    state.mode = TimerMode::Running;
    state.end_timestamp = Some(now + Duration::seconds(state.remaining_seconds as i64));
}

/// Move a finished session to the idle next phase
fn complete(state: &mut SessionState, config: &FocusConfig, ended_at: DateTime<Utc>) -> Completion {
    let finished = state.session_type;
    let credited_minutes = match finished {
        SessionType::Focus if state.session_minutes > 0 => state.session_minutes,
        SessionType::Focus => config.focus_duration,
        SessionType::Break => 0,
    };

    *state = SessionState::idle(finished.next(), config);

    Completion {
        session_type: finished,
        credited_minutes,
        day: local_day(ended_at),
        ended_at,
    }
}
