//! focus - Pomodoro timer and distraction blocking for deep work
//!
//! "Protect the sacred space of deep work."
//!
//! A focus timer that alternates focus sessions and breaks, keeps a daily
//! ledger of focused minutes, and blocks distracting sites while a focus
//! session runs:
//! - `timer`: the session state machine, the only writer of timer state
//! - `stats`: weekly minutes, streaks and history from the daily ledger
//! - `blocking`: block rules derived from timer state and config
//! - `store`: partitioned key-value persistence
//! - `server`: the daemon that owns the timer and its command channel
//!
//! Commands:
//! - start: Start or resume the current session
//! - pause: Freeze the countdown
//! - reset: Back to a full, idle session
//! - status: Show the countdown
//! - stats: Show today, this week and the current streak

pub mod blocking;
pub mod config;
pub mod error;
pub mod hosts;
pub mod notify;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;
pub mod timer;

#[cfg(test)]
mod testing;

pub use blocking::{BlockRule, BlockRuleManager, RequestBlocker, RuleSet};
pub use config::FocusConfig;
pub use error::{FocusError, StorageError};
pub use session::{SessionState, SessionType, TimerMode, TimerSnapshot};
pub use stats::{DailyStats, FocusStats};
pub use store::{FileKvStore, FocusStore, KvStore};
pub use timer::TimerController;
