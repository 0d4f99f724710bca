//! Focus statistics
//!
//! `DailyStats` is the persisted per-day ledger. The free functions are the
//! aggregations reporting surfaces use; they only read.
//! - Weekly minutes (reference day plus the six before it)
//! - Current streak of days with at least one completed focus session
//! - The seven-day series behind the weekly chart, and recent history

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How far back a streak is followed
pub const MAX_STREAK_LOOKBACK: u32 = 365;

/// Totals for one calendar day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayStats {
    /// Credited focus minutes
    #[serde(default)]
    pub minutes: u32,
    /// Completed focus sessions
    #[serde(default)]
    pub sessions: u32,
}

/// Calendar day -> totals, keyed by local date
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyStats(BTreeMap<NaiveDate, DayStats>);

impl DailyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit one completed focus session to a day
    pub fn record_focus(&mut self, day: NaiveDate, minutes: u32) {
        let entry = self.0.entry(day).or_default();
        entry.minutes = entry.minutes.saturating_add(minutes);
        entry.sessions = entry.sessions.saturating_add(1);
    }

    pub fn get(&self, day: NaiveDate) -> Option<&DayStats> {
        self.0.get(&day)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Entries oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&NaiveDate, &DayStats)> {
        self.0.iter()
    }
}

impl FromIterator<(NaiveDate, DayStats)> for DailyStats {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, DayStats)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Totals for a day, zero when nothing was recorded
pub fn day(stats: &DailyStats, date: NaiveDate) -> DayStats {
    stats.get(date).copied().unwrap_or_default()
}

/// The calendar day `n` days before `date`
fn days_before(date: NaiveDate, n: u32) -> Option<NaiveDate> {
    date.checked_sub_days(Days::new(n as u64))
}

/// Minutes over `reference` and the six calendar days before it
pub fn weekly_minutes(stats: &DailyStats, reference: NaiveDate) -> u32 {
    (0..7)
        .filter_map(|i| days_before(reference, i))
        .map(|date| day(stats, date).minutes)
        .fold(0u32, |acc, m| acc.saturating_add(m))
}

/// Consecutive days ending at `reference` with at least one session
pub fn current_streak(stats: &DailyStats, reference: NaiveDate) -> u32 {
    let mut streak = 0;
    for i in 0..MAX_STREAK_LOOKBACK {
        let Some(date) = days_before(reference, i) else {
            break;
        };
        if day(stats, date).sessions == 0 {
            break;
        }
        streak += 1;
    }
    streak
}

/// The seven days ending at `reference`, oldest first, with their minutes
pub fn week_series(stats: &DailyStats, reference: NaiveDate) -> Vec<(NaiveDate, u32)> {
    (0..7)
        .rev()
        .filter_map(|i| days_before(reference, i))
        .map(|date| (date, day(stats, date).minutes))
        .collect()
}

/// Recorded days newest first, at most `limit` of them
pub fn recent_history(stats: &DailyStats, limit: usize) -> Vec<(NaiveDate, DayStats)> {
    stats
        .iter()
        .rev()
        .take(limit)
        .map(|(date, totals)| (*date, *totals))
        .collect()
}

/// Headline numbers for a reporting surface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FocusStats {
    /// Today's totals
    pub today: DayStats,
    /// Minutes over the last seven days
    pub week_minutes: u32,
    /// Current streak in days
    pub streak: u32,
    /// All-time focus minutes
    pub total_minutes: u32,
    /// All-time completed sessions
    pub total_sessions: u32,
}

impl FocusStats {
    /// Summarize the ledger as of `today`
    pub fn from_daily(stats: &DailyStats, today: NaiveDate) -> Self {
        let (total_minutes, total_sessions) = stats.iter().fold((0u32, 0u32), |(m, s), (_, d)| {
            (m.saturating_add(d.minutes), s.saturating_add(d.sessions))
        });

        Self {
            today: day(stats, today),
            week_minutes: weekly_minutes(stats, today),
            streak: current_streak(stats, today),
            total_minutes,
            total_sessions,
        }
    }

    /// Average minutes per completed session
    pub fn average_session(&self) -> u32 {
        if self.total_sessions == 0 {
            0
        } else {
            self.total_minutes / self.total_sessions
        }
    }
}
