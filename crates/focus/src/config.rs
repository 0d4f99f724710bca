//! Focus configuration
//!
//! Durations, the block list and the toggles a user picks on the settings
//! surface. Stored in the synced partition under the same keys the settings
//! surface writes, so every reader agrees on one set of defaults.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::RangeInclusive;
use std::sync::OnceLock;
use tracing::warn;

use crate::error::{FocusError, Result};
use crate::session::SessionType;

pub const DEFAULT_FOCUS_MINUTES: u32 = 25;
pub const DEFAULT_BREAK_MINUTES: u32 = 5;

/// Accepted focus durations in minutes
pub const FOCUS_RANGE: RangeInclusive<u32> = 1..=120;
/// Accepted break durations in minutes
pub const BREAK_RANGE: RangeInclusive<u32> = 1..=60;

/// Sites blocked out of the box
pub const DEFAULT_BLOCK_LIST: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "instagram.com",
    "reddit.com",
    "youtube.com",
    "tiktok.com",
];

/// Storage keys owned by the config, all in the synced partition
pub const CONFIG_KEYS: &[&str] = &[
    "focusDuration",
    "breakDuration",
    "blockDuringFocus",
    "blockList",
    "notificationsEnabled",
];

fn default_focus_duration() -> u32 {
    DEFAULT_FOCUS_MINUTES
}

fn default_break_duration() -> u32 {
    DEFAULT_BREAK_MINUTES
}

fn default_true() -> bool {
    true
}

fn default_block_list() -> Vec<String> {
    DEFAULT_BLOCK_LIST.iter().map(|d| d.to_string()).collect()
}

/// User configuration for focus sessions and blocking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusConfig {
    /// Focus session length in minutes
    #[serde(rename = "focusDuration", default = "default_focus_duration")]
    pub focus_duration: u32,

    /// Break length in minutes
    #[serde(rename = "breakDuration", default = "default_break_duration")]
    pub break_duration: u32,

    /// Block listed sites while a focus session runs
    #[serde(rename = "blockDuringFocus", default = "default_true")]
    pub block_during_focus: bool,

    /// Bare domains, already normalized
    #[serde(rename = "blockList", default = "default_block_list")]
    pub block_list: Vec<String>,

    /// Announce completed sessions on the desktop
    #[serde(rename = "notificationsEnabled", default = "default_true")]
    pub notifications_enabled: bool,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            focus_duration: DEFAULT_FOCUS_MINUTES,
            break_duration: DEFAULT_BREAK_MINUTES,
            block_during_focus: true,
            block_list: default_block_list(),
            notifications_enabled: true,
        }
    }
}

impl FocusConfig {
    /// Build a config from stored entries, defaulting whatever is absent
    pub fn from_entries(entries: Map<String, Value>) -> Self {
        let config = match serde_json::from_value::<FocusConfig>(Value::Object(entries)) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring unreadable focus config, using defaults: {}", e);
                FocusConfig::default()
            }
        };
        config.within_bounds()
    }

    /// Entries to persist into the synced partition
    pub fn to_entries(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Configured length of a session type, in minutes
    pub fn duration_minutes(&self, session_type: SessionType) -> u32 {
        match session_type {
            SessionType::Focus => self.focus_duration,
            SessionType::Break => self.break_duration,
        }
    }

    /// Configured length of a session type, in seconds
    pub fn duration_seconds(&self, session_type: SessionType) -> u32 {
        self.duration_minutes(session_type) * 60
    }

    /// Reject durations outside the accepted ranges
    pub fn validate(&self) -> Result<()> {
        if !FOCUS_RANGE.contains(&self.focus_duration) {
            return Err(FocusError::InvalidConfig(format!(
                "Focus duration must be between {} and {} minutes",
                FOCUS_RANGE.start(),
                FOCUS_RANGE.end()
            )));
        }
        if !BREAK_RANGE.contains(&self.break_duration) {
            return Err(FocusError::InvalidConfig(format!(
                "Break duration must be between {} and {} minutes",
                BREAK_RANGE.start(),
                BREAK_RANGE.end()
            )));
        }
        if let Some(bad) = self.block_list.iter().find(|d| !is_valid_domain(d)) {
            return Err(FocusError::InvalidConfig(format!(
                "Block list entry '{}' is not a valid domain",
                bad
            )));
        }
        Ok(())
    }

    /// Replace the block list, normalizing and de-duplicating entries.
    ///
    /// Malformed hosts are kept as typed; [`validate`](Self::validate) rejects them.
    pub fn set_block_list<I, S>(&mut self, domains: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.block_list.clear();
        for domain in domains {
            if let Some(domain) = normalize_domain(domain.as_ref()) {
                if !self.block_list.contains(&domain) {
                    self.block_list.push(domain);
                }
            }
        }
    }

    /// Add a domain; returns the normalized form if it was new
    pub fn add_domain(&mut self, input: &str) -> Result<Option<String>> {
        let Some(domain) = normalize_domain(input) else {
            return Err(FocusError::InvalidConfig(format!("'{}' is not a domain", input.trim())));
        };
        if !is_valid_domain(&domain) {
            return Err(FocusError::InvalidConfig(format!("'{}' is not a valid domain", domain)));
        }
        if self.block_list.contains(&domain) {
            return Ok(None);
        }
        self.block_list.push(domain.clone());
        Ok(Some(domain))
    }

    /// Remove a domain by any spelling that normalizes to it
    pub fn remove_domain(&mut self, input: &str) -> bool {
        let Some(domain) = normalize_domain(input) else {
            return false;
        };
        let before = self.block_list.len();
        self.block_list.retain(|d| *d != domain);
        self.block_list.len() != before
    }

    /// Forget every user choice
    pub fn reset_to_defaults(&mut self) {
        *self = Self::default();
    }

    /// Out-of-range stored durations fall back to the defaults
    fn within_bounds(mut self) -> Self {
        if !FOCUS_RANGE.contains(&self.focus_duration) {
            warn!(
                "Stored focus duration {} out of range, using {}",
                self.focus_duration, DEFAULT_FOCUS_MINUTES
            );
            self.focus_duration = DEFAULT_FOCUS_MINUTES;
        }
        if !BREAK_RANGE.contains(&self.break_duration) {
            warn!(
                "Stored break duration {} out of range, using {}",
                self.break_duration, DEFAULT_BREAK_MINUTES
            );
            self.break_duration = DEFAULT_BREAK_MINUTES;
        }
        self
    }
}

fn scheme_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").expect("scheme pattern compiles"))
}

fn domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([a-z0-9]([a-z0-9-]*[a-z0-9])?\.)*[a-z0-9]([a-z0-9-]*[a-z0-9])?$")
            .expect("domain pattern compiles")
    })
}

/// Reduce user input to a bare domain: no scheme, `www.`, port or path.
///
/// Returns `None` when nothing is left. The result is not guaranteed to be a
/// well-formed host name; see [`is_valid_domain`].
pub fn normalize_domain(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let without_scheme = scheme_regex().replace(trimmed, "");
    let host = without_scheme
        .split(|c: char| matches!(c, '/' | '?' | '#'))
        .next()
        .unwrap_or("");

    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(host.as_str());

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Whether a normalized domain is a well-formed host name
pub fn is_valid_domain(domain: &str) -> bool {
    domain.len() <= 253 && domain_regex().is_match(domain)
}
