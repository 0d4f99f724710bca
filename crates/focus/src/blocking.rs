//! Distraction blocking
//!
//! Blocking is a pure function of the timer state and the config: rules are
//! installed while a focus session runs with `blockDuringFocus` on, and
//! removed otherwise. The manager never edits rules in place; every apply
//! swaps out whatever is installed for the freshly computed set.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{is_valid_domain, normalize_domain, FocusConfig};
use crate::error::Result;
use crate::session::{SessionState, SessionType, TimerMode};

/// Priority given to every block rule
pub const RULE_PRIORITY: u32 = 1;

/// What a rule does with a matching request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Block,
}

/// Kind of request a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Top-level page navigation
    MainFrame,
    SubFrame,
    Script,
    Image,
    Other,
}

/// One declarative block rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    /// Bare domain; subdomains match too
    pub domain: String,
    pub resource_types: Vec<ResourceType>,
}

impl BlockRule {
    /// Block full-page navigations to a domain and its subdomains
    pub fn for_domain(id: u32, domain: impl Into<String>) -> Self {
        Self {
            id,
            priority: RULE_PRIORITY,
            action: RuleAction::Block,
            domain: domain.into(),
            resource_types: vec![ResourceType::MainFrame],
        }
    }

    /// Whether a request for `host` of the given type is caught by this rule
    pub fn matches(&self, host: &str, resource_type: ResourceType) -> bool {
        if !self.resource_types.contains(&resource_type) {
            return false;
        }
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        host == self.domain
            || host
                .strip_suffix(&self.domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

/// Result of a recompute: the activation decision and the rules it implies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub active: bool,
    /// Empty whenever `active` is false
    pub rules: Vec<BlockRule>,
}

impl RuleSet {
    /// Whether navigating to `host` would be blocked
    pub fn blocks(&self, host: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.matches(host, ResourceType::MainFrame))
    }
}

/// Running, in focus, and blocking enabled
pub fn is_blocking_active(state: &SessionState, config: &FocusConfig) -> bool {
    state.mode == TimerMode::Running
        && state.session_type == SessionType::Focus
        && config.block_during_focus
}

/// The network-level mechanism that enforces rules
pub trait RequestBlocker: Send {
    /// Ids of every rule currently installed
    fn installed_rule_ids(&self) -> Result<Vec<u32>>;

    /// Remove rules by id and install new ones as a single update
    fn update_rules(&mut self, remove_rule_ids: &[u32], add_rules: &[BlockRule]) -> Result<()>;
}

/// Couples the timer state to the installed block rules
pub struct BlockRuleManager<B> {
    blocker: B,
}

impl<B: RequestBlocker> BlockRuleManager<B> {
    pub fn new(blocker: B) -> Self {
        Self { blocker }
    }

    pub fn blocker(&self) -> &B {
        &self.blocker
    }

    /// Derive the rule set for a timer state and config
    pub fn recompute(state: &SessionState, config: &FocusConfig) -> RuleSet {
        if !is_blocking_active(state, config) {
            return RuleSet::default();
        }

        let mut domains: Vec<String> = Vec::new();
        for entry in &config.block_list {
            match normalize_domain(entry) {
                Some(domain) if !is_valid_domain(&domain) => {
                    warn!("Skipping malformed block list entry {:?}", entry)
                }
                Some(domain) if !domains.contains(&domain) => domains.push(domain),
                Some(_) => {}
                None => debug!("Skipping empty block list entry {:?}", entry),
            }
        }

        RuleSet {
            active: true,
            rules: domains
                .into_iter()
                .enumerate()
                .map(|(i, domain)| BlockRule::for_domain(i as u32 + 1, domain))
                .collect(),
        }
    }

    /// Replace every installed rule with `rule_set`
    pub fn apply(&mut self, rule_set: &RuleSet) -> Result<()> {
        let stale = self.blocker.installed_rule_ids()?;
        self.blocker.update_rules(&stale, &rule_set.rules)?;

        info!(
            "Block rules applied: active={}, removed={}, installed={}",
            rule_set.active,
            stale.len(),
            rule_set.rules.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FocusError;
    use crate::testing::RecordingBlocker;
    use chrono::{TimeZone, Utc};

    fn config(block: bool, domains: &[&str]) -> FocusConfig {
        let mut config = FocusConfig::default();
        config.block_during_focus = block;
        config.block_list = domains.iter().map(|d| d.to_string()).collect();
        config
    }

    fn state(mode: TimerMode, session_type: SessionType) -> SessionState {
        let mut state = SessionState::idle(session_type, &FocusConfig::default());
        state.mode = mode;
        if mode == TimerMode::Running {
            state.end_timestamp = Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        }
        state
    }

    #[test]
    fn test_activation_truth_table() {
        let on = config(true, &["example.com"]);
        let off = config(false, &["example.com"]);

        assert!(is_blocking_active(&state(TimerMode::Running, SessionType::Focus), &on));

        // Any one condition false turns it off
        assert!(!is_blocking_active(&state(TimerMode::Paused, SessionType::Focus), &on));
        assert!(!is_blocking_active(&state(TimerMode::Idle, SessionType::Focus), &on));
        assert!(!is_blocking_active(&state(TimerMode::Running, SessionType::Break), &on));
        assert!(!is_blocking_active(&state(TimerMode::Running, SessionType::Focus), &off));
    }

    #[test]
    fn test_recompute_one_rule_per_domain() {
        let cfg = config(true, &["example.com", "https://www.example.com/x", "news.site.org"]);
        let set = BlockRuleManager::<RecordingBlocker>::recompute(
            &state(TimerMode::Running, SessionType::Focus),
            &cfg,
        );

        assert!(set.active);
        assert_eq!(set.rules.len(), 2);
        assert_eq!(set.rules[0], BlockRule::for_domain(1, "example.com"));
        assert_eq!(set.rules[1].id, 2);
        assert_eq!(set.rules[1].resource_types, vec![ResourceType::MainFrame]);
    }

    #[test]
    fn test_recompute_skips_malformed_entries() {
        let blocker = RecordingBlocker::new();
        let mut manager = BlockRuleManager::new(blocker.clone());

        // Written before entries were validated on save
        let cfg = config(true, &["a.com", "my_site.com", "b.com"]);
        let set = BlockRuleManager::<RecordingBlocker>::recompute(
            &state(TimerMode::Running, SessionType::Focus),
            &cfg,
        );
        assert_eq!(set.rules.len(), 2);
        assert_eq!(set.rules[1], BlockRule::for_domain(2, "b.com"));

        manager.apply(&set).unwrap();
        assert_eq!(blocker.installed_domains(), vec!["a.com", "b.com"]);
    }

    #[test]
    fn test_recompute_inactive_has_no_rules() {
        let cfg = config(true, &["example.com"]);
        let set = BlockRuleManager::<RecordingBlocker>::recompute(
            &state(TimerMode::Paused, SessionType::Focus),
            &cfg,
        );
        assert!(!set.active);
        assert!(set.rules.is_empty());
    }

    #[test]
    fn test_rule_matching() {
        let rule = BlockRule::for_domain(1, "example.com");
        assert!(rule.matches("example.com", ResourceType::MainFrame));
        assert!(rule.matches("www.example.com", ResourceType::MainFrame));
        assert!(rule.matches("a.b.Example.com.", ResourceType::MainFrame));
        assert!(!rule.matches("notexample.com", ResourceType::MainFrame));
        assert!(!rule.matches("example.com.evil.net", ResourceType::MainFrame));
        // Sub-resources are left alone
        assert!(!rule.matches("example.com", ResourceType::Image));
    }

    #[test]
    fn test_apply_replaces_stale_rules() {
        let blocker = RecordingBlocker::new();
        let mut manager = BlockRuleManager::new(blocker.clone());
        let running = state(TimerMode::Running, SessionType::Focus);

        let wide = BlockRuleManager::<RecordingBlocker>::recompute(
            &running,
            &config(true, &["a.com", "b.com", "c.com"]),
        );
        manager.apply(&wide).unwrap();
        assert_eq!(blocker.installed_domains(), vec!["a.com", "b.com", "c.com"]);

        // Shrinking the list must not leave c.com behind
        let narrow = BlockRuleManager::<RecordingBlocker>::recompute(
            &running,
            &config(true, &["b.com"]),
        );
        manager.apply(&narrow).unwrap();
        assert_eq!(blocker.installed_domains(), vec!["b.com"]);

        // Applying the same set again is a no-op in effect
        manager.apply(&narrow).unwrap();
        assert_eq!(blocker.installed_domains(), vec!["b.com"]);

        manager.apply(&RuleSet::default()).unwrap();
        assert!(blocker.installed_domains().is_empty());
    }

    #[test]
    fn test_apply_surfaces_installation_error() {
        let blocker = RecordingBlocker::new();
        blocker.fail_installs(true);
        let mut manager = BlockRuleManager::new(blocker.clone());

        let set = BlockRuleManager::<RecordingBlocker>::recompute(
            &state(TimerMode::Running, SessionType::Focus),
            &config(true, &["a.com"]),
        );
        let err = manager.apply(&set).unwrap_err();
        assert!(matches!(err, FocusError::RuleInstallation(_)));
    }

    #[test]
    fn test_rule_set_blocks() {
        let set = RuleSet {
            active: true,
            rules: vec![BlockRule::for_domain(1, "reddit.com")],
        };
        assert!(set.blocks("old.reddit.com"));
        assert!(!set.blocks("example.com"));
        assert!(!RuleSet::default().blocks("reddit.com"));
    }
}
