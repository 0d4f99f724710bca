//! Hosts-file request blocker
//!
//! Enforces block rules by owning a marked section of a hosts file. Each rule
//! becomes one line that sinks the domain and its `www.` form:
//!
//! ```text
//! # >>> focusmaster block rules >>>
//! 0.0.0.0 example.com www.example.com # rule:1
//! # <<< focusmaster block rules <<<
//! ```
//!
//! Everything outside the markers is left untouched. A hosts file cannot
//! express wildcards, so only the bare domain and `www.` are covered.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::blocking::{BlockRule, RequestBlocker, ResourceType};
use crate::config::is_valid_domain;
use crate::error::{FocusError, Result};

/// Default location of the system hosts file
pub const DEFAULT_HOSTS_FILE: &str = "/etc/hosts";

/// Environment variable pointing the blocker at another hosts file
pub const HOSTS_FILE_ENV: &str = "FOCUSMASTER_HOSTS_FILE";

const SECTION_START: &str = "# >>> focusmaster block rules >>>";
const SECTION_END: &str = "# <<< focusmaster block rules <<<";
const SINK_ADDRESS: &str = "0.0.0.0";
const RULE_TAG: &str = "# rule:";

/// Blocks navigations by redirecting domains in a hosts file
pub struct HostsFileBlocker {
    path: PathBuf,
}

/// A hosts file split around the managed section
struct HostsFile {
    before: Vec<String>,
    rules: Vec<(u32, String)>,
    after: Vec<String>,
}

impl HostsFileBlocker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<HostsFile> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(FocusError::RuleInstallation(format!(
                    "cannot read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        Ok(HostsFile::parse(&content))
    }

    /// Replace the file through a sibling temp file and a rename
    fn write(&self, hosts: &HostsFile) -> Result<()> {
        let failed = |e: std::io::Error| {
            FocusError::RuleInstallation(format!("cannot write {}: {}", self.path.display(), e))
        };

        let tmp = self.path.with_extension("focusmaster.tmp");
        fs::write(&tmp, hosts.render()).map_err(failed)?;
        if let Ok(metadata) = fs::metadata(&self.path) {
            fs::set_permissions(&tmp, metadata.permissions()).map_err(failed)?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            failed(e)
        })
    }
}

impl HostsFile {
    fn parse(content: &str) -> Self {
        let mut before = Vec::new();
        let mut rules = Vec::new();
        let mut after = Vec::new();
        // Non-rule lines seen inside the section; kept if the section never closes
        let mut stray = Vec::new();
        let mut in_section = false;
        let mut seen_section = false;

        for line in content.lines() {
            if line.trim() == SECTION_START {
                in_section = true;
                seen_section = true;
                continue;
            }
            if line.trim() == SECTION_END {
                for dropped in stray.drain(..) {
                    debug!("Dropping unrecognised line in managed hosts section: {}", dropped);
                }
                in_section = false;
                continue;
            }

            if in_section {
                match parse_rule_id(line) {
                    Some(id) => rules.push((id, line.to_string())),
                    None => stray.push(line.to_string()),
                }
            } else if seen_section {
                after.push(line.to_string());
            } else {
                before.push(line.to_string());
            }
        }

        if in_section && !stray.is_empty() {
            warn!(
                "Managed hosts section has no end marker, keeping {} unmanaged lines",
                stray.len()
            );
            after.extend(stray);
        }

        Self { before, rules, after }
    }

    fn render(&self) -> String {
        let mut lines: Vec<&str> = self.before.iter().map(String::as_str).collect();
        if !self.rules.is_empty() {
            lines.push(SECTION_START);
            lines.extend(self.rules.iter().map(|(_, line)| line.as_str()));
            lines.push(SECTION_END);
        }
        lines.extend(self.after.iter().map(String::as_str));

        let mut out = lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

fn parse_rule_id(line: &str) -> Option<u32> {
    let (_, tail) = line.rsplit_once(RULE_TAG)?;
    tail.trim().parse().ok()
}

fn render_rule(rule: &BlockRule) -> String {
    format!(
        "{} {} www.{} {}{}",
        SINK_ADDRESS, rule.domain, rule.domain, RULE_TAG, rule.id
    )
}

impl RequestBlocker for HostsFileBlocker {
    fn installed_rule_ids(&self) -> Result<Vec<u32>> {
        Ok(self.read()?.rules.iter().map(|(id, _)| *id).collect())
    }

    fn update_rules(&mut self, remove_rule_ids: &[u32], add_rules: &[BlockRule]) -> Result<()> {
        // Reject the whole update before touching the file
        if let Some(bad) = add_rules.iter().find(|rule| !is_valid_domain(&rule.domain)) {
            return Err(FocusError::RuleInstallation(format!(
                "rule {} has malformed domain pattern '{}'",
                bad.id, bad.domain
            )));
        }

        let mut hosts = self.read()?;
        hosts.rules.retain(|(id, _)| !remove_rule_ids.contains(id));

        for rule in add_rules {
            if !rule.resource_types.contains(&ResourceType::MainFrame) {
                debug!("Rule {} does not cover navigations, skipping", rule.id);
                continue;
            }
            hosts.rules.retain(|(id, _)| *id != rule.id);
            hosts.rules.push((rule.id, render_rule(rule)));
        }

        self.write(&hosts)
    }
}
