//! In-memory doubles shared by the unit tests

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::blocking::{BlockRule, RequestBlocker};
use crate::error::{FocusError, Result, StorageError};
use crate::notify::{Notification, Notifier};
use crate::store::{Entries, KvStore, Partition};
use crate::timer::Clock;

#[derive(Default)]
struct MemoryInner {
    local: Entries,
    synced: Entries,
    fail_writes: bool,
}

impl MemoryInner {
    fn partition(&mut self, partition: Partition) -> &mut Entries {
        match partition {
            Partition::Local => &mut self.local,
            Partition::Synced => &mut self.synced,
        }
    }
}

/// Key-value store kept in memory; clones share the same data
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail until switched back off
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_writes = fail;
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, partition: Partition, keys: &[&str]) -> Result<Entries, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let entries = inner.partition(partition);
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    fn set(&self, partition: Partition, entries: Entries) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(StorageError::Unavailable("disk full".to_string()));
        }
        inner.partition(partition).extend(entries);
        Ok(())
    }

    fn remove(&self, partition: Partition, keys: &[&str]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(StorageError::Unavailable("disk full".to_string()));
        }
        let entries = inner.partition(partition);
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// Clock that only moves when told to
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(at)),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        *self.now.lock().unwrap() += Duration::seconds(secs);
    }

    pub fn advance_millis(&self, millis: i64) {
        *self.now.lock().unwrap() += Duration::milliseconds(millis);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
struct BlockerInner {
    rules: HashMap<u32, BlockRule>,
    updates: usize,
    fail: bool,
}

/// Request blocker that just remembers what it was told
#[derive(Clone, Default)]
pub struct RecordingBlocker {
    inner: Arc<Mutex<BlockerInner>>,
}

impl RecordingBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installed domains ordered by rule id
    pub fn installed_domains(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut rules: Vec<&BlockRule> = inner.rules.values().collect();
        rules.sort_by_key(|rule| rule.id);
        rules.into_iter().map(|rule| rule.domain.clone()).collect()
    }

    /// Number of `update_rules` calls so far, failed ones included
    pub fn update_count(&self) -> usize {
        self.inner.lock().unwrap().updates
    }

    pub fn fail_installs(&self, fail: bool) {
        self.inner.lock().unwrap().fail = fail;
    }
}

impl RequestBlocker for RecordingBlocker {
    fn installed_rule_ids(&self) -> Result<Vec<u32>> {
        let mut ids: Vec<u32> = self.inner.lock().unwrap().rules.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn update_rules(&mut self, remove_rule_ids: &[u32], add_rules: &[BlockRule]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.updates += 1;
        if inner.fail {
            return Err(FocusError::RuleInstallation("blocker refused the update".to_string()));
        }
        for id in remove_rule_ids {
            inner.rules.remove(id);
        }
        for rule in add_rules {
            inner.rules.insert(rule.id, rule.clone());
        }
        Ok(())
    }
}

/// Notifier that keeps every notification it is handed
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
