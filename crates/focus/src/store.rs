//! Focus storage
//!
//! A small key-value store split into two partitions:
//! - local: timer state and the daily stats ledger (high-frequency writes)
//! - synced: user configuration (low-frequency writes)
//!
//! `FileKvStore` keeps each partition as one JSON document:
//! - ~/.local/share/focusmaster/focus/local.json
//! - ~/.local/share/focusmaster/focus/synced.json
//!
//! Every `set`/`remove` rewrites its partition through a temp file and a
//! rename, so a write either lands completely or not at all.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{FocusConfig, CONFIG_KEYS};
use crate::error::{Result, StorageError};
use crate::session::SessionState;
use crate::stats::DailyStats;

pub const TIMER_STATE_KEY: &str = "timerState";
pub const DAILY_STATS_KEY: &str = "dailyStats";

pub type Entries = Map<String, Value>;

/// Storage partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Local,
    Synced,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Local => "local",
            Partition::Synced => "synced",
        }
    }
}

/// Persisted key-value storage
pub trait KvStore: Send {
    /// Read the given keys; absent keys are simply missing from the result
    fn get(&self, partition: Partition, keys: &[&str]) -> Result<Entries, StorageError>;

    /// Write all entries in one step
    fn set(&self, partition: Partition, entries: Entries) -> Result<(), StorageError>;

    /// Delete the given keys
    fn remove(&self, partition: Partition, keys: &[&str]) -> Result<(), StorageError>;
}

/// JSON-file backed store, one document per partition
pub struct FileKvStore {
    /// Base directory for the partition files
    data_dir: PathBuf,
}

impl FileKvStore {
    /// Create a store rooted at the given directory
    pub fn new(data_dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(data_dir).map_err(|source| StorageError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
        })
    }

    /// Get the path of a partition document
    fn partition_path(&self, partition: Partition) -> PathBuf {
        self.data_dir.join(format!("{}.json", partition.as_str()))
    }

    fn read_partition(&self, partition: Partition) -> Result<Entries, StorageError> {
        let path = self.partition_path(partition);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        if content.trim().is_empty() {
            return Ok(Entries::new());
        }

        serde_json::from_str(&content).map_err(|source| StorageError::Corrupt {
            partition: partition.as_str(),
            source,
        })
    }

    fn write_partition(&self, partition: Partition, entries: &Entries) -> Result<(), StorageError> {
        let path = self.partition_path(partition);
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(entries).map_err(|source| StorageError::Encode {
            key: partition.as_str().to_string(),
            source,
        })?;

        fs::write(&tmp, content).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StorageError::Io { path, source })
    }
}

impl KvStore for FileKvStore {
    fn get(&self, partition: Partition, keys: &[&str]) -> Result<Entries, StorageError> {
        let mut all = self.read_partition(partition)?;
        Ok(keys
            .iter()
            .filter_map(|key| all.remove(*key).map(|value| (key.to_string(), value)))
            .collect())
    }

    fn set(&self, partition: Partition, entries: Entries) -> Result<(), StorageError> {
        let mut all = self.read_partition(partition)?;
        for (key, value) in entries {
            all.insert(key, value);
        }
        self.write_partition(partition, &all)
    }

    fn remove(&self, partition: Partition, keys: &[&str]) -> Result<(), StorageError> {
        let mut all = self.read_partition(partition)?;
        let before = all.len();
        for key in keys {
            all.remove(*key);
        }
        if all.len() == before {
            return Ok(());
        }
        self.write_partition(partition, &all)
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Value, StorageError> {
    serde_json::to_value(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })
}

fn decode<T: DeserializeOwned>(entries: &mut Entries, key: &str, partition: Partition) -> Result<Option<T>, StorageError> {
    match entries.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                partition: partition.as_str(),
                source,
            }),
    }
}

/// Typed access to the focus records on top of a [`KvStore`]
pub struct FocusStore<S> {
    kv: S,
}

impl<S: KvStore> FocusStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    /// Current configuration, defaults for anything never saved
    pub fn load_config(&self) -> Result<FocusConfig, StorageError> {
        let entries = self.kv.get(Partition::Synced, CONFIG_KEYS)?;
        Ok(FocusConfig::from_entries(entries))
    }

    /// Persist the configuration; callers validate first
    pub fn save_config(&self, config: &FocusConfig) -> Result<(), StorageError> {
        self.kv.set(Partition::Synced, config.to_entries())
    }

    /// Validate, normalize the block list and persist.
    ///
    /// Returns what was stored. Callers ask the timer owner to refresh block
    /// rules afterwards.
    pub fn save_settings(&self, config: &FocusConfig) -> Result<FocusConfig> {
        let mut normalized = config.clone();
        normalized.set_block_list(&config.block_list);
        normalized.validate()?;
        self.save_config(&normalized)?;
        Ok(normalized)
    }

    /// The timer record, or a fresh one if none was ever written
    pub fn load_state(&self, config: &FocusConfig) -> Result<SessionState, StorageError> {
        let mut entries = self.kv.get(Partition::Local, &[TIMER_STATE_KEY])?;
        let state: Option<SessionState> = decode(&mut entries, TIMER_STATE_KEY, Partition::Local)?;
        Ok(match state {
            Some(state) => state.repaired(),
            None => {
                debug!("No timer state yet, starting from defaults");
                SessionState::new(config)
            }
        })
    }

    /// The daily stats ledger; empty if none
    pub fn load_stats(&self) -> Result<DailyStats, StorageError> {
        let mut entries = self.kv.get(Partition::Local, &[DAILY_STATS_KEY])?;
        Ok(decode(&mut entries, DAILY_STATS_KEY, Partition::Local)?.unwrap_or_default())
    }

    /// Write the timer state, and the stats when given, as one update
    pub fn commit(&self, state: &SessionState, stats: Option<&DailyStats>) -> Result<(), StorageError> {
        let mut entries = Entries::new();
        entries.insert(TIMER_STATE_KEY.to_string(), encode(TIMER_STATE_KEY, state)?);
        if let Some(stats) = stats {
            entries.insert(DAILY_STATS_KEY.to_string(), encode(DAILY_STATS_KEY, stats)?);
        }
        self.kv.set(Partition::Local, entries)
    }

    /// Drop the whole stats ledger
    pub fn clear_stats(&self) -> Result<(), StorageError> {
        warn!("Clearing all daily focus stats");
        self.kv.remove(Partition::Local, &[DAILY_STATS_KEY])
    }
}
