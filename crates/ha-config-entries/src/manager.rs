//! The set of config entries and its persistence
//!
//! Entries are kept in memory and written to `.storage/core.config_entries`
//! after every add, update and removal. Lifecycle states only change through
//! [`ConfigEntries::transition`]; running integration code is left to the
//! caller.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::entry::{ConfigEntry, ConfigEntryUpdate};
use crate::state_machine::{ConfigEntryState, InvalidTransition};
use crate::storage::{Storable, Storage, StorageError};

pub const STORAGE_KEY: &str = "core.config_entries";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("no config entry {0}")]
    NotFound(String),

    #[error("{domain} already has an entry with unique id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("cannot persist config entries: {0}")]
    Storage(#[from] StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

pub struct ConfigEntries {
    storage: Arc<Storage>,
    entries: DashMap<String, ConfigEntry>,
    /// Failed setup attempts since the entry last left the retry loop
    retries: DashMap<String, u32>,
    /// Held while writing so saves never interleave
    writing: Mutex<()>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            retries: DashMap::new(),
            writing: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> ConfigEntriesResult<()> {
        let Some(stored) = self.storage.load::<ConfigEntriesData>().await? else {
            return Ok(());
        };
        info!("Loaded {} config entries", stored.entries.len());
        for entry in stored.entries {
            self.entries.insert(entry.entry_id.clone(), entry);
        }
        Ok(())
    }

    pub async fn save(&self) -> ConfigEntriesResult<()> {
        let _writing = self.writing.lock().await;
        let entries = self.sorted();
        let count = entries.len();
        self.storage.save(&ConfigEntriesData { entries }).await?;
        debug!("Saved {} config entries", count);
        Ok(())
    }

    /// Every entry, oldest first
    fn sorted(&self) -> Vec<ConfigEntry> {
        let mut entries: Vec<ConfigEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|entry| entry.created_at);
        entries
    }

    fn find(&self, matches: impl Fn(&ConfigEntry) -> bool) -> Option<ConfigEntry> {
        self.entries
            .iter()
            .find(|entry| matches(entry.value()))
            .map(|entry| entry.value().clone())
    }

    fn check_unique_id(&self, entry_id: &str, domain: &str, unique_id: &str) -> ConfigEntriesResult<()> {
        match self.get_by_unique_id(domain, unique_id) {
            Some(other) if other.entry_id != entry_id => Err(ConfigEntriesError::AlreadyExists {
                domain: domain.to_string(),
                unique_id: unique_id.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|entry| entry.value().clone())
    }

    /// Oldest first
    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.sorted()
            .into_iter()
            .filter(|entry| entry.domain == domain)
            .collect()
    }

    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        self.find(|entry| entry.domain == domain && entry.unique_id.as_deref() == Some(unique_id))
    }

    /// Store a new entry
    ///
    /// Refused with [`ConfigEntriesError::AlreadyExists`] when its unique id
    /// is taken in the domain.
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(unique_id) = &entry.unique_id {
            self.check_unique_id(&entry.entry_id, &entry.domain, unique_id)?;
        }
        self.entries.insert(entry.entry_id.clone(), entry.clone());
        self.save().await?;

        info!("Added {} entry '{}' ({})", entry.domain, entry.title, entry.entry_id);
        Ok(entry)
    }

    /// Runtime state is kept
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let domain = self
            .get(entry_id)
            .map(|entry| entry.domain)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        if let Some(unique_id) = update.new_unique_id() {
            self.check_unique_id(entry_id, &domain, unique_id)?;
        }

        let updated = {
            let mut entry = self
                .entries
                .get_mut(entry_id)
                .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
            update.apply(&mut entry);
            entry.clone()
        };
        self.save().await?;

        debug!("Updated entry {}", entry_id);
        Ok(updated)
    }

    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let (_, entry) = self
            .entries
            .remove(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        self.retries.remove(entry_id);
        self.save().await?;

        info!("Removed {} entry '{}'", entry.domain, entry.title);
        Ok(entry)
    }

    /// Move an entry through its lifecycle
    ///
    /// Leaving the setup loop for any state but `SetupInProgress` or
    /// `SetupRetry` clears the retry count.
    pub fn transition(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        let from = entry.state;
        entry.set_state(state, reason)?;
        debug!("Entry {}: {:?} -> {:?}", entry_id, from, state);

        if !matches!(state, ConfigEntryState::SetupInProgress | ConfigEntryState::SetupRetry) {
            self.retries.remove(entry_id);
        }
        Ok(entry.clone())
    }

    /// Count a failed setup, returning how many failed before it
    pub fn record_retry(&self, entry_id: &str) -> ConfigEntriesResult<u32> {
        if !self.entries.contains_key(entry_id) {
            return Err(ConfigEntriesError::NotFound(entry_id.to_string()));
        }
        let mut tries = self.retries.entry(entry_id.to_string()).or_insert(0);
        let previous = *tries;
        *tries += 1;
        Ok(previous)
    }

    pub fn retries(&self, entry_id: &str) -> u32 {
        self.retries.get(entry_id).map(|tries| *tries).unwrap_or(0)
    }

    /// Oldest first
    pub fn entry_ids(&self) -> Vec<String> {
        self.sorted().into_iter().map(|entry| entry.entry_id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
