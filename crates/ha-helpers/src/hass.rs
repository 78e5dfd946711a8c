//! The HomeAssistant handle
//!
//! One instance per running host. Integrations receive it in every
//! lifecycle call and reach the bus, the states and their config entries
//! through it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use ha_config::{ConfigResult, CoreConfig};
use ha_config_entries::{
    calculate_retry_delay, ConfigEntries, ConfigEntriesError, ConfigEntriesResult, ConfigEntry,
    ConfigEntryState, ConfigEntryUpdate, Storage,
};
use ha_event_bus::EventBus;
use ha_state_store::StateStore;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::{SharedClock, SystemClock};
use crate::entity_platform::EntityPlatform;
use crate::executor::{run_blocking, ExecutorError};
use crate::integration::Integration;
use crate::SetupError;

pub struct HomeAssistant {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateStore>,
    pub config_entries: Arc<ConfigEntries>,
    pub entities: Arc<EntityPlatform>,
    pub config: CoreConfig,
    time_zone: Tz,
    clock: SharedClock,
    integrations: DashMap<String, Arc<dyn Integration>>,
    /// Per-entry lock serializing setup and unload
    entry_locks: DashMap<String, Arc<Mutex<()>>>,
    retries: DashMap<String, JoinHandle<()>>,
}

impl HomeAssistant {
    /// A host storing its entries under `<config_dir>/.storage`
    pub fn new(config_dir: impl AsRef<Path>, config: CoreConfig) -> ConfigResult<Self> {
        let time_zone = config.tz()?;
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateStore::new(bus.clone()));
        let storage = Arc::new(Storage::new(config_dir));

        Ok(Self {
            entities: Arc::new(EntityPlatform::new(states.clone())),
            config_entries: Arc::new(ConfigEntries::new(storage)),
            bus,
            states,
            config,
            time_zone,
            clock: Arc::new(SystemClock),
            integrations: DashMap::new(),
            entry_locks: DashMap::new(),
            retries: DashMap::new(),
        })
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Today's date in the host time zone
    pub fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.time_zone).date_naive()
    }

    /// Run blocking work (e.g. a remote API call) off the async runtime
    pub async fn add_executor_job<F, T>(&self, job: F) -> Result<T, ExecutorError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        run_blocking(job).await
    }

    pub fn register_integration(&self, integration: Arc<dyn Integration>) {
        let domain = integration.domain().to_string();
        debug!("Registered integration: {}", domain);
        self.integrations.insert(domain, integration);
    }

    pub fn integration(&self, domain: &str) -> Option<Arc<dyn Integration>> {
        self.integrations.get(domain).map(|r| r.value().clone())
    }

    fn entry_lock(&self, entry_id: &str) -> Arc<Mutex<()>> {
        self.entry_locks
            .entry(entry_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Set up a config entry through its integration
    ///
    /// Returns the state the entry ends in. A `NotReady` failure schedules
    /// another attempt after an exponential backoff; other failures leave
    /// the entry in `SetupError`.
    pub async fn setup_entry(self: &Arc<Self>, entry_id: &str) -> ConfigEntriesResult<ConfigEntryState> {
        let lock = self.entry_lock(entry_id);
        let _guard = lock.lock().await;

        let entry = self
            .config_entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.is_disabled() {
            debug!("Skipping setup for disabled entry: {}", entry_id);
            return Ok(entry.state);
        }
        if entry.is_loaded() {
            return Ok(entry.state);
        }

        let entry = self
            .config_entries
            .transition(entry_id, ConfigEntryState::SetupInProgress, None)?;

        let Some(integration) = self.integration(&entry.domain) else {
            error!("Integration {} not found for entry {}", entry.domain, entry.title);
            return self.fail_setup(&entry, ConfigEntryState::SetupError, "integration not found");
        };

        match integration.setup_entry(self, &entry).await {
            Ok(()) => {
                self.config_entries
                    .transition(entry_id, ConfigEntryState::Loaded, None)?;
                info!("Setup of {} entry '{}' completed", entry.domain, entry.title);
                Ok(ConfigEntryState::Loaded)
            }
            Err(SetupError::NotReady(reason)) => {
                let tries = self.config_entries.record_retry(entry_id)?;
                let delay = calculate_retry_delay(tries);
                warn!(
                    "Config entry '{}' for {} integration not ready yet: {}; retrying in {:.0?}",
                    entry.title, entry.domain, reason, delay
                );
                self.config_entries
                    .transition(entry_id, ConfigEntryState::SetupRetry, Some(reason))?;
                schedule_retry(self, entry_id, delay);
                Ok(ConfigEntryState::SetupRetry)
            }
            Err(err @ SetupError::AuthFailed(_)) | Err(err @ SetupError::Failed(_)) => {
                error!(
                    "Error setting up entry '{}' for {}: {}",
                    entry.title, entry.domain, err
                );
                self.fail_setup(&entry, ConfigEntryState::SetupError, &err.to_string())
            }
        }
    }

    fn fail_setup(
        &self,
        entry: &ConfigEntry,
        state: ConfigEntryState,
        reason: &str,
    ) -> ConfigEntriesResult<ConfigEntryState> {
        self.config_entries
            .transition(&entry.entry_id, state, Some(reason.to_string()))?;
        Ok(state)
    }

    /// Unload a config entry
    ///
    /// Returns `false` when the entry is in a state that cannot be unloaded
    /// or the integration failed to unload it.
    pub async fn unload_entry(self: &Arc<Self>, entry_id: &str) -> ConfigEntriesResult<bool> {
        if let Some((_, retry)) = self.retries.remove(entry_id) {
            retry.abort();
        }

        let lock = self.entry_lock(entry_id);
        let _guard = lock.lock().await;

        let entry = self
            .config_entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        match entry.state {
            ConfigEntryState::NotLoaded => return Ok(true),
            state if !state.is_recoverable() => {
                warn!("Cannot unload entry '{}' in state {:?}", entry.title, state);
                return Ok(false);
            }
            _ => {}
        }

        let was_loaded = entry.is_loaded();
        self.config_entries
            .transition(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        let unloaded = match self.integration(&entry.domain) {
            Some(integration) if was_loaded => integration.unload_entry(self, &entry).await,
            _ => true,
        };

        if unloaded {
            self.config_entries
                .transition(entry_id, ConfigEntryState::NotLoaded, None)?;
            info!("Unloaded {} entry '{}'", entry.domain, entry.title);
        } else {
            self.config_entries.transition(
                entry_id,
                ConfigEntryState::FailedUnload,
                Some("integration failed to unload".to_string()),
            )?;
            error!("Failed to unload {} entry '{}'", entry.domain, entry.title);
        }

        Ok(unloaded)
    }

    /// Unload then set up again
    pub async fn reload_entry(
        self: &Arc<Self>,
        entry_id: &str,
    ) -> ConfigEntriesResult<ConfigEntryState> {
        if !self.unload_entry(entry_id).await? {
            let state = self
                .config_entries
                .get(entry_id)
                .map(|e| e.state)
                .unwrap_or_default();
            return Ok(state);
        }
        self.setup_entry(entry_id).await
    }

    /// Persist a change to an entry's title, data, options or unique id
    pub async fn update_entry(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        self.config_entries.update(entry_id, update).await
    }

    /// Set up every entry with a registered integration, concurrently
    pub async fn setup_all(self: &Arc<Self>) -> Vec<(String, ConfigEntryState)> {
        let entry_ids: Vec<String> = self
            .config_entries
            .entry_ids()
            .into_iter()
            .filter(|id| {
                self.config_entries
                    .get(id)
                    .map(|e| self.integrations.contains_key(&e.domain))
                    .unwrap_or(false)
            })
            .collect();

        let setups = entry_ids.iter().map(|entry_id| async move {
            let state = match self.setup_entry(entry_id).await {
                Ok(state) => state,
                Err(err) => {
                    error!("Setup of entry {} failed: {}", entry_id, err);
                    ConfigEntryState::SetupError
                }
            };
            (entry_id.clone(), state)
        });

        futures::future::join_all(setups).await
    }

    /// Unload every loaded entry
    pub async fn stop(self: &Arc<Self>) {
        for entry_id in self.config_entries.entry_ids() {
            if let Err(err) = self.unload_entry(&entry_id).await {
                warn!("Error unloading entry {}: {}", entry_id, err);
            }
        }
    }
}

fn schedule_retry(hass: &Arc<HomeAssistant>, entry_id: &str, delay: Duration) {
    let task_hass = Arc::clone(hass);
    let id = entry_id.to_string();

    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        task_hass.retries.remove(&id);
        if let Err(err) = task_hass.setup_entry(&id).await {
            warn!("Retrying setup of entry {} failed: {}", id, err);
        }
    });

    if let Some(previous) = hass.retries.insert(entry_id.to_string(), handle) {
        previous.abort();
    }
}
