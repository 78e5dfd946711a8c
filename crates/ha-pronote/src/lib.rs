//! Pronote integration
//!
//! Publishes a Pronote account (a student, or one child of a parent
//! account) as sensors and a timetable calendar. A coordinator polls the
//! account every `refresh_interval` minutes and fires `pronote_event` on the
//! bus when a new grade, absence or delay shows up.

pub mod calendar;
pub mod client;
pub mod config_flow;
pub mod consts;
pub mod coordinator;
pub mod diff;
pub mod entry;
pub mod formatter;
pub mod sensor;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use ha_config_entries::ConfigEntry;
use ha_helpers::{
    ConfigFlow, DataUpdateCoordinator, HomeAssistant, Integration, OptionsFlow, SetupError,
};
use pronote_api::Connector;
use tracing::{debug, info};

pub use calendar::PronoteCalendar;
pub use config_flow::{PronoteConfigFlow, PronoteOptionsFlow};
pub use consts::{DOMAIN, EVENT_TYPE};
pub use coordinator::{PronoteData, PronoteUpdater};
pub use entry::{ConnectionType, EntryConfigError, EntryData, EntryOptions};
pub use sensor::{build_sensors, PronoteSensor, SensorKind};

pub type PronoteCoordinator = DataUpdateCoordinator<PronoteData>;

pub struct PronoteIntegration {
    connector: Arc<dyn Connector>,
    /// Connectors for entries that do not use the default one
    entry_connectors: DashMap<String, Arc<dyn Connector>>,
    coordinators: DashMap<String, Arc<PronoteCoordinator>>,
}

impl PronoteIntegration {
    /// An integration logging in through `connector`, config flows included
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            entry_connectors: DashMap::new(),
            coordinators: DashMap::new(),
        }
    }

    pub fn set_entry_connector(&self, entry_id: &str, connector: Arc<dyn Connector>) {
        self.entry_connectors.insert(entry_id.to_string(), connector);
    }

    fn connector_for(&self, entry_id: &str) -> Arc<dyn Connector> {
        self.entry_connectors
            .get(entry_id)
            .map(|c| c.value().clone())
            .unwrap_or_else(|| self.connector.clone())
    }

    /// Coordinator of a loaded entry
    pub fn coordinator(&self, entry_id: &str) -> Option<Arc<PronoteCoordinator>> {
        self.coordinators.get(entry_id).map(|c| c.value().clone())
    }
}

#[async_trait]
impl Integration for PronoteIntegration {
    fn domain(&self) -> &str {
        DOMAIN
    }

    async fn setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> Result<(), SetupError> {
        let options =
            EntryOptions::from_entry(entry).map_err(|err| SetupError::Failed(err.to_string()))?;
        let updater = PronoteUpdater::new(hass, entry, self.connector_for(&entry.entry_id))
            .map_err(|err| SetupError::Failed(err.to_string()))?;

        let coordinator = Arc::new(DataUpdateCoordinator::new(
            entry.title.clone(),
            Duration::from_secs(options.refresh_interval.max(1).saturating_mul(60)),
            Arc::new(updater),
            hass.clock(),
        ));
        coordinator.first_refresh().await?;

        let data = coordinator
            .data()
            .ok_or_else(|| SetupError::NotReady("no data after first refresh".to_string()))?;

        let sensors = hass
            .entities
            .add_entities(&entry.entry_id, build_sensors(&coordinator));
        let calendar = Arc::new(PronoteCalendar::new(
            coordinator.clone(),
            &data,
            options.nickname.as_deref(),
            hass.clock(),
            hass.time_zone(),
        ));
        hass.entities.add_calendar(&entry.entry_id, calendar);
        debug!("Added {} sensors for {}", sensors.len(), entry.title);

        hass.entities.follow(&entry.entry_id, coordinator.as_ref());
        coordinator.start();
        self.coordinators.insert(entry.entry_id.clone(), coordinator);

        info!(
            "Pronote account {} polled every {} minutes",
            data.child_info.name, options.refresh_interval
        );
        Ok(())
    }

    async fn unload_entry(&self, hass: &Arc<HomeAssistant>, entry: &ConfigEntry) -> bool {
        if let Some((_, coordinator)) = self.coordinators.remove(&entry.entry_id) {
            coordinator.shutdown();
        }
        hass.entities.remove_entry(&entry.entry_id);
        true
    }

    fn config_flow(&self, hass: &Arc<HomeAssistant>) -> Box<dyn ConfigFlow> {
        Box::new(PronoteConfigFlow::new(hass.clone(), self.connector.clone()))
    }

    fn options_flow(&self, entry: &ConfigEntry) -> Option<Box<dyn OptionsFlow>> {
        Some(Box::new(PronoteOptionsFlow::new(entry)))
    }
}
