//! The integration seam

use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::ConfigEntry;

use crate::flow::{ConfigFlow, OptionsFlow};
use crate::{HomeAssistant, SetupError};

/// An integration as seen by the host
#[async_trait]
pub trait Integration: Send + Sync {
    fn domain(&self) -> &str;

    /// Set up one config entry: fetch data, register entities, start polling
    async fn setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> Result<(), SetupError>;

    /// Tear down what `setup_entry` built; `false` when that failed
    async fn unload_entry(&self, hass: &Arc<HomeAssistant>, entry: &ConfigEntry) -> bool;

    /// A fresh config flow
    fn config_flow(&self, hass: &Arc<HomeAssistant>) -> Box<dyn ConfigFlow>;

    fn options_flow(&self, _entry: &ConfigEntry) -> Option<Box<dyn OptionsFlow>> {
        None
    }
}
