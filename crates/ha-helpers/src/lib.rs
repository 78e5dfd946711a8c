//! Host helpers for integrations
//!
//! What an integration plugs into: the [`HomeAssistant`] handle with its bus,
//! state store and config entries, the blocking executor, the polling
//! [`DataUpdateCoordinator`], the entity platform and the config flow
//! machinery.

pub mod calendar;
pub mod clock;
pub mod entity;
pub mod entity_platform;
pub mod executor;
pub mod flow;
mod hass;
pub mod integration;
pub mod update_coordinator;

use thiserror::Error;

pub use calendar::{calendar_state, CalendarEntity, CalendarEvent};
pub use clock::{Clock, SharedClock, SystemClock};
pub use entity::{Attributes, DeviceEntryType, DeviceInfo, Entity};
pub use entity_platform::EntityPlatform;
pub use executor::{run_blocking, ExecutorError};
pub use flow::{
    ConfigFlow, FieldType, FlowError, FlowInput, FlowManager, FlowResponse, FlowResult,
    FlowSummary, FormField, OptionsFlow,
};
pub use hass::HomeAssistant;
pub use integration::Integration;
pub use update_coordinator::{DataUpdateCoordinator, UpdateFailed, UpdateMethod};

/// Why an entry could not be set up
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetupError {
    /// Transient failure, the host retries with backoff
    #[error("not ready: {0}")]
    NotReady(String),

    /// Credentials were refused, the user has to fix the entry
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("{0}")]
    Failed(String),
}
