//! Shared test utilities

pub mod time;

use std::sync::Arc;

use ha_config::CoreConfig;
use ha_helpers::HomeAssistant;
use tempfile::TempDir;

pub use time::MockTime;

/// A host in a temporary config directory, on the Paris time zone
pub fn test_hass(time: &MockTime) -> (TempDir, Arc<HomeAssistant>) {
    let dir = TempDir::new().unwrap();
    let config = CoreConfig {
        name: "Test".into(),
        time_zone: "Europe/Paris".into(),
    };
    let hass = HomeAssistant::new(dir.path(), config)
        .unwrap()
        .with_clock(Arc::new(time.clone()));
    (dir, Arc::new(hass))
}
