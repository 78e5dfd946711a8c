//! Shared test utilities

pub mod mock;
pub mod time;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use ha_config::CoreConfig;
use ha_helpers::HomeAssistant;
use tempfile::TempDir;

pub use mock::{MockConnector, MockState};
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

#[allow(dead_code)]
pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

#[allow(dead_code)]
pub fn at(d: u32, hour: u32, minute: u32) -> NaiveDateTime {
    day(d).and_hms_opt(hour, minute, 0).unwrap()
}
