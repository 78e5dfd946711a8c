//! Entities published by integrations

pub use ha_core::Attributes;
use serde::{Deserialize, Serialize};

/// A read-only entity
///
/// The platform asks for `state` and `attributes` every time it writes the
/// entity to the state store; implementations compute them from whatever
/// data they hold (usually a coordinator snapshot).
pub trait Entity: Send + Sync {
    /// Entity domain, e.g. `sensor` or `calendar`
    fn domain(&self) -> &str;

    /// Stable identifier across restarts
    fn unique_id(&self) -> Option<String> {
        None
    }

    fn name(&self) -> String;

    /// Object id to use instead of the slug of `name`
    fn object_id(&self) -> Option<String> {
        None
    }

    /// `None` is written as `unknown`
    fn state(&self) -> Option<String>;

    fn attributes(&self) -> Attributes {
        Attributes::new()
    }

    fn available(&self) -> bool {
        true
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceEntryType {
    /// A web service rather than a physical device
    Service,
}

/// The device an entity belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// `(domain, id)` pairs
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<DeviceEntryType>,
}
