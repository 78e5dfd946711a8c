//! Typed views over a config entry's data and options

use std::collections::HashMap;

use ha_config_entries::ConfigEntry;
use pronote_api::{AccountType, DeviceLogin};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::consts::{
    DEFAULT_ALARM_OFFSET, DEFAULT_REFRESH_INTERVAL, MAX_ALARM_OFFSET, MAX_REFRESH_INTERVAL,
};

#[derive(Debug, Error)]
pub enum EntryConfigError {
    #[error("invalid entry configuration: {0}")]
    Invalid(#[from] serde_json::Error),
}

pub type EntryConfigResult<T> = Result<T, EntryConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    #[default]
    UsernamePassword,
    Qrcode,
}

/// What the config flow stored
///
/// QR code entries keep the JSON of the scanned code until the first
/// refresh, then log in with the `qr_code_*` token credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryData {
    #[serde(default)]
    pub connection_type: ConnectionType,
    #[serde(default)]
    pub account_type: AccountType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ent: Option<String>,
    /// Child selected on a parent account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_identifier: Option<String>,
}

impl EntryData {
    pub fn from_map(data: &HashMap<String, Value>) -> EntryConfigResult<Self> {
        from_map(data)
    }

    pub fn from_entry(entry: &ConfigEntry) -> EntryConfigResult<Self> {
        Self::from_map(&entry.data)
    }

    pub fn to_map(&self) -> EntryConfigResult<HashMap<String, Value>> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }

    pub fn is_qr_code(&self) -> bool {
        self.connection_type == ConnectionType::Qrcode
    }

    pub fn device(&self) -> DeviceLogin {
        DeviceLogin {
            account_pin: self.account_pin.clone(),
            device_name: self.device_name.clone(),
            client_identifier: self.client_identifier.clone(),
        }
    }

    /// The login the account is known by, used in unique ids
    pub fn login_name(&self) -> Option<&str> {
        match self.connection_type {
            ConnectionType::UsernamePassword => self.username.as_deref(),
            ConnectionType::Qrcode => self.qr_code_username.as_deref(),
        }
    }
}

/// What the options flow edits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    /// Name shown instead of the child's in the calendar and events
    #[serde(default, deserialize_with = "empty_as_none")]
    pub nickname: Option<String>,
    /// Minutes between refreshes, within `1..=MAX_REFRESH_INTERVAL`
    #[serde(default = "default_refresh_interval", deserialize_with = "refresh_minutes")]
    pub refresh_interval: u64,
    /// Minutes between the alarm and the first lesson, within
    /// `0..=MAX_ALARM_OFFSET`
    #[serde(default = "default_alarm_offset", deserialize_with = "offset_minutes")]
    pub alarm_offset: i64,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            nickname: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            alarm_offset: DEFAULT_ALARM_OFFSET,
        }
    }
}

impl EntryOptions {
    pub fn from_map(options: &HashMap<String, Value>) -> EntryConfigResult<Self> {
        from_map(options)
    }

    pub fn from_entry(entry: &ConfigEntry) -> EntryConfigResult<Self> {
        Self::from_map(&entry.options)
    }
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL
}

fn default_alarm_offset() -> i64 {
    DEFAULT_ALARM_OFFSET
}

fn refresh_minutes<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(u64::deserialize(deserializer)?.clamp(1, MAX_REFRESH_INTERVAL))
}

fn offset_minutes<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(i64::deserialize(deserializer)?.clamp(0, MAX_ALARM_OFFSET))
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn from_map<T: DeserializeOwned>(map: &HashMap<String, Value>) -> EntryConfigResult<T> {
    let object: serde_json::Map<String, Value> =
        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    Ok(serde_json::from_value(Value::Object(object))?)
}
