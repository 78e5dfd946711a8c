//! The `homeassistant:` section

use std::path::Path;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

const SECTION: &str = "homeassistant";

/// Location name and the time zone timestamps are localized to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub name: String,
    /// IANA zone name, e.g. `Europe/Paris`
    pub time_zone: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            name: "Home".into(),
            time_zone: "UTC".into(),
        }
    }
}

fn invalid(key: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

impl CoreConfig {
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::from_yaml(&load_yaml(config_dir.as_ref(), "configuration.yaml")?)
    }

    /// Defaults when the section is absent or empty
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        let section = match yaml {
            Value::Mapping(root) => root.get(SECTION).cloned(),
            Value::Null => None,
            _ => return Err(invalid("<root>", "expected a mapping of integrations")),
        };

        let config = match section {
            None | Some(Value::Null) => Self::default(),
            Some(section) => serde_yaml::from_value(section).map_err(|e| invalid(SECTION, e))?,
        };
        config.tz()?;
        Ok(config)
    }

    pub fn tz(&self) -> ConfigResult<Tz> {
        self.time_zone.parse().map_err(|e| invalid("time_zone", e))
    }
}
