//! Reading a configuration directory
//!
//! `configuration.yaml` may pull values from elsewhere with three tags:
//! `!secret key` reads `secrets.yaml`, `!env_var NAME` reads the process
//! environment and `!include file` splices in another YAML file.
//!
//! ```ignore
//! let yaml = ha_config::load_yaml("/config", "configuration.yaml")?;
//! let core = ha_config::CoreConfig::from_yaml(&yaml)?;
//! ```

mod core_config;
mod error;
mod loader;
mod secrets;

pub use core_config::CoreConfig;
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use secrets::{Secrets, SECRETS_FILE};

pub use serde_yaml::Value;
