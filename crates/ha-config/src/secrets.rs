//! `secrets.yaml`, the store behind `!secret`

use std::collections::HashMap;
use std::path::Path;

use serde_yaml::Value;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

pub const SECRETS_FILE: &str = "secrets.yaml";

#[derive(Debug, Clone, Default)]
pub struct Secrets(HashMap<String, String>);

impl Secrets {
    /// Secrets of a config directory, empty when it has no `secrets.yaml`
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        let path = config_dir.join(SECRETS_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No {} in {}", SECRETS_FILE, config_dir.display());
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        let secrets = Self::from_yaml(&content)
            .map_err(|source| ConfigError::Yaml { path, source })?;
        debug!("Loaded {} secrets", secrets.0.len());
        Ok(secrets)
    }

    /// Numbers and booleans are stringified, nested values dropped
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        let raw: HashMap<String, Value> = serde_yaml::from_str(content)?;
        Ok(Self(
            raw.into_iter()
                .filter_map(|(key, value)| scalar(value).map(|v| (key, v)))
                .collect(),
        ))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn scalar(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scalars_become_strings() {
        let secrets = Secrets::from_yaml(
            "pronote_username: jdupont\naccount_pin: 1234\nremember: true\nnested: {a: 1}\n",
        )
        .unwrap();

        assert_eq!(secrets.get("pronote_username"), Some("jdupont"));
        assert_eq!(secrets.get("account_pin"), Some("1234"));
        assert_eq!(secrets.get("remember"), Some("true"));
        assert_eq!(secrets.get("nested"), None);
        assert_eq!(secrets.len(), 3);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(Secrets::load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_broken_file_names_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SECRETS_FILE), "a: [unclosed\n").unwrap();

        let err = Secrets::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
        assert!(err.to_string().contains(SECRETS_FILE));
    }
}
