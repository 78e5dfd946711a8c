//! Pronote accounts declared in `configuration.yaml`
//!
//! ```yaml
//! pronote:
//!   - fixture: pronote/demo.json
//!     data:
//!       account_type: eleve
//!       url: https://demo.index-education.net/pronote/eleve.html
//!       username: demonstration
//!       password: !secret pronote_password
//!     options:
//!       nickname: Lulu
//! ```
//!
//! Each account becomes a config entry with source `import` the first time
//! it is seen. Later starts find it by unique id and leave it alone.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ha_config::Value;
use ha_config_entries::{ConfigEntry, ConfigEntrySource};
use ha_helpers::HomeAssistant;
use ha_pronote::{EntryData, DOMAIN};
use pronote_api::{FixtureConnector, Snapshot};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Snapshot served for this account, relative to the config directory
    pub fixture: PathBuf,
    pub data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
}

pub struct ImportedAccount {
    pub entry_id: String,
    pub connector: Arc<FixtureConnector>,
}

/// The `pronote:` list, empty when the section is absent
pub fn accounts_from_yaml(yaml: &Value) -> Result<Vec<AccountConfig>> {
    match yaml.get(DOMAIN) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(section) => {
            serde_yaml::from_value(section.clone()).context("invalid pronote section")
        }
    }
}

/// Ensure a config entry exists for `account` and open its snapshot
pub async fn import_account(
    hass: &HomeAssistant,
    config_dir: &Path,
    account: AccountConfig,
) -> Result<ImportedAccount> {
    let path = config_dir.join(&account.fixture);
    let snapshot = Snapshot::from_file(&path)
        .with_context(|| format!("cannot load Pronote fixture {}", path.display()))?;
    let data = EntryData::from_map(&account.data)?;

    let name = data
        .child
        .clone()
        .unwrap_or_else(|| snapshot.account.name.clone());
    let unique_id = format!("{}-{}", data.login_name().unwrap_or_default(), name);

    let entry_id = match hass.config_entries.get_by_unique_id(DOMAIN, &unique_id) {
        Some(existing) => {
            debug!("Pronote account {} already configured", unique_id);
            existing.entry_id
        }
        None => {
            let title = match &data.child {
                Some(child) => format!("{} (via compte parent)", child),
                None => name,
            };
            let entry = ConfigEntry::new(DOMAIN, title)
                .with_data(account.data)
                .with_options(account.options)
                .with_unique_id(unique_id)
                .with_source(ConfigEntrySource::Import);
            let entry = hass.config_entries.add(entry).await?;
            info!("Imported Pronote account '{}' from configuration.yaml", entry.title);
            entry.entry_id
        }
    };

    Ok(ImportedAccount {
        entry_id,
        connector: Arc::new(FixtureConnector::new(snapshot)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_config::{load_yaml_string, CoreConfig};
    use tempfile::TempDir;

    fn demo_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/config")
    }

    const CONFIG: &str = r#"
homeassistant:
  time_zone: Europe/Paris
pronote:
  - fixture: pronote/demo.json
    data:
      account_type: eleve
      url: https://demo.index-education.net/pronote/eleve.html
      username: demonstration
      password: pronotevs
    options:
      nickname: Lulu
      refresh_interval: 30
"#;

    #[test]
    fn test_accounts_from_yaml() {
        let dir = TempDir::new().unwrap();
        let yaml = load_yaml_string(dir.path(), CONFIG, "configuration.yaml").unwrap();

        let accounts = accounts_from_yaml(&yaml).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].fixture, PathBuf::from("pronote/demo.json"));
        assert_eq!(accounts[0].data["username"], "demonstration");
        assert_eq!(accounts[0].options["refresh_interval"], 30);

        let empty = load_yaml_string(dir.path(), "homeassistant: {}", "c.yaml").unwrap();
        assert!(accounts_from_yaml(&empty).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_happens_once() {
        let storage = TempDir::new().unwrap();
        let yaml = load_yaml_string(storage.path(), CONFIG, "configuration.yaml").unwrap();
        let hass = HomeAssistant::new(storage.path(), CoreConfig::from_yaml(&yaml).unwrap()).unwrap();
        let account = accounts_from_yaml(&yaml).unwrap().remove(0);

        let first = import_account(&hass, &demo_dir(), account.clone())
            .await
            .unwrap();
        let second = import_account(&hass, &demo_dir(), account).await.unwrap();
        assert_eq!(first.entry_id, second.entry_id);

        let entries = hass.config_entries.get_by_domain(DOMAIN);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Lea Martin");
        assert_eq!(entries[0].source, ConfigEntrySource::Import);
        assert_eq!(
            entries[0].unique_id.as_deref(),
            Some("demonstration-Lea Martin")
        );
        assert_eq!(entries[0].options["nickname"], "Lulu");
    }

    #[tokio::test]
    async fn test_missing_fixture_is_an_error() {
        let storage = TempDir::new().unwrap();
        let hass = HomeAssistant::new(storage.path(), CoreConfig::default()).unwrap();
        let account = AccountConfig {
            fixture: "pronote/missing.json".into(),
            data: HashMap::new(),
            options: HashMap::new(),
        };

        let err = import_account(&hass, &demo_dir(), account)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("missing.json"));
    }
}
