//! One configured account of an integration

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::state_machine::{ConfigEntryState, InvalidTransition};

/// Free-form map collected by a flow
pub type EntryMap = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntrySource {
    #[default]
    User,
    /// From `configuration.yaml`
    Import,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryDisabledBy {
    User,
}

/// `data` is what the config flow collected and `options` what the options
/// flow edits. `state` and `reason` live only as long as the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub domain: String,
    pub title: String,
    #[serde(default)]
    pub data: EntryMap,
    #[serde(default)]
    pub options: EntryMap,
    /// At most one entry per domain carries a given unique id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub source: ConfigEntrySource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<ConfigEntryDisabledBy>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,

    #[serde(skip)]
    pub state: ConfigEntryState,
    #[serde(skip)]
    pub reason: Option<String>,
}

impl ConfigEntry {
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: EntryMap::new(),
            options: EntryMap::new(),
            unique_id: None,
            source: ConfigEntrySource::default(),
            disabled_by: None,
            created_at: now,
            modified_at: now,
            state: ConfigEntryState::default(),
            reason: None,
        }
    }

    pub fn with_data(self, data: EntryMap) -> Self {
        Self { data, ..self }
    }

    pub fn with_options(self, options: EntryMap) -> Self {
        Self { options, ..self }
    }

    pub fn with_unique_id(self, unique_id: impl Into<String>) -> Self {
        Self {
            unique_id: Some(unique_id.into()),
            ..self
        }
    }

    pub fn with_source(self, source: ConfigEntrySource) -> Self {
        Self { source, ..self }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ConfigEntryState::Loaded
    }

    /// Fails without touching the entry when the lifecycle forbids it
    pub fn set_state(
        &mut self,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> Result<(), InvalidTransition> {
        self.state.check_transition(state)?;
        self.state = state;
        self.reason = reason;
        Ok(())
    }
}

/// Fields to replace in an entry, `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct ConfigEntryUpdate {
    title: Option<String>,
    data: Option<EntryMap>,
    options: Option<EntryMap>,
    unique_id: Option<Option<String>>,
}

impl ConfigEntryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(self, title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..self
        }
    }

    pub fn data(self, data: EntryMap) -> Self {
        Self {
            data: Some(data),
            ..self
        }
    }

    pub fn options(self, options: EntryMap) -> Self {
        Self {
            options: Some(options),
            ..self
        }
    }

    pub fn unique_id(self, unique_id: Option<String>) -> Self {
        Self {
            unique_id: Some(unique_id),
            ..self
        }
    }

    /// The unique id the entry ends up with, when it changes
    pub(crate) fn new_unique_id(&self) -> Option<&str> {
        self.unique_id.as_ref()?.as_deref()
    }

    pub(crate) fn apply(self, entry: &mut ConfigEntry) {
        if let Some(title) = self.title {
            entry.title = title;
        }
        if let Some(data) = self.data {
            entry.data = data;
        }
        if let Some(options) = self.options {
            entry.options = options;
        }
        if let Some(unique_id) = self.unique_id {
            entry.unique_id = unique_id;
        }
        entry.modified_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn imported() -> ConfigEntry {
        ConfigEntry::new("pronote", "Lea Martin")
            .with_data(EntryMap::from([("username".to_string(), json!("lmartin"))]))
            .with_unique_id("lmartin-Lea Martin")
            .with_source(ConfigEntrySource::Import)
    }

    #[test]
    fn test_builder() {
        let entry = imported();
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
        assert_eq!(entry.unique_id.as_deref(), Some("lmartin-Lea Martin"));
        assert_eq!(entry.data["username"], "lmartin");
        assert_eq!(entry.entry_id.len(), 26);
        assert!(!entry.is_disabled());
    }

    #[test]
    fn test_runtime_state_not_serialized() {
        let mut entry = imported();
        entry.set_state(ConfigEntryState::SetupInProgress, None).unwrap();
        entry
            .set_state(ConfigEntryState::SetupError, Some("invalid credentials".into()))
            .unwrap();

        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("state").is_none());
        assert!(json.get("reason").is_none());
        assert_eq!(json["source"], "import");

        let parsed: ConfigEntry = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.state, ConfigEntryState::NotLoaded);
        assert!(parsed.reason.is_none());
        assert_eq!(parsed.created_at, entry.created_at);
    }

    #[test]
    fn test_rejected_state_leaves_entry_untouched() {
        let mut entry = imported();
        assert!(entry.set_state(ConfigEntryState::Loaded, Some("x".into())).is_err());
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
        assert!(entry.reason.is_none());
    }

    #[test]
    fn test_update_replaces_only_given_fields() {
        let mut entry = imported();
        let update = ConfigEntryUpdate::new().options(EntryMap::from([(
            "nickname".to_string(),
            json!("Lulu"),
        )]));
        assert_eq!(update.new_unique_id(), None);
        update.apply(&mut entry);

        assert_eq!(entry.options["nickname"], "Lulu");
        assert_eq!(entry.data["username"], "lmartin");
        assert_eq!(entry.unique_id.as_deref(), Some("lmartin-Lea Martin"));
        assert!(entry.modified_at >= entry.created_at);

        ConfigEntryUpdate::new().unique_id(None).apply(&mut entry);
        assert!(entry.unique_id.is_none());
    }
}
