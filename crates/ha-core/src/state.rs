//! Published entity states

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::EventPayload;
use crate::{Context, EntityId};

/// Longest state value kept as is
pub const MAX_STATE_LENGTH: usize = 255;

pub const STATE_UNAVAILABLE: &str = "unavailable";
/// Also stored in place of values longer than [`MAX_STATE_LENGTH`]
pub const STATE_UNKNOWN: &str = "unknown";
pub const STATE_ON: &str = "on";
pub const STATE_OFF: &str = "off";

pub type Attributes = HashMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub entity_id: EntityId,
    pub state: String,
    #[serde(default)]
    pub attributes: Attributes,
    /// Moves only when `state` does
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub context: Context,
}

fn clamp(value: String) -> String {
    if value.chars().count() > MAX_STATE_LENGTH {
        STATE_UNKNOWN.to_string()
    } else {
        value
    }
}

impl State {
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: Attributes,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: clamp(state.into()),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// The state written after this one
    pub fn next(&self, state: impl Into<String>, attributes: Attributes, context: Context) -> Self {
        let mut next = Self::new(self.entity_id.clone(), state, attributes, context);
        if next.state == self.state {
            next.last_changed = self.last_changed;
        }
        next
    }

    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    pub fn attribute<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.attributes.get(key)?;
        T::deserialize(value).ok()
    }
}

/// Payload of `state_changed`
///
/// `old_state` is `None` for a new entity, `new_state` for a removed one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangedData {
    pub entity_id: EntityId,
    pub old_state: Option<State>,
    pub new_state: Option<State>,
}

impl EventPayload for StateChangedData {
    const EVENT_TYPE: &'static str = "state_changed";
}
